//! Exact/fuzzy term-matching retrieval path

use crate::collaborators::{FilterPredicate, IndexHit, LexicalIndex};
use crate::error::{EngineError, Result};
use crate::query::FilterSet;
use std::sync::Arc;

/// Wraps the external lexical index
///
/// Runs concurrently with the vector path under hybrid search; the
/// orchestrator decides whether a failure here degrades or surfaces.
pub struct LexicalRetriever {
    index: Arc<dyn LexicalIndex>,
}

impl LexicalRetriever {
    pub fn new(index: Arc<dyn LexicalIndex>) -> Self {
        Self { index }
    }

    pub async fn search(
        &self,
        text: &str,
        filters: &FilterSet,
        limit: usize,
    ) -> Result<Vec<IndexHit>> {
        let predicate = FilterPredicate::from_filter_set(filters);

        self.index
            .query(text, &predicate, limit)
            .await
            .map_err(|e| EngineError::LexicalIndexUnavailable(e.to_string()))
    }
}
