//! Approximate nearest-neighbor retrieval path

use crate::collaborators::{FilterPredicate, IndexHit, VectorIndex};
use crate::error::{EngineError, Result};
use crate::query::FilterSet;
use std::sync::Arc;

/// Wraps the external vector index, handling filter translation and
/// score thresholds
pub struct VectorRetriever {
    index: Arc<dyn VectorIndex>,
}

impl VectorRetriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Query the index with the query vector
    ///
    /// `min_score` is applied as a post-filter on the raw index score
    /// since the index may not support thresholds natively. Fewer than
    /// `limit` hits is a normal outcome in sparse regions, not an error.
    pub async fn search(
        &self,
        vector: &[f32],
        filters: &FilterSet,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<IndexHit>> {
        let predicate = FilterPredicate::from_filter_set(filters);

        let mut hits = self
            .index
            .query(vector, &predicate, limit)
            .await
            .map_err(|e| EngineError::VectorIndexUnavailable(e.to_string()))?;

        if min_score > 0.0 {
            hits.retain(|hit| hit.score >= min_score);
        }

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedIndex {
        hits: Vec<IndexHit>,
        fail: bool,
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn query(
            &self,
            _vector: &[f32],
            _predicate: &FilterPredicate,
            limit: usize,
        ) -> anyhow::Result<Vec<IndexHit>> {
            if self.fail {
                anyhow::bail!("index offline");
            }
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
    }

    fn hit(id: &str, score: f32) -> IndexHit {
        IndexHit {
            fragment_id: id.to_string(),
            document_id: "doc".to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn test_min_score_post_filter() {
        let retriever = VectorRetriever::new(Arc::new(FixedIndex {
            hits: vec![hit("a", 0.9), hit("b", 0.4), hit("c", 0.2)],
            fail: false,
        }));

        let hits = retriever
            .search(&[0.0; 4], &FilterSet::default(), 10, 0.3)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score >= 0.3));
    }

    #[tokio::test]
    async fn test_sparse_region_not_an_error() {
        let retriever = VectorRetriever::new(Arc::new(FixedIndex {
            hits: vec![hit("a", 0.9)],
            fail: false,
        }));

        let hits = retriever
            .search(&[0.0; 4], &FilterSet::default(), 10, 0.0)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_index_failure_is_typed() {
        let retriever = VectorRetriever::new(Arc::new(FixedIndex {
            hits: vec![],
            fail: true,
        }));

        let result = retriever
            .search(&[0.0; 4], &FilterSet::default(), 10, 0.0)
            .await;

        assert!(matches!(
            result,
            Err(EngineError::VectorIndexUnavailable(_))
        ));
    }
}
