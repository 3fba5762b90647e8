//! Contracts for the external systems the engine depends on
//!
//! Each collaborator (embedding generator, vector index, lexical index,
//! reranker, metadata store) sits behind its own trait so back-ends can
//! be swapped without touching fusion or orchestration logic. All
//! collaborator calls are async boundaries; implementations must not be
//! called while holding any engine lock.
//!
//! Collaborator errors are opaque (`anyhow`). The engine maps them into
//! its typed taxonomy at each call site.

use crate::query::FilterSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single conjunctive filter condition in the index predicate language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterCondition {
    /// Field equals a value
    Equals { field: String, value: String },
    /// Field matches any of the values
    OneOf { field: String, values: Vec<String> },
    /// Field contains all of the values
    ContainsAll { field: String, values: Vec<String> },
    /// Numeric field falls within `[start, end]` inclusive
    Range { field: String, start: i64, end: i64 },
}

/// Conjunction of filter conditions passed to index collaborators
///
/// An empty predicate matches every fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub conditions: Vec<FilterCondition>,
}

impl FilterPredicate {
    /// Translate the query-level filter set into index conditions
    pub fn from_filter_set(filters: &FilterSet) -> Self {
        let mut conditions = Vec::new();

        if !filters.sources.is_empty() {
            conditions.push(FilterCondition::OneOf {
                field: "source".to_string(),
                values: filters.sources.clone(),
            });
        }

        if let Some(language) = &filters.language {
            conditions.push(FilterCondition::Equals {
                field: "language".to_string(),
                value: language.clone(),
            });
        }

        if let Some((start, end)) = filters.date_range {
            conditions.push(FilterCondition::Range {
                field: "timestamp".to_string(),
                start,
                end,
            });
        }

        if !filters.tags.is_empty() {
            conditions.push(FilterCondition::ContainsAll {
                field: "tags".to_string(),
                values: filters.tags.clone(),
            });
        }

        Self { conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A raw hit returned by an index collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub fragment_id: String,
    pub document_id: String,
    /// Score in the index's native scale; the fusion ranker normalizes
    pub score: f32,
}

/// A unit of retrievable content owned by the metadata store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub source: String,
    pub language: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Position of this fragment within its parent document
    pub position: usize,
}

/// A candidate handed to the reranking collaborator
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub fragment_id: String,
    pub content: String,
}

/// Produces vector representations of text
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Identifier of the underlying model; participates in fingerprints
    fn model_id(&self) -> &str;
}

/// Approximate nearest-neighbor index over fragment vectors
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `limit` hits nearest to `vector` matching `predicate`
    ///
    /// Sparse regions may yield fewer than `limit` hits; that is not an
    /// error.
    async fn query(
        &self,
        vector: &[f32],
        predicate: &FilterPredicate,
        limit: usize,
    ) -> anyhow::Result<Vec<IndexHit>>;
}

/// Term-matching index over fragment text
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Return up to `limit` hits for `text` matching `predicate`,
    /// scored by a tf-idf-class ranking function
    async fn query(
        &self,
        text: &str,
        predicate: &FilterPredicate,
        limit: usize,
    ) -> anyhow::Result<Vec<IndexHit>>;
}

/// Optional cross-encoder reordering of a bounded candidate window
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Return the candidate fragment ids in the reranked order
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> anyhow::Result<Vec<String>>;
}

/// Fragment metadata and content, keyed by fragment identifier
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch fragments by id; missing ids are simply absent from the
    /// result, not an error
    async fn get_fragments(&self, ids: &[String]) -> anyhow::Result<Vec<Fragment>>;

    /// Fetch up to `before` preceding and `after` following fragments of
    /// the same document, in document order
    async fn get_neighbors(
        &self,
        fragment_id: &str,
        before: usize,
        after: usize,
    ) -> anyhow::Result<Vec<Fragment>>;

    /// Fetch the stored vector for a fragment, if one exists
    async fn get_vector(&self, fragment_id: &str) -> anyhow::Result<Option<Vec<f32>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterSet;

    #[test]
    fn test_empty_filter_set_empty_predicate() {
        let predicate = FilterPredicate::from_filter_set(&FilterSet::default());
        assert!(predicate.is_empty());
    }

    #[test]
    fn test_full_filter_set_translation() {
        let filters = FilterSet {
            sources: vec!["repo-a".into()],
            language: Some("en".into()),
            date_range: Some((100, 200)),
            tags: vec!["security".into(), "auth".into()],
        };

        let predicate = FilterPredicate::from_filter_set(&filters);
        assert_eq!(predicate.conditions.len(), 4);

        assert!(predicate.conditions.contains(&FilterCondition::OneOf {
            field: "source".into(),
            values: vec!["repo-a".into()],
        }));
        assert!(predicate.conditions.contains(&FilterCondition::Equals {
            field: "language".into(),
            value: "en".into(),
        }));
        assert!(predicate.conditions.contains(&FilterCondition::Range {
            field: "timestamp".into(),
            start: 100,
            end: 200,
        }));
        assert!(predicate.conditions.contains(&FilterCondition::ContainsAll {
            field: "tags".into(),
            values: vec!["security".into(), "auth".into()],
        }));
    }
}
