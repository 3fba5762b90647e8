//! Retrieval paths and result fusion
//!
//! The vector and lexical retrievers wrap their index collaborators and
//! translate query filters into the index predicate language. The fusion
//! ranker merges both hit lists into one deterministic ordering.

mod fusion;
mod lexical;
mod vector;

pub use fusion::{apply_rerank_order, fuse, FusionWeights};
pub use lexical::LexicalRetriever;
pub use vector::VectorRetriever;

use serde::{Deserialize, Serialize};

/// Identifier pair for a fragment and its parent document
///
/// The engine holds references only; fragment content is owned by the
/// external metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentRef {
    pub fragment_id: String,
    pub document_id: String,
}

/// One fused search hit
///
/// Raw per-path scores are kept alongside the fused score for
/// explainability; `None` means the fragment was absent from that path's
/// result set (distinct from a raw score of zero).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    #[serde(flatten)]
    pub fragment: FragmentRef,
    pub vector_score: Option<f32>,
    pub lexical_score: Option<f32>,
    pub fused_score: f32,
    pub rank: usize,
}
