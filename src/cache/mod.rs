//! Shared mutable engine state: result cache and in-flight coalescing
//!
//! These two tables are the only shared mutable state in the engine.
//! Every mutation is a single-entry replace under a short-lived lock;
//! no lock is held across a collaborator call.

mod inflight;
mod results;

pub use inflight::{follower_outcome, Flight, FlightGuard, InflightTable, SharedOutcome};
pub use results::{CacheStats, InvalidationScope, ResultCache};

use crate::retrieval::ScoredResult;
use std::sync::Arc;

/// One computation's output, shared between the leader, its followers,
/// and the result cache
#[derive(Debug, Clone)]
pub struct ComputedSet {
    pub results: Arc<Vec<ScoredResult>>,
    /// True when any retrieval path or the reranker was unavailable
    pub degraded: bool,
    pub vector_available: bool,
    pub lexical_available: bool,
    /// True when the reranker actually reordered the top window
    pub reranked: bool,
}

impl ComputedSet {
    /// A full-quality set with both paths healthy
    pub fn healthy(results: Arc<Vec<ScoredResult>>) -> Self {
        Self {
            results,
            degraded: false,
            vector_available: true,
            lexical_available: true,
            reranked: false,
        }
    }
}
