//! Fathom - Query Resolution Engine
//!
//! Turns a natural-language query into a ranked set of content
//! fragments by combining approximate vector similarity with exact
//! lexical matching, under multi-tier caching, in-flight coalescing of
//! identical work, and graceful degradation when a retrieval path is
//! down.
//!
//! The engine is transport-agnostic: callers construct a
//! [`query::Query`], hand it to [`engine::QueryEngine::search`], and
//! receive a [`engine::SearchResponse`]. External systems (embedding
//! generator, vector index, lexical index, reranker, metadata store)
//! are injected behind the traits in [`collaborators`].

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod query;
pub mod retrieval;

pub use cache::InvalidationScope;
pub use engine::{QueryEngine, SearchResponse};
pub use error::{EngineError, Result};
pub use query::{FilterSet, Query, SearchOptions, SearchType};
