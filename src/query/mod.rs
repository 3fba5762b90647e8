//! Query model: text, search type, filters, and options
//!
//! A [`Query`] is immutable once constructed and validated. Validation
//! happens up front so malformed requests fail with `InvalidQuery`
//! before any collaborator is contacted.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Which retrieval paths a query exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Approximate nearest-neighbor search only
    Vector,
    /// Exact/fuzzy term matching only
    Lexical,
    /// Both paths, fused into one ranking
    Hybrid,
}

impl SearchType {
    pub fn uses_vector(&self) -> bool {
        matches!(self, SearchType::Vector | SearchType::Hybrid)
    }

    pub fn uses_lexical(&self) -> bool {
        matches!(self, SearchType::Lexical | SearchType::Hybrid)
    }
}

/// Conjunctive metadata filters applied to both retrieval paths
///
/// All fields are optional; an empty filter set matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    /// Restrict to these source identifiers
    #[serde(default)]
    pub sources: Vec<String>,

    /// Restrict to a single language code
    #[serde(default)]
    pub language: Option<String>,

    /// Restrict to fragments whose document timestamp falls in
    /// `[start, end]` (unix seconds, inclusive)
    #[serde(default)]
    pub date_range: Option<(i64, i64)>,

    /// Restrict to fragments carrying all of these tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
            && self.language.is_none()
            && self.date_range.is_none()
            && self.tags.is_empty()
    }
}

/// Per-query tuning knobs with documented defaults
///
/// Unknown fields are rejected at deserialization time so a typo in a
/// caller's option name surfaces as `InvalidQuery` instead of silently
/// falling back to a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchOptions {
    /// Weight of the normalized vector score in fusion (default 0.7)
    pub vector_weight: f32,

    /// Weight of the normalized lexical score in fusion (default 0.3)
    pub lexical_weight: f32,

    /// Minimum fused score for a result to be returned (default 0.0)
    pub min_score: f32,

    /// Whether to rerank the top window with the cross-encoder (default false)
    pub rerank: bool,

    /// Whether to hydrate fragment content into results (default true)
    pub include_content: bool,

    /// Fragments to attach before/after each hit (default 0)
    pub context_window: usize,

    /// Maximum results per page (default 10)
    pub limit: usize,

    /// Results to skip before the first returned one (default 0)
    pub offset: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            lexical_weight: 0.3,
            min_score: 0.0,
            rerank: false,
            include_content: true,
            context_window: 0,
            limit: 10,
            offset: 0,
        }
    }
}

/// A search request, immutable once constructed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Raw query text
    pub text: String,

    /// Which retrieval paths to run
    pub search_type: SearchType,

    /// Conjunctive metadata filters
    #[serde(default)]
    pub filters: FilterSet,

    /// Tuning options
    #[serde(default)]
    pub options: SearchOptions,
}

impl Query {
    /// Build a query with default filters and options, validating inputs
    pub fn new(text: impl Into<String>, search_type: SearchType) -> Result<Self> {
        let query = Self {
            text: text.into(),
            search_type,
            filters: FilterSet::default(),
            options: SearchOptions::default(),
        };
        query.validate()?;
        Ok(query)
    }

    /// Build a fully specified query, validating inputs
    pub fn with_parts(
        text: impl Into<String>,
        search_type: SearchType,
        filters: FilterSet,
        options: SearchOptions,
    ) -> Result<Self> {
        let query = Self {
            text: text.into(),
            search_type,
            filters,
            options,
        };
        query.validate()?;
        Ok(query)
    }

    /// Check text, filters, and options; all failures are `InvalidQuery`
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(EngineError::InvalidQuery(
                "query text cannot be empty".to_string(),
            ));
        }

        let opts = &self.options;
        for (name, value) in [
            ("vector_weight", opts.vector_weight),
            ("lexical_weight", opts.lexical_weight),
            ("min_score", opts.min_score),
        ] {
            if !value.is_finite() {
                return Err(EngineError::InvalidQuery(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        if opts.vector_weight < 0.0 || opts.lexical_weight < 0.0 {
            return Err(EngineError::InvalidQuery(
                "weights must be non-negative".to_string(),
            ));
        }

        if opts.vector_weight == 0.0 && opts.lexical_weight == 0.0 {
            return Err(EngineError::InvalidQuery(
                "at least one of vector_weight and lexical_weight must be positive".to_string(),
            ));
        }

        if opts.limit == 0 {
            return Err(EngineError::InvalidQuery(
                "limit must be greater than 0".to_string(),
            ));
        }

        if let Some((start, end)) = self.filters.date_range {
            if start > end {
                return Err(EngineError::InvalidQuery(format!(
                    "date_range start {} is after end {}",
                    start, end
                )));
            }
        }

        Ok(())
    }
}
