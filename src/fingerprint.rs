//! Deterministic fingerprints for cache-equivalent queries
//!
//! A [`Fingerprint`] is a blake3 digest over a canonical rendering of the
//! query text, filter set, options, and embedding-model identifier. Two
//! queries that canonicalize identically are cache-equivalent; this is
//! the invariant the result cache and coalescer are built on.
//!
//! Canonicalization lowercases and whitespace-collapses the text and
//! sorts filter values, so `"Auth  Users"` and `"auth users"` with the
//! same filters hit the same cache entry.

use crate::query::Query;
use std::fmt;

/// Fixed-size digest identifying a cache-equivalent query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Derive the fingerprint for a query under a given embedding model
    ///
    /// The model identifier participates because the same text embedded
    /// by a different model yields different vectors, so cached results
    /// must not be shared across models.
    pub fn derive(query: &Query, embedding_model: &str) -> Self {
        let mut hasher = blake3::Hasher::new();

        hasher.update(b"text:");
        hasher.update(normalize_text(&query.text).as_bytes());

        hasher.update(b"|type:");
        hasher.update(search_type_tag(query).as_bytes());

        hasher.update(b"|filters:");
        hasher.update(canonical_filters(query).as_bytes());

        hasher.update(b"|options:");
        hasher.update(canonical_options(query).as_bytes());

        hasher.update(b"|model:");
        hasher.update(embedding_model.as_bytes());

        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Digest of normalized query text alone
///
/// Keys the durable embedding cache tier: the same text embedded in
/// different queries (different filters, options) shares one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of_text(text: &str) -> Self {
        Self(*blake3::hash(normalize_text(text).as_bytes()).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Case-fold and collapse runs of whitespace to single spaces
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn search_type_tag(query: &Query) -> &'static str {
    use crate::query::SearchType::*;
    match query.search_type {
        Vector => "vector",
        Lexical => "lexical",
        Hybrid => "hybrid",
    }
}

/// Render filters with sorted, deduplicated values and fixed key order
fn canonical_filters(query: &Query) -> String {
    let f = &query.filters;

    let mut sources = f.sources.clone();
    sources.sort();
    sources.dedup();

    let mut tags = f.tags.clone();
    tags.sort();
    tags.dedup();

    format!(
        "sources=[{}];language={};date_range={};tags=[{}]",
        sources.join(","),
        f.language.as_deref().unwrap_or(""),
        f.date_range
            .map(|(s, e)| format!("{}..{}", s, e))
            .unwrap_or_default(),
        tags.join(","),
    )
}

/// Render options in fixed field order
///
/// Rust's float Display is deterministic for a given bit pattern, which
/// is all byte-stability requires.
fn canonical_options(query: &Query) -> String {
    let o = &query.options;
    // limit and offset participate: the fetched candidate universe is
    // sized from them, so differing pagination is not cache-equivalent
    format!(
        "vw={};lw={};min={};rerank={};content={};ctx={};limit={};offset={}",
        o.vector_weight, o.lexical_weight, o.min_score, o.rerank, o.include_content,
        o.context_window, o.limit, o.offset,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterSet, Query, SearchOptions, SearchType};

    const MODEL: &str = "test-model-v1";

    fn query_with_filters(text: &str, filters: FilterSet) -> Query {
        Query::with_parts(text, SearchType::Hybrid, filters, SearchOptions::default()).unwrap()
    }

    #[test]
    fn test_identical_queries_identical_fingerprints() {
        let a = Query::new("authenticate users", SearchType::Hybrid).unwrap();
        let b = Query::new("authenticate users", SearchType::Hybrid).unwrap();
        assert_eq!(Fingerprint::derive(&a, MODEL), Fingerprint::derive(&b, MODEL));
    }

    #[test]
    fn test_case_and_whitespace_normalized() {
        let a = Query::new("Authenticate   Users", SearchType::Hybrid).unwrap();
        let b = Query::new("authenticate users", SearchType::Hybrid).unwrap();
        let c = Query::new("  authenticate\tusers  ", SearchType::Hybrid).unwrap();
        assert_eq!(Fingerprint::derive(&a, MODEL), Fingerprint::derive(&b, MODEL));
        assert_eq!(Fingerprint::derive(&b, MODEL), Fingerprint::derive(&c, MODEL));
    }

    #[test]
    fn test_filter_order_does_not_matter() {
        let a = query_with_filters(
            "auth",
            FilterSet {
                sources: vec!["repo-b".into(), "repo-a".into()],
                tags: vec!["z".into(), "a".into()],
                ..Default::default()
            },
        );
        let b = query_with_filters(
            "auth",
            FilterSet {
                sources: vec!["repo-a".into(), "repo-b".into()],
                tags: vec!["a".into(), "z".into()],
                ..Default::default()
            },
        );
        assert_eq!(Fingerprint::derive(&a, MODEL), Fingerprint::derive(&b, MODEL));
    }

    #[test]
    fn test_different_filters_different_fingerprints() {
        let a = query_with_filters("auth", FilterSet::default());
        let b = query_with_filters(
            "auth",
            FilterSet {
                language: Some("en".into()),
                ..Default::default()
            },
        );
        assert_ne!(Fingerprint::derive(&a, MODEL), Fingerprint::derive(&b, MODEL));
    }

    #[test]
    fn test_different_options_different_fingerprints() {
        let a = Query::new("auth", SearchType::Hybrid).unwrap();
        let mut opts = SearchOptions::default();
        opts.vector_weight = 0.9;
        opts.lexical_weight = 0.1;
        let b = Query::with_parts("auth", SearchType::Hybrid, FilterSet::default(), opts).unwrap();
        assert_ne!(Fingerprint::derive(&a, MODEL), Fingerprint::derive(&b, MODEL));
    }

    #[test]
    fn test_pagination_participates() {
        let a = Query::new("auth", SearchType::Hybrid).unwrap();

        let mut opts = SearchOptions::default();
        opts.limit = 25;
        let b = Query::with_parts("auth", SearchType::Hybrid, FilterSet::default(), opts).unwrap();
        assert_ne!(Fingerprint::derive(&a, MODEL), Fingerprint::derive(&b, MODEL));

        let mut opts = SearchOptions::default();
        opts.offset = 10;
        let c = Query::with_parts("auth", SearchType::Hybrid, FilterSet::default(), opts).unwrap();
        assert_ne!(Fingerprint::derive(&a, MODEL), Fingerprint::derive(&c, MODEL));
    }

    #[test]
    fn test_model_id_participates() {
        let q = Query::new("auth", SearchType::Hybrid).unwrap();
        assert_ne!(
            Fingerprint::derive(&q, "model-a"),
            Fingerprint::derive(&q, "model-b")
        );
    }

    #[test]
    fn test_content_hash_ignores_query_shape() {
        // Same text in different queries shares the durable embedding tier
        assert_eq!(
            ContentHash::of_text("Authenticate  Users"),
            ContentHash::of_text("authenticate users")
        );
        assert_ne!(
            ContentHash::of_text("authenticate users"),
            ContentHash::of_text("revoke tokens")
        );
    }

    #[test]
    fn test_hex_display() {
        let q = Query::new("auth", SearchType::Hybrid).unwrap();
        let hex = Fingerprint::derive(&q, MODEL).to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
