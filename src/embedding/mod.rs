//! Embedding resolution through a three-tier cache
//!
//! Resolution order: in-process LRU (sub-millisecond), shared TTL map
//! (millisecond-class), durable SQLite store (tens of milliseconds),
//! then the external embedding generator. A full miss populates all
//! three tiers on the way out.
//!
//! Tiers two and three are keyed by content hash of the normalized
//! text, never by query fingerprint, so the same text embedded in
//! different queries shares cached vectors.

mod sqlite_cache;

pub use sqlite_cache::SqliteEmbeddingCache;

use crate::collaborators::EmbeddingGenerator;
use crate::config::EmbeddingCacheConfig;
use crate::error::{EngineError, Result};
use crate::fingerprint::ContentHash;
use ahash::AHashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Resolves query text to vectors via layered caches
pub struct EmbeddingResolver {
    embedder: Arc<dyn EmbeddingGenerator>,
    l1: Mutex<LruCache<ContentHash, Arc<Vec<f32>>>>,
    l2: Mutex<AHashMap<ContentHash, (Arc<Vec<f32>>, Instant)>>,
    l2_ttl: Duration,
    durable: Option<SqliteEmbeddingCache>,
}

impl EmbeddingResolver {
    pub fn new(
        embedder: Arc<dyn EmbeddingGenerator>,
        config: &EmbeddingCacheConfig,
    ) -> Result<Self> {
        let durable = match &config.durable_path {
            Some(path) => Some(SqliteEmbeddingCache::new(path)?),
            None => None,
        };

        let capacity =
            NonZeroUsize::new(config.l1_capacity.max(1)).expect("capacity is at least 1");

        Ok(Self {
            embedder,
            l1: Mutex::new(LruCache::new(capacity)),
            l2: Mutex::new(AHashMap::new()),
            l2_ttl: Duration::from_secs(config.l2_ttl_secs),
            durable,
        })
    }

    /// Identifier of the underlying model; participates in fingerprints
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Resolve a vector for `text`, consulting tiers in latency order
    ///
    /// A generator failure surfaces as `EmbeddingUnavailable`; the
    /// resolver never substitutes a zero vector. Durable-tier IO errors
    /// degrade to the next tier with a warning instead of failing the
    /// resolution.
    pub async fn resolve(&self, text: &str) -> Result<Arc<Vec<f32>>> {
        let hash = ContentHash::of_text(text);

        if let Some(vector) = self.l1_get(&hash) {
            return Ok(vector);
        }

        if let Some(vector) = self.l2_get(&hash) {
            self.l1_put(hash, Arc::clone(&vector));
            return Ok(vector);
        }

        if let Some(durable) = &self.durable {
            match durable.get(&hash, self.embedder.model_id()) {
                Ok(Some(vector)) => {
                    let vector = Arc::new(vector);
                    self.l2_put(hash, Arc::clone(&vector));
                    self.l1_put(hash, Arc::clone(&vector));
                    return Ok(vector);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "durable embedding tier read failed, falling through");
                }
            }
        }

        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| EngineError::EmbeddingUnavailable(e.to_string()))?;
        let vector = Arc::new(vector);

        if let Some(durable) = &self.durable {
            if let Err(e) = durable.put(&hash, self.embedder.model_id(), &vector) {
                tracing::warn!(error = %e, "durable embedding tier write failed");
            }
        }
        self.l2_put(hash, Arc::clone(&vector));
        self.l1_put(hash, Arc::clone(&vector));

        Ok(vector)
    }

    /// Drop every expired tier-2 entry; returns how many were removed
    ///
    /// Tier 2 otherwise only expires lazily when the same text is
    /// resolved again, so texts never queried twice would pin their
    /// vectors indefinitely.
    pub fn sweep(&self) -> usize {
        let mut l2 = self.l2.lock().unwrap_or_else(|e| e.into_inner());
        let before = l2.len();
        l2.retain(|_, (_, inserted)| inserted.elapsed() < self.l2_ttl);
        before - l2.len()
    }

    fn l1_get(&self, hash: &ContentHash) -> Option<Arc<Vec<f32>>> {
        let mut l1 = self.l1.lock().unwrap_or_else(|e| e.into_inner());
        l1.get(hash).cloned()
    }

    fn l1_put(&self, hash: ContentHash, vector: Arc<Vec<f32>>) {
        let mut l1 = self.l1.lock().unwrap_or_else(|e| e.into_inner());
        l1.put(hash, vector);
    }

    fn l2_get(&self, hash: &ContentHash) -> Option<Arc<Vec<f32>>> {
        let mut l2 = self.l2.lock().unwrap_or_else(|e| e.into_inner());
        match l2.get(hash) {
            Some((vector, inserted)) if inserted.elapsed() < self.l2_ttl => {
                Some(Arc::clone(vector))
            }
            Some(_) => {
                // expired; drop lazily
                l2.remove(hash);
                None
            }
            None => None,
        }
    }

    fn l2_put(&self, hash: ContentHash, vector: Arc<Vec<f32>>) {
        let mut l2 = self.l2.lock().unwrap_or_else(|e| e.into_inner());
        l2.insert(hash, (vector, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingGenerator for CountingEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("embedder offline");
            }
            Ok(vec![text.len() as f32, 1.0, 2.0])
        }

        fn model_id(&self) -> &str {
            "counting-model"
        }
    }

    fn config(durable: Option<std::path::PathBuf>) -> EmbeddingCacheConfig {
        EmbeddingCacheConfig {
            l1_capacity: 16,
            l2_ttl_secs: 3600,
            durable_path: durable,
        }
    }

    #[tokio::test]
    async fn test_repeat_resolution_hits_cache() {
        let embedder = Arc::new(CountingEmbedder::new());
        let resolver = EmbeddingResolver::new(embedder.clone(), &config(None)).unwrap();

        let first = resolver.resolve("authenticate users").await.unwrap();
        let second = resolver.resolve("authenticate users").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn test_normalized_text_shares_entries() {
        let embedder = Arc::new(CountingEmbedder::new());
        let resolver = EmbeddingResolver::new(embedder.clone(), &config(None)).unwrap();

        resolver.resolve("Authenticate  Users").await.unwrap();
        resolver.resolve("authenticate users").await.unwrap();

        // same content hash, one embedder call
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn test_durable_tier_shared_across_resolvers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.db");

        let first_embedder = Arc::new(CountingEmbedder::new());
        let resolver =
            EmbeddingResolver::new(first_embedder.clone(), &config(Some(path.clone()))).unwrap();
        resolver.resolve("authenticate users").await.unwrap();
        assert_eq!(first_embedder.calls(), 1);

        // a fresh resolver with cold in-process tiers finds the vector
        // in the durable tier
        let second_embedder = Arc::new(CountingEmbedder::new());
        let resolver =
            EmbeddingResolver::new(second_embedder.clone(), &config(Some(path))).unwrap();
        resolver.resolve("authenticate users").await.unwrap();
        assert_eq!(second_embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_embedder_failure_is_typed() {
        let embedder = Arc::new(CountingEmbedder::failing());
        let resolver = EmbeddingResolver::new(embedder, &config(None)).unwrap();

        let result = resolver.resolve("authenticate users").await;
        assert!(matches!(result, Err(EngineError::EmbeddingUnavailable(_))));
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_l2_entries() {
        let embedder = Arc::new(CountingEmbedder::new());
        let cfg = EmbeddingCacheConfig {
            l1_capacity: 16,
            l2_ttl_secs: 0,
            durable_path: None,
        };
        let resolver = EmbeddingResolver::new(embedder, &cfg).unwrap();

        resolver.resolve("first").await.unwrap();
        resolver.resolve("second").await.unwrap();

        // zero TTL: both entries are expired the moment they land
        assert_eq!(resolver.sweep(), 2);
        assert_eq!(resolver.sweep(), 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_entries() {
        let embedder = Arc::new(CountingEmbedder::new());
        let resolver = EmbeddingResolver::new(embedder.clone(), &config(None)).unwrap();

        resolver.resolve("authenticate users").await.unwrap();
        assert_eq!(resolver.sweep(), 0);

        resolver.resolve("authenticate users").await.unwrap();
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn test_l2_expiry_falls_through() {
        let embedder = Arc::new(CountingEmbedder::new());
        let cfg = EmbeddingCacheConfig {
            l1_capacity: 1,
            l2_ttl_secs: 0,
            durable_path: None,
        };
        let resolver = EmbeddingResolver::new(embedder.clone(), &cfg).unwrap();

        resolver.resolve("first").await.unwrap();
        // evict "first" from the single-slot tier 1
        resolver.resolve("second").await.unwrap();
        // tier 2 entry for "first" has already expired (zero TTL)
        resolver.resolve("first").await.unwrap();

        assert_eq!(embedder.calls(), 3);
    }
}
