//! Fingerprint-keyed result cache with LRU eviction and TTL expiry
//!
//! Entries are shared (`Arc`) across concurrent readers and replaced
//! whole, never mutated in place. A secondary index maps document and
//! source identifiers to the fingerprints whose cached result sets
//! involved them, so an external mutation can invalidate exactly the
//! affected entries.

use crate::fingerprint::Fingerprint;
use crate::retrieval::ScoredResult;
use ahash::{AHashMap, AHashSet};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What to invalidate after an external mutation
#[derive(Debug, Clone)]
pub enum InvalidationScope {
    /// Remove entries whose result set referenced a fragment of this document
    Document(String),
    /// Remove entries scoped to this source, plus entries that were not
    /// source-filtered at all (they may contain fragments of any source)
    Source(String),
}

/// Cache hit/miss/eviction counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub entries: usize,
}

struct CacheEntry {
    results: Arc<Vec<ScoredResult>>,
    created: Instant,
    ttl: Duration,
    /// Document ids referenced by the result set, for index cleanup
    document_ids: Vec<String>,
    /// Source filter of the originating query; empty means unscoped
    source_keys: Vec<String>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created) >= self.ttl
    }
}

struct Inner {
    entries: LruCache<Fingerprint, CacheEntry>,
    by_document: AHashMap<String, AHashSet<Fingerprint>>,
    by_source: AHashMap<String, AHashSet<Fingerprint>>,
    /// Fingerprints of entries with no source filter
    unscoped: AHashSet<Fingerprint>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
}

/// Bounded, TTL-expiring cache of final ranked result sets
pub struct ResultCache {
    inner: Mutex<Inner>,
    default_ttl: Duration,
}

impl ResultCache {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                by_document: AHashMap::new(),
                by_source: AHashMap::new(),
                unscoped: AHashSet::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
                invalidations: 0,
            }),
            default_ttl,
        }
    }

    /// Look up a non-expired entry, promoting it in LRU order
    ///
    /// Expired entries are removed lazily here; a periodic [`sweep`]
    /// catches entries that are never touched again.
    ///
    /// [`sweep`]: ResultCache::sweep
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<Vec<ScoredResult>>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Instant::now();

        match inner.entries.get(fingerprint) {
            Some(entry) if !entry.is_expired(now) => {
                let results = Arc::clone(&entry.results);
                inner.hits += 1;
                return Some(results);
            }
            Some(_) => {
                remove_entry(inner, fingerprint);
                inner.expirations += 1;
            }
            None => {}
        }

        inner.misses += 1;
        None
    }

    /// Insert a freshly computed result set, replacing any prior entry
    ///
    /// `source_filter` is the originating query's source restriction;
    /// it scopes source-level invalidation.
    pub fn store(
        &self,
        fingerprint: Fingerprint,
        results: Arc<Vec<ScoredResult>>,
        source_filter: &[String],
    ) {
        let mut document_ids: Vec<String> = results
            .iter()
            .map(|r| r.fragment.document_id.clone())
            .collect();
        document_ids.sort();
        document_ids.dedup();

        let entry = CacheEntry {
            results,
            created: Instant::now(),
            ttl: self.default_ttl,
            document_ids: document_ids.clone(),
            source_keys: source_filter.to_vec(),
        };

        let mut inner = self.lock();

        // replace-then-index keeps the secondary index consistent with
        // the entry actually stored
        remove_entry(&mut inner, &fingerprint);

        if let Some((evicted_fp, evicted)) = inner.entries.push(fingerprint, entry) {
            if evicted_fp != fingerprint {
                unindex(&mut inner, &evicted_fp, &evicted);
                inner.evictions += 1;
            }
        }

        for document_id in document_ids {
            inner
                .by_document
                .entry(document_id)
                .or_default()
                .insert(fingerprint);
        }
        if source_filter.is_empty() {
            inner.unscoped.insert(fingerprint);
        } else {
            for source in source_filter {
                inner
                    .by_source
                    .entry(source.clone())
                    .or_default()
                    .insert(fingerprint);
            }
        }
    }

    /// Remove entries matching the scope; returns how many were dropped
    pub fn invalidate(&self, scope: &InvalidationScope) -> usize {
        let mut inner = self.lock();

        let fingerprints: Vec<Fingerprint> = match scope {
            InvalidationScope::Document(document_id) => inner
                .by_document
                .get(document_id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
            InvalidationScope::Source(source) => {
                let mut set: AHashSet<Fingerprint> = inner
                    .by_source
                    .get(source)
                    .cloned()
                    .unwrap_or_default();
                // entries with no source filter may hold fragments of
                // any source; take the coarse path for them
                set.extend(inner.unscoped.iter().copied());
                set.into_iter().collect()
            }
        };

        let mut removed = 0;
        for fingerprint in fingerprints {
            if remove_entry(&mut inner, &fingerprint) {
                removed += 1;
            }
        }
        inner.invalidations += removed as u64;

        if removed > 0 {
            tracing::debug!(?scope, removed, "invalidated cached result sets");
        }
        removed
    }

    /// Drop every expired entry; returns how many were removed
    pub fn sweep(&self) -> usize {
        let mut inner = self.lock();
        let now = Instant::now();

        let expired: Vec<Fingerprint> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(fingerprint, _)| *fingerprint)
            .collect();

        for fingerprint in &expired {
            remove_entry(&mut inner, fingerprint);
        }
        inner.expirations += expired.len() as u64;

        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "swept expired result cache entries");
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
            invalidations: inner.invalidations,
            entries: inner.entries.len(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned cache lock means a panic mid-mutation; the entry
        // layout is still sound because mutations are single-entry
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Remove one entry and its secondary-index references
fn remove_entry(inner: &mut Inner, fingerprint: &Fingerprint) -> bool {
    match inner.entries.pop(fingerprint) {
        Some(entry) => {
            unindex(inner, fingerprint, &entry);
            true
        }
        None => false,
    }
}

fn unindex(inner: &mut Inner, fingerprint: &Fingerprint, entry: &CacheEntry) {
    for document_id in &entry.document_ids {
        if let Some(set) = inner.by_document.get_mut(document_id) {
            set.remove(fingerprint);
            if set.is_empty() {
                inner.by_document.remove(document_id);
            }
        }
    }
    for source in &entry.source_keys {
        if let Some(set) = inner.by_source.get_mut(source) {
            set.remove(fingerprint);
            if set.is_empty() {
                inner.by_source.remove(source);
            }
        }
    }
    inner.unscoped.remove(fingerprint);
}
