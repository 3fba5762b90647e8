//! Query orchestration
//!
//! [`QueryEngine`] sequences a request through fingerprint derivation,
//! the result cache, in-flight coalescing, concurrent retrieval, fusion,
//! optional reranking, pagination, and hydration. Degradation policy:
//! under hybrid search the loss of one retrieval path (or the reranker)
//! produces a flagged partial response, never a failed query; a path the
//! caller explicitly requested alone surfaces its failure.

use crate::cache::{
    follower_outcome, ComputedSet, Flight, InflightTable, InvalidationScope, ResultCache,
};
use crate::collaborators::{
    EmbeddingGenerator, Fragment, LexicalIndex, MetadataStore, Reranker, RerankCandidate,
    VectorIndex,
};
use crate::config::EngineConfig;
use crate::embedding::EmbeddingResolver;
use crate::error::{EngineError, Result};
use crate::fingerprint::Fingerprint;
use crate::query::{FilterSet, Query, SearchType};
use crate::retrieval::{
    apply_rerank_order, fuse, FusionWeights, LexicalRetriever, ScoredResult, VectorRetriever,
};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One hit in the externally visible response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub fragment_id: String,
    pub document_id: String,
    /// Fragment content, when `include_content` was requested
    pub content: Option<String>,
    /// Neighboring fragments, when a context window was requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Fragment>,
    /// Raw per-path scores, kept for explainability
    pub vector_score: Option<f32>,
    pub lexical_score: Option<f32>,
    pub fused_score: f32,
    pub rank: usize,
}

/// Pagination metadata for one response page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    /// Total fused results before pagination
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// How the response was produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// The search type actually executed
    pub search_type: SearchType,
    pub duration_ms: u64,
    /// True when any retrieval path or the reranker was unavailable
    pub degraded: bool,
    pub vector_available: bool,
    pub lexical_available: bool,
    pub cache_hit: bool,
    pub reranked: bool,
}

/// The engine's externally visible response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub pagination: Pagination,
    pub metadata: SearchMetadata,
}

/// The query resolution engine façade
///
/// Owns the shared caches and the in-flight table; collaborators are
/// injected behind their trait seams. Construction happens once at
/// process bootstrap and the engine is shared (`Arc`) across request
/// handlers.
pub struct QueryEngine {
    config: EngineConfig,
    resolver: EmbeddingResolver,
    vector: VectorRetriever,
    lexical: LexicalRetriever,
    reranker: Option<Arc<dyn Reranker>>,
    metadata: Arc<dyn MetadataStore>,
    cache: ResultCache,
    inflight: InflightTable,
}

impl QueryEngine {
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingGenerator>,
        vector_index: Arc<dyn VectorIndex>,
        lexical_index: Arc<dyn LexicalIndex>,
        reranker: Option<Arc<dyn Reranker>>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        crate::config::ConfigValidator::validate(&config)?;

        let resolver = EmbeddingResolver::new(embedder, &config.embedding_cache)?;
        let cache = ResultCache::new(
            config.cache.result_capacity,
            Duration::from_secs(config.cache.result_ttl_secs),
        );

        info!(
            model = resolver.model_id(),
            result_capacity = config.cache.result_capacity,
            "query engine initialized"
        );

        Ok(Self {
            config,
            resolver,
            vector: VectorRetriever::new(vector_index),
            lexical: LexicalRetriever::new(lexical_index),
            reranker,
            metadata,
            cache,
            inflight: InflightTable::new(),
        })
    }

    /// Resolve a query into a ranked, paginated response
    pub async fn search(&self, query: Query) -> Result<SearchResponse> {
        let started = Instant::now();
        query.validate()?;

        if query.options.limit > self.config.limits.max_limit {
            return Err(EngineError::InvalidQuery(format!(
                "limit {} exceeds maximum {}",
                query.options.limit, self.config.limits.max_limit
            )));
        }

        let fingerprint = Fingerprint::derive(&query, self.resolver.model_id());

        if let Some(results) = self.cache.get(&fingerprint) {
            debug!(%fingerprint, "result cache hit");
            let set = ComputedSet {
                results,
                degraded: false,
                vector_available: true,
                lexical_available: true,
                reranked: query.options.rerank,
            };
            return self.assemble(&query, set, true, started).await;
        }

        let set = match self.inflight.join_or_lead(fingerprint) {
            Flight::Follower(mut rx) => {
                debug!(%fingerprint, "coalescing onto in-flight computation");
                follower_outcome(rx.recv().await)?
            }
            Flight::Leader(guard) => {
                let deadline = Duration::from_millis(self.config.limits.request_timeout_ms);
                let outcome = match tokio::time::timeout(deadline, self.compute(&query)).await {
                    Ok(Ok(set)) => Ok(set),
                    Ok(Err(e)) => Err(Arc::new(e)),
                    Err(_) => Err(Arc::new(EngineError::Timeout {
                        elapsed_ms: deadline.as_millis() as u64,
                    })),
                };

                if let Ok(set) = &outcome {
                    // degraded sets are partial; keep them out of the
                    // cache so the next request retries at full quality
                    if !set.degraded {
                        self.cache.store(
                            fingerprint,
                            Arc::clone(&set.results),
                            &query.filters.sources,
                        );
                    }
                }

                // followers receive success and failure alike
                guard.publish(outcome.clone());

                match outcome {
                    Ok(set) => set,
                    Err(e) => return Err(e.duplicate()),
                }
            }
        };

        self.assemble(&query, set, false, started).await
    }

    /// Find fragments similar to a stored one, bypassing the embedder
    ///
    /// Substitutes the fragment's stored vector for a freshly embedded
    /// query; the fragment itself is excluded from the results.
    pub async fn similar(&self, fragment_id: &str, limit: usize) -> Result<SearchResponse> {
        let started = Instant::now();

        if limit == 0 || limit > self.config.limits.max_limit {
            return Err(EngineError::InvalidQuery(format!(
                "limit must be in 1..={}",
                self.config.limits.max_limit
            )));
        }

        let vector = self
            .metadata
            .get_vector(fragment_id)
            .await
            .map_err(|e| EngineError::MetadataError(e.to_string()))?
            .ok_or_else(|| {
                EngineError::InvalidQuery(format!("unknown fragment: {}", fragment_id))
            })?;

        // fetch one extra so excluding the fragment itself still fills
        // the page
        let hits = self
            .vector
            .search(&vector, &FilterSet::default(), limit + 1, 0.0)
            .await?;
        let hits: Vec<_> = hits
            .into_iter()
            .filter(|hit| hit.fragment_id != fragment_id)
            .take(limit)
            .collect();

        let results = fuse(
            &hits,
            &[],
            FusionWeights {
                vector: 1.0,
                lexical: 0.0,
            },
            0.0,
        );
        let total = results.len();

        let hydrated = self.hydrate(&results, true, 0).await?;

        Ok(SearchResponse {
            results: hydrated,
            pagination: Pagination {
                total,
                offset: 0,
                limit,
                has_more: false,
            },
            metadata: SearchMetadata {
                search_type: SearchType::Vector,
                duration_ms: started.elapsed().as_millis() as u64,
                degraded: false,
                vector_available: true,
                lexical_available: true,
                cache_hit: false,
                reranked: false,
            },
        })
    }

    /// Drop cached result sets affected by an external mutation
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, scope: InvalidationScope) -> usize {
        self.cache.invalidate(&scope)
    }

    /// Hit/miss/eviction counters for the result cache
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// Remove expired result cache and embedding tier-2 entries; see
    /// config `sweep_interval_secs`
    ///
    /// The process bootstrap owns the sweep schedule; expiry is also
    /// checked lazily on access, so skipping the sweep only delays
    /// memory reclamation.
    pub fn sweep_caches(&self) -> usize {
        self.cache.sweep() + self.resolver.sweep()
    }

    /// Run the full retrieval pipeline for a cache miss
    async fn compute(&self, query: &Query) -> Result<ComputedSet> {
        let options = &query.options;
        // saturating: offset is caller-controlled and unbounded
        let fetch_limit = options
            .offset
            .saturating_add(options.limit)
            .max(self.config.fusion.rerank_window)
            .saturating_mul(self.config.fusion.search_multiplier);

        // raw-score threshold is only meaningful when the caller sees
        // the raw scale; hybrid filters on the fused score instead
        let raw_min_score = if query.search_type == SearchType::Vector {
            options.min_score
        } else {
            0.0
        };

        let vector_branch = async {
            if !query.search_type.uses_vector() {
                return Ok(None);
            }
            let vector = self.resolver.resolve(&query.text).await?;
            let hits = self
                .vector
                .search(&vector, &query.filters, fetch_limit, raw_min_score)
                .await?;
            Ok(Some(hits))
        };

        let lexical_branch = async {
            if !query.search_type.uses_lexical() {
                return Ok(None);
            }
            let hits = self
                .lexical
                .search(&query.text, &query.filters, fetch_limit)
                .await?;
            Ok(Some(hits))
        };

        let (vector_outcome, lexical_outcome): (Result<_>, Result<_>) =
            tokio::join!(vector_branch, lexical_branch);

        let mut vector_available = true;
        let mut lexical_available = true;

        let vector_hits = match vector_outcome {
            Ok(hits) => hits.unwrap_or_default(),
            // embedding loss means the vector path cannot run at all;
            // it surfaces unless the query never needed it
            Err(e @ EngineError::EmbeddingUnavailable(_)) => return Err(e),
            Err(e) => {
                if query.search_type != SearchType::Hybrid {
                    return Err(e);
                }
                warn!(error = %e, "vector path down, degrading to lexical-only");
                vector_available = false;
                Vec::new()
            }
        };

        let lexical_hits = match lexical_outcome {
            Ok(hits) => hits.unwrap_or_default(),
            Err(e) => {
                if query.search_type != SearchType::Hybrid {
                    return Err(e);
                }
                warn!(error = %e, "lexical path down, degrading to vector-only");
                lexical_available = false;
                Vec::new()
            }
        };

        if !vector_available && !lexical_available {
            return Err(EngineError::VectorIndexUnavailable(
                "both retrieval paths are unavailable".to_string(),
            ));
        }

        let mut results = fuse(
            &vector_hits,
            &lexical_hits,
            FusionWeights {
                vector: options.vector_weight,
                lexical: options.lexical_weight,
            },
            options.min_score,
        );

        let mut reranked = false;
        let mut rerank_degraded = false;
        if options.rerank {
            match self.rerank(query, &mut results).await {
                Ok(()) => reranked = true,
                Err(e) => {
                    // always recovered: the pre-rerank fused order stands
                    warn!(error = %e, "reranker unavailable, keeping fused order");
                    rerank_degraded = true;
                }
            }
        }

        let degraded = !vector_available || !lexical_available || rerank_degraded;

        Ok(ComputedSet {
            results: Arc::new(results),
            degraded,
            vector_available,
            lexical_available,
            reranked,
        })
    }

    /// Rerank the top window in place
    async fn rerank(&self, query: &Query, results: &mut Vec<ScoredResult>) -> Result<()> {
        let reranker = self
            .reranker
            .as_ref()
            .ok_or_else(|| EngineError::RerankUnavailable("no reranker configured".to_string()))?;

        let window = self.config.fusion.rerank_window.min(results.len());
        if window < 2 {
            return Ok(());
        }

        let window_ids: Vec<String> = results[..window]
            .iter()
            .map(|r| r.fragment.fragment_id.clone())
            .collect();

        let fragments = self
            .metadata
            .get_fragments(&window_ids)
            .await
            .map_err(|e| EngineError::RerankUnavailable(e.to_string()))?;
        let content_by_id: AHashMap<&str, &str> = fragments
            .iter()
            .map(|f| (f.id.as_str(), f.content.as_str()))
            .collect();

        let candidates: Vec<RerankCandidate> = window_ids
            .iter()
            .map(|id| RerankCandidate {
                fragment_id: id.clone(),
                content: content_by_id.get(id.as_str()).unwrap_or(&"").to_string(),
            })
            .collect();

        let order = reranker
            .rerank(&query.text, &candidates)
            .await
            .map_err(|e| EngineError::RerankUnavailable(e.to_string()))?;

        apply_rerank_order(results, &order, window);
        Ok(())
    }

    /// Paginate, hydrate, and wrap a computed set into a response
    async fn assemble(
        &self,
        query: &Query,
        set: ComputedSet,
        cache_hit: bool,
        started: Instant,
    ) -> Result<SearchResponse> {
        let options = &query.options;
        let total = set.results.len();

        let page: Vec<ScoredResult> = set
            .results
            .iter()
            .skip(options.offset)
            .take(options.limit)
            .cloned()
            .collect();
        let has_more = options.offset + page.len() < total;

        let results = self
            .hydrate(&page, options.include_content, options.context_window)
            .await?;

        Ok(SearchResponse {
            results,
            pagination: Pagination {
                total,
                offset: options.offset,
                limit: options.limit,
                has_more,
            },
            metadata: SearchMetadata {
                search_type: query.search_type,
                duration_ms: started.elapsed().as_millis() as u64,
                degraded: set.degraded,
                vector_available: set.vector_available,
                lexical_available: set.lexical_available,
                cache_hit,
                reranked: set.reranked,
            },
        })
    }

    /// Attach content and context-window fragments to a result page
    async fn hydrate(
        &self,
        page: &[ScoredResult],
        include_content: bool,
        context_window: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut content_by_id: AHashMap<String, String> = AHashMap::new();
        if include_content && !page.is_empty() {
            let ids: Vec<String> = page
                .iter()
                .map(|r| r.fragment.fragment_id.clone())
                .collect();
            let fragments = self
                .metadata
                .get_fragments(&ids)
                .await
                .map_err(|e| EngineError::MetadataError(e.to_string()))?;
            for fragment in fragments {
                content_by_id.insert(fragment.id.clone(), fragment.content);
            }
        }

        let mut hits = Vec::with_capacity(page.len());
        for result in page {
            let context = if context_window > 0 {
                self.metadata
                    .get_neighbors(&result.fragment.fragment_id, context_window, context_window)
                    .await
                    .map_err(|e| EngineError::MetadataError(e.to_string()))?
            } else {
                Vec::new()
            };

            hits.push(SearchHit {
                fragment_id: result.fragment.fragment_id.clone(),
                document_id: result.fragment.document_id.clone(),
                content: if include_content {
                    content_by_id.remove(&result.fragment.fragment_id)
                } else {
                    None
                },
                context,
                vector_score: result.vector_score,
                lexical_score: result.lexical_score,
                fused_score: result.fused_score,
                rank: result.rank,
            });
        }

        Ok(hits)
    }
}
