//! Engine configuration
//!
//! Configuration is loaded from TOML, checked by [`ConfigValidator`], and
//! then treated as immutable for the lifetime of the engine. Per-query
//! knobs (weights, thresholds, pagination) live on
//! [`crate::query::SearchOptions`]; this module holds process-wide
//! settings: cache bounds, TTLs, the request deadline, and the rerank
//! window.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub cache: CacheConfig,
    pub embedding_cache: EmbeddingCacheConfig,
    pub fusion: FusionConfig,
    pub limits: LimitsConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached result sets before LRU eviction
    pub result_capacity: usize,
    /// Time-to-live for cached result sets, in seconds
    pub result_ttl_secs: u64,
    /// Interval between background expiry sweeps, in seconds
    pub sweep_interval_secs: u64,
}

/// Embedding resolver tier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCacheConfig {
    /// Tier-1 in-process LRU capacity (entries)
    pub l1_capacity: usize,
    /// Tier-2 shared cache TTL, in seconds (default on the order of hours)
    pub l2_ttl_secs: u64,
    /// Path for the tier-3 durable cache; `None` disables the tier
    pub durable_path: Option<PathBuf>,
}

/// Fusion and reranking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// How many top fused results are offered to the reranker
    pub rerank_window: usize,
    /// Each retrieval path fetches `limit * search_multiplier` candidates
    /// so fusion has enough overlap to work with
    pub search_multiplier: usize,
}

/// Request-level resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Per-request deadline, in milliseconds
    pub request_timeout_ms: u64,
    /// Upper bound on a single page of results
    pub max_limit: usize,
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EngineError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| EngineError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let config: EngineConfig = toml::from_str(&content)?;

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| EngineError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
            },
            cache: CacheConfig {
                result_capacity: 1024,
                result_ttl_secs: 300,
                sweep_interval_secs: 60,
            },
            embedding_cache: EmbeddingCacheConfig {
                l1_capacity: 512,
                l2_ttl_secs: 4 * 3600,
                durable_path: None,
            },
            fusion: FusionConfig {
                rerank_window: 50,
                search_multiplier: 3,
            },
            limits: LimitsConfig {
                request_timeout_ms: 5_000,
                max_limit: 100,
            },
        }
    }
}
