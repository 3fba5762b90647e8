use thiserror::Error;

/// Main error type for the query resolution engine
///
/// Variants are typed rather than stringly-identified so callers can
/// distinguish retryable conditions (collaborator outages, timeouts)
/// from non-retryable ones (malformed queries).
#[derive(Error, Debug)]
pub enum EngineError {
    /// The embedding generator failed or is unreachable
    #[error("Embedding generator unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The vector index failed or is unreachable
    #[error("Vector index unavailable: {0}")]
    VectorIndexUnavailable(String),

    /// The lexical index failed or is unreachable
    #[error("Lexical index unavailable: {0}")]
    LexicalIndexUnavailable(String),

    /// The reranking collaborator failed or is unreachable
    #[error("Reranker unavailable: {0}")]
    RerankUnavailable(String),

    /// The per-request deadline expired before a result was assembled
    #[error("Query timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Malformed query text, filters, or options
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Result cache or in-flight table failure
    #[error("Internal cache error: {0}")]
    InternalCacheError(String),

    /// Metadata store failure while hydrating results
    #[error("Metadata store error: {0}")]
    MetadataError(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: std::path::PathBuf },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

impl EngineError {
    /// Reproduce this error for another waiter
    ///
    /// Coalescing followers receive the leader's failure; the error type
    /// holds a non-cloneable `io::Error` in one variant, so a manual
    /// duplicate stands in for `Clone`.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            EngineError::EmbeddingUnavailable(m) => EngineError::EmbeddingUnavailable(m.clone()),
            EngineError::VectorIndexUnavailable(m) => {
                EngineError::VectorIndexUnavailable(m.clone())
            }
            EngineError::LexicalIndexUnavailable(m) => {
                EngineError::LexicalIndexUnavailable(m.clone())
            }
            EngineError::RerankUnavailable(m) => EngineError::RerankUnavailable(m.clone()),
            EngineError::Timeout { elapsed_ms } => EngineError::Timeout {
                elapsed_ms: *elapsed_ms,
            },
            EngineError::InvalidQuery(m) => EngineError::InvalidQuery(m.clone()),
            EngineError::InternalCacheError(m) => EngineError::InternalCacheError(m.clone()),
            EngineError::MetadataError(m) => EngineError::MetadataError(m.clone()),
            EngineError::ConfigValidation { errors } => EngineError::ConfigValidation {
                errors: errors.clone(),
            },
            EngineError::ConfigNotFound { path } => EngineError::ConfigNotFound {
                path: path.clone(),
            },
            EngineError::Io { source, context } => EngineError::Io {
                source: std::io::Error::new(source.kind(), source.to_string()),
                context: context.clone(),
            },
            EngineError::Toml(e) => EngineError::Toml(e.clone()),
            EngineError::TomlSerialization(e) => EngineError::TomlSerialization(e.clone()),
        }
    }

    /// Whether the caller may retry the same request with backoff
    ///
    /// Collaborator outages and timeouts are transient; an invalid query
    /// will fail identically on every retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::EmbeddingUnavailable(_)
                | EngineError::VectorIndexUnavailable(_)
                | EngineError::LexicalIndexUnavailable(_)
                | EngineError::RerankUnavailable(_)
                | EngineError::Timeout { .. }
        )
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
