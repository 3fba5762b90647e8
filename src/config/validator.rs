use crate::config::EngineConfig;
use crate::error::{EngineError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every failure
    pub fn validate(config: &EngineConfig) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_embedding_cache(config, &mut errors);
        Self::validate_fusion(config, &mut errors);
        Self::validate_limits(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &EngineConfig, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_cache(config: &EngineConfig, errors: &mut Vec<ValidationError>) {
        if config.cache.result_capacity == 0 {
            errors.push(ValidationError::new(
                "cache.result_capacity",
                "Result cache capacity must be greater than 0",
            ));
        }

        if config.cache.result_ttl_secs == 0 {
            errors.push(ValidationError::new(
                "cache.result_ttl_secs",
                "Result TTL must be greater than 0",
            ));
        }
    }

    fn validate_embedding_cache(config: &EngineConfig, errors: &mut Vec<ValidationError>) {
        if config.embedding_cache.l1_capacity == 0 {
            errors.push(ValidationError::new(
                "embedding_cache.l1_capacity",
                "Tier-1 capacity must be greater than 0",
            ));
        }

        if config.embedding_cache.l2_ttl_secs == 0 {
            errors.push(ValidationError::new(
                "embedding_cache.l2_ttl_secs",
                "Tier-2 TTL must be greater than 0",
            ));
        }
    }

    fn validate_fusion(config: &EngineConfig, errors: &mut Vec<ValidationError>) {
        if config.fusion.rerank_window == 0 {
            errors.push(ValidationError::new(
                "fusion.rerank_window",
                "Rerank window must be greater than 0",
            ));
        }

        if config.fusion.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "fusion.search_multiplier",
                "Search multiplier must be greater than 0",
            ));
        }
    }

    fn validate_limits(config: &EngineConfig, errors: &mut Vec<ValidationError>) {
        if config.limits.request_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "limits.request_timeout_ms",
                "Request timeout must be greater than 0",
            ));
        }

        if config.limits.max_limit == 0 {
            errors.push(ValidationError::new(
                "limits.max_limit",
                "Max limit must be greater than 0",
            ));
        }
    }
}
