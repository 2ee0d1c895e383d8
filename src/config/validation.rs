//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (pool size, timeouts)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HandlerConfig → Result<(), Vec<ValidationError>>
//! - Runs before a handler is built from the config

use thiserror::Error;

use crate::config::schema::HandlerConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("pool.max_size must be at least 1")]
    PoolSizeZero,

    #[error("pool.block_timeout_ms must be greater than 0 when blocking is allowed")]
    BlockTimeoutZero,

    #[error("timeouts.connect_ms must be greater than 0")]
    ConnectTimeoutZero,

    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &HandlerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.pool.max_size == 0 {
        errors.push(ValidationError::PoolSizeZero);
    }
    if config.pool.allow_blocking && config.pool.block_timeout_ms == 0 {
        errors.push(ValidationError::BlockTimeoutZero);
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::ConnectTimeoutZero);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&HandlerConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = HandlerConfig::default();
        config.pool.max_size = 0;
        config.pool.block_timeout_ms = 0;
        config.timeouts.connect_ms = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::PoolSizeZero,
                ValidationError::BlockTimeoutZero,
                ValidationError::ConnectTimeoutZero,
                ValidationError::UnknownLogLevel("loud".into()),
            ]
        );
    }

    #[test]
    fn zero_block_timeout_is_fine_without_blocking() {
        let mut config = HandlerConfig::default();
        config.pool.allow_blocking = false;
        config.pool.block_timeout_ms = 0;
        assert!(validate_config(&config).is_ok());
    }
}
