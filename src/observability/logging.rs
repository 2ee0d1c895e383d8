//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for embedding binaries and tests
//! - Resolve the log filter from the environment, falling back to config
//!
//! # Design Decisions
//! - `RUST_LOG` wins over `[observability] log_level`
//! - Initialization is idempotent; a second call is a no-op

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install a fmt subscriber. Returns `false` if one was already installed.
pub fn init(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

fn default_directive(level: &str) -> String {
    format!("pooled_http_handler={}", level.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_targets_this_crate() {
        assert_eq!(default_directive("DEBUG"), "pooled_http_handler=debug");
    }

    #[test]
    fn second_init_is_a_no_op() {
        let config = ObservabilityConfig::default();
        init(&config);
        assert!(!init(&config));
    }
}
