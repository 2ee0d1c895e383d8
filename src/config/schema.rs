//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the handler.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pool::PoolConfig;

/// Root configuration for the request handler.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HandlerConfig {
    /// Connection pool sizing and blocking policy.
    pub pool: PoolSettings,

    /// Connect and inactivity timeouts.
    pub timeouts: TimeoutConfig,

    /// Per-request client defaults.
    pub client: ClientConfig,

    /// Extra trust roots for HTTPS endpoints.
    pub tls: TlsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl HandlerConfig {
    /// Pool configuration derived from the `[pool]` section.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.pool.max_size,
            allow_blocking: self.pool.allow_blocking,
            block_timeout: Duration::from_millis(self.pool.block_timeout_ms),
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum live connections per endpoint.
    pub max_size: usize,

    /// Wait for a released connection when the pool is exhausted.
    pub allow_blocking: bool,

    /// How long to wait for a released connection, in milliseconds.
    pub block_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 5,
            allow_blocking: true,
            block_timeout_ms: 10_000,
        }
    }
}

/// Timeout configuration for connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Per-connection inactivity timeout in milliseconds (0 disables it).
    pub inactivity_ms: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    /// `None` when the inactivity timeout is disabled.
    pub fn inactivity(&self) -> Option<Duration> {
        (self.inactivity_ms > 0).then(|| Duration::from_millis(self.inactivity_ms))
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            inactivity_ms: 0,
        }
    }
}

/// Defaults applied to every request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Dispatch requests without waiting for their completion.
    pub async_mode: bool,

    /// HTTP keep-alive. Always forced on when the handler is built.
    pub keepalive: bool,

    /// Transport-specific options forwarded verbatim to every request.
    pub options: Map<String, Value>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            async_mode: false,
            keepalive: true,
            options: Map::new(),
        }
    }
}

/// TLS configuration for HTTPS endpoints.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Optional PEM bundle added on top of the bundled web roots.
    pub ca_file: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Record pool and request metrics through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = HandlerConfig::default();
        let pool = config.pool_config();
        assert_eq!(pool.max_size, 5);
        assert!(pool.allow_blocking);
        assert_eq!(pool.block_timeout, Duration::from_secs(10));
        assert_eq!(config.timeouts.connect(), Duration::from_secs(10));
        assert_eq!(config.timeouts.inactivity(), None);
        assert!(config.client.keepalive);
        assert!(!config.client.async_mode);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: HandlerConfig = toml::from_str(
            r#"
            [pool]
            max_size = 20
            allow_blocking = false

            [timeouts]
            inactivity_ms = 250

            [client.options]
            foo = "BAR"
            private_key_file = "blarg"
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.max_size, 20);
        assert!(!config.pool.allow_blocking);
        assert_eq!(config.pool.block_timeout_ms, 10_000);
        assert_eq!(config.timeouts.inactivity(), Some(Duration::from_millis(250)));
        assert_eq!(config.client.options["foo"], "BAR");
        assert_eq!(config.client.options["private_key_file"], "blarg");
    }
}
