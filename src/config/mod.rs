//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or HandlerConfig::default()
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HandlerConfig (validated, immutable)
//!     → consumed once when the handler is built
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a handler is built from it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::HandlerConfig;
pub use schema::ObservabilityConfig;
pub use schema::PoolSettings;
pub use schema::TimeoutConfig;
pub use schema::TlsConfig;
pub use validation::{validate_config, ValidationError};
