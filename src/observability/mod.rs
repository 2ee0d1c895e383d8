//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pool and handler events:
//!     → logging.rs (structured log events, request spans)
//!     → metrics.rs (counters, gauges, histograms)
//! ```
//!
//! # Design Decisions
//! - Every `handle` call runs in a span carrying its request ID
//! - Metrics go through the `metrics` facade; no exporter is bundled

pub mod logging;
pub mod metrics;
