//! Metrics collection.
//!
//! # Responsibilities
//! - Define handler and pool metrics
//! - Record through the `metrics` facade; the embedding application
//!   installs the recorder/exporter
//!
//! # Metrics
//! - `http_handler_requests_total` (counter): requests by method, outcome
//! - `http_handler_request_duration_seconds` (histogram): latency by method
//! - `http_handler_pool_connections` (gauge): live/idle connections per endpoint
//! - `http_handler_pool_exhausted_total` (counter): exhausted acquisitions
//! - `http_handler_connections_opened_total` (counter): connects per endpoint
//! - `http_handler_connections_discarded_total` (counter): closes by reason

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::pool::Endpoint;

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Turn metric recording on or off process-wide.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Record a finished `handle` call.
pub fn record_request(method: &str, outcome: &'static str, start: Instant) {
    if !is_enabled() {
        return;
    }
    let elapsed = start.elapsed().as_secs_f64();
    ::metrics::counter!(
        "http_handler_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!(
        "http_handler_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(elapsed);
}

pub fn record_pool_state(endpoint: &Endpoint, live: usize, idle: usize) {
    if !is_enabled() {
        return;
    }
    let endpoint = endpoint.to_string();
    ::metrics::gauge!(
        "http_handler_pool_connections",
        "endpoint" => endpoint.clone(),
        "state" => "live"
    )
    .set(live as f64);
    ::metrics::gauge!(
        "http_handler_pool_connections",
        "endpoint" => endpoint,
        "state" => "idle"
    )
    .set(idle as f64);
}

pub fn record_pool_exhausted(endpoint: &Endpoint) {
    if !is_enabled() {
        return;
    }
    ::metrics::counter!(
        "http_handler_pool_exhausted_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

pub fn record_connection_opened(endpoint: &Endpoint) {
    if !is_enabled() {
        return;
    }
    ::metrics::counter!(
        "http_handler_connections_opened_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

pub fn record_connections_discarded(endpoint: &Endpoint, reason: &'static str, count: usize) {
    if !is_enabled() {
        return;
    }
    ::metrics::counter!(
        "http_handler_connections_discarded_total",
        "endpoint" => endpoint.to_string(),
        "reason" => reason
    )
    .increment(count as u64);
}
