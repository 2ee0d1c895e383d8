//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! TransportParams (from the request translator)
//!     → executor.rs (issue call on a borrowed Connection, await completion)
//!     → zero-status check (status 0 → timeout)
//!     → error.rs (classify failures: Fatal vs NetworkFailure)
//!     → Outcome handed to the response normalizer
//! ```
//!
//! # Design Decisions
//! - `Connector`/`Connection` are the seam between pooling and the wire;
//!   `net` provides the hyper implementation
//! - A connection is used by one call at a time (`&mut self`)
//! - Classification is a closed enum, checked in one place

use std::future::Future;

use bytes::Bytes;

use crate::pool::Endpoint;

pub mod error;
pub mod executor;
pub mod params;

#[cfg(test)]
pub(crate) mod mock;

pub use error::{classify, Classified, FatalError, FatalKind, NetworkErrorKind, NetworkFailure, TransportError};
pub use executor::{execute, Outcome};
pub use params::{
    Method, ParseMethodError, Payload, TimeoutOverrides, TransportParams, TIMEOUT_OPTION_KEYS,
};

/// Consumer for body chunks, called in arrival order.
pub type ChunkSink = dyn FnMut(Bytes) + Send;

/// A raw header value as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawHeaderValue {
    Single(String),
    List(Vec<String>),
}

/// A completed transport response, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, RawHeaderValue)>,
    pub body: Bytes,
}

/// An open, reusable connection to one endpoint.
pub trait Connection: Send + 'static {
    /// Issue one call and wait for the complete response.
    ///
    /// Body chunks are handed to `on_chunk` as they arrive; the full body is
    /// still assembled into the returned response.
    fn call(
        &mut self,
        params: &TransportParams,
        on_chunk: Option<&mut ChunkSink>,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;

    /// Whether the connection can still carry requests.
    fn is_open(&self) -> bool;
}

/// Opens new connections for the pool.
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    /// Open a connection, honoring any per-request timeout overrides.
    fn connect(
        &self,
        endpoint: &Endpoint,
        timeouts: &TimeoutOverrides,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}
