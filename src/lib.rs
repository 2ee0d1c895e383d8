//! Pooled HTTP request handler.
//!
//! Executes abstract request descriptions over a bounded pool of reusable
//! keep-alive connections and returns normalized responses, capturing
//! network failures as data and propagating only fatal errors.

pub mod config;
pub mod http;
pub mod net;
pub mod observability;
pub mod pool;
pub mod transport;

pub use config::schema::HandlerConfig;
pub use http::{
    BlockingHandler, HandleOutcome, Handler, HandlerError, PendingResponse, RequestDescriptor,
    Response, ResponseDescriptor,
};
pub use pool::{ConnectionPool, Endpoint, PoolConfig};
pub use transport::{FatalError, Method, NetworkFailure};
