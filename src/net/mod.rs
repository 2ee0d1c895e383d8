//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint
//!     → connector.rs (DNS lookup, TCP connect under the connect timeout)
//!     → tls.rs (rustls handshake for https endpoints)
//!     → HTTP/1.1 handshake, connection driver spawned on the runtime
//!     → HyperConnection handed to the pool
//! ```
//!
//! # Design Decisions
//! - One request at a time per connection; keep-alive is the default
//! - The inactivity timeout applies to every wait on the connection
//! - TLS roots are the bundled web PKI set plus an optional CA file

pub mod connector;
pub mod tls;

pub use connector::{HyperConnection, HyperConnector, OutgoingBody};
