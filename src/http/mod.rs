//! Request handling subsystem.
//!
//! # Data Flow
//! ```text
//! RequestDescriptor + ClientDefaults
//!     → request.rs (translate into TransportParams)
//!     → handler.rs (acquire a pooled connection, execute, release)
//!     → response.rs (lowercase, list-valued headers)
//!     → HandleOutcome to the caller
//! ```

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{BlockingHandler, HandleOutcome, Handler, HandlerError, PendingResponse, SetupError};
pub use request::{translate, ClientDefaults, RequestBody, RequestDescriptor};
pub use response::{normalize, Response, ResponseDescriptor, ResponseHeaders};
