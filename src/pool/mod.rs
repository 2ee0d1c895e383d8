//! Connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint (scheme, host, port)
//!     → manager.rs (idle reuse, bounded opening, blocking wait)
//!     → Slot (idle lease, or reserved capacity connected on `open`)
//!     → connection.rs (exclusive lease, Deref to the transport connection)
//!     → release with a health verdict (reuse, discard or poison)
//! ```
//!
//! # Design Decisions
//! - One partition per endpoint; `max_size` bounds each partition
//! - Connects happen outside the state lock on a reserved slot
//! - A failed connection bumps the partition generation so older idle
//!   connections are retired rather than handed out again

pub mod connection;
pub mod endpoint;
pub mod manager;

pub use connection::{ConnectionId, PooledConnection, ReleaseHealth};
pub use endpoint::{Endpoint, EndpointError, Scheme};
pub use manager::{ConnectionPool, PartitionStats, PoolConfig, PoolError, Reservation, Slot};
