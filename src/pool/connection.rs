//! Connection leases and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Lend a pooled connection exclusively to one request
//! - Hand the connection back to its pool with a health verdict

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::pool::manager::PoolInner;
use crate::pool::Endpoint;
use crate::transport::Connector;

/// Global atomic counter for connection IDs.
/// Relaxed ordering: only uniqueness is needed.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Verdict passed back to the pool when a lease ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseHealth {
    /// The connection finished cleanly and may carry another request.
    Reusable,
    /// Close this connection only.
    Discard,
    /// Close this connection and retire every idle connection to the same
    /// endpoint opened before it.
    Poison,
}

impl ReleaseHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseHealth::Reusable => "reusable",
            ReleaseHealth::Discard => "discard",
            ReleaseHealth::Poison => "poison",
        }
    }
}

/// Exclusive loan of a pooled connection.
///
/// Dropping the lease without calling [`release`](Self::release) returns
/// the connection with [`ReleaseHealth::Discard`].
pub struct PooledConnection<C: Connector> {
    connection: Option<C::Connection>,
    id: ConnectionId,
    generation: u64,
    reused: bool,
    endpoint: Endpoint,
    pool: Arc<PoolInner<C>>,
}

impl<C: Connector> PooledConnection<C> {
    pub(crate) fn new(
        connection: C::Connection,
        id: ConnectionId,
        generation: u64,
        reused: bool,
        endpoint: Endpoint,
        pool: Arc<PoolInner<C>>,
    ) -> Self {
        Self {
            connection: Some(connection),
            id,
            generation,
            reused,
            endpoint,
            pool,
        }
    }

    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Partition generation the connection was opened under.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this lease came from the idle set rather than a fresh connect.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Return the connection to the pool.
    pub fn release(mut self, health: ReleaseHealth) {
        if let Some(connection) = self.connection.take() {
            self.pool
                .check_in(&self.endpoint, self.id, self.generation, connection, health);
        }
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection is present until released")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection is present until released")
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::trace!(connection_id = %self.id, "Lease dropped without release");
            self.pool.check_in(
                &self.endpoint,
                self.id,
                self.generation,
                connection,
                ReleaseHealth::Discard,
            );
        }
    }
}

impl<C: Connector> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("generation", &self.generation)
            .field("reused", &self.reused)
            .finish()
    }
}
