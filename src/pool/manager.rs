//! Connection pool management.
//!
//! # Responsibilities
//! - Keep idle connections per endpoint and hand them out for reuse
//! - Enforce `max_size` live connections per endpoint
//! - Park callers when a partition is exhausted, up to `block_timeout`
//! - Retire failed connections instead of reusing them
//! - Close everything on shutdown
//!
//! All bookkeeping sits behind one mutex that is never held across an
//! await; connects happen outside the lock on a reserved slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::observability::metrics;
use crate::pool::connection::{ConnectionId, PooledConnection, ReleaseHealth};
use crate::pool::Endpoint;
use crate::transport::{Connection, Connector, TimeoutOverrides, TransportError};

/// Pool sizing and blocking policy. Immutable once the pool is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum live connections per endpoint.
    pub max_size: usize,
    /// Wait for a release when exhausted instead of failing at once.
    pub allow_blocking: bool,
    /// Longest wait for a release.
    pub block_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5,
            allow_blocking: true,
            block_timeout: Duration::from_secs(10),
        }
    }
}

/// Pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("connection pool exhausted for {endpoint}")]
    Exhausted { endpoint: Endpoint },

    #[error("connection pool is closed")]
    Closed,

    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: TransportError,
    },
}

/// Point-in-time view of one endpoint's partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionStats {
    /// Connections open or being opened.
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Connections successfully opened over the pool's lifetime.
    pub opened: u64,
    /// Checkouts served from the idle set.
    pub reused: u64,
    pub generation: u64,
}

struct IdleSlot<T> {
    id: ConnectionId,
    generation: u64,
    connection: T,
}

struct Partition<T> {
    /// Most recently released last.
    idle: Vec<IdleSlot<T>>,
    live: usize,
    generation: u64,
    opened: u64,
    reused: u64,
}

impl<T> Default for Partition<T> {
    fn default() -> Self {
        Self {
            idle: Vec::new(),
            live: 0,
            generation: 0,
            opened: 0,
            reused: 0,
        }
    }
}

impl<T> Partition<T> {
    fn stats(&self) -> PartitionStats {
        PartitionStats {
            live: self.live,
            idle: self.idle.len(),
            in_use: self.live.saturating_sub(self.idle.len()),
            opened: self.opened,
            reused: self.reused,
            generation: self.generation,
        }
    }
}

struct PoolState<T> {
    partitions: HashMap<Endpoint, Partition<T>>,
    closed: bool,
}

pub(crate) struct PoolInner<C: Connector> {
    config: PoolConfig,
    connector: C,
    state: Mutex<PoolState<C::Connection>>,
    /// Woken whenever a slot may have become available.
    released: Notify,
}

impl<C: Connector> PoolInner<C> {
    fn lock_state(&self) -> MutexGuard<'_, PoolState<C::Connection>> {
        // Bookkeeping never panics mid-update, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take back a lent connection.
    pub(crate) fn check_in(
        &self,
        endpoint: &Endpoint,
        id: ConnectionId,
        generation: u64,
        connection: C::Connection,
        health: ReleaseHealth,
    ) {
        let mut closed = Vec::new();
        {
            let mut state = self.lock_state();
            let pool_closed = state.closed;
            match state.partitions.get_mut(endpoint) {
                Some(partition) if !pool_closed => {
                    let current = generation == partition.generation;
                    if health == ReleaseHealth::Reusable && current && connection.is_open() {
                        partition.idle.push(IdleSlot { id, generation, connection });
                    } else {
                        partition.live = partition.live.saturating_sub(1);
                        closed.push(connection);
                        if health == ReleaseHealth::Poison && current {
                            partition.generation += 1;
                            let retired = partition.idle.len();
                            partition.live = partition.live.saturating_sub(retired);
                            closed.extend(partition.idle.drain(..).map(|slot| slot.connection));
                        }
                    }
                    metrics::record_pool_state(endpoint, partition.live, partition.idle.len());
                }
                _ => closed.push(connection),
            }
        }

        if !closed.is_empty() {
            debug!(
                connection_id = %id,
                endpoint = %endpoint,
                health = health.as_str(),
                closed = closed.len(),
                "Connection discarded"
            );
            metrics::record_connections_discarded(endpoint, health.as_str(), closed.len());
        }
        drop(closed);
        self.released.notify_waiters();
    }

    fn unreserve(&self, endpoint: &Endpoint) {
        {
            let mut state = self.lock_state();
            if let Some(partition) = state.partitions.get_mut(endpoint) {
                partition.live = partition.live.saturating_sub(1);
            }
        }
        self.released.notify_waiters();
    }
}

/// Capacity claimed from a partition: an idle connection ready for use, or
/// a reserved slot a new connection still has to be opened in.
pub enum Slot<C: Connector> {
    Idle(PooledConnection<C>),
    Reserved(Reservation<C>),
}

impl<C: Connector> Slot<C> {
    /// Turn the slot into a usable lease, connecting if needed.
    pub async fn open(self, timeouts: &TimeoutOverrides) -> Result<PooledConnection<C>, PoolError> {
        match self {
            Slot::Idle(lease) => Ok(lease),
            Slot::Reserved(reservation) => reservation.connect(timeouts).await,
        }
    }
}

/// A counted but not yet connected slot.
///
/// Dropping it without connecting frees the slot.
pub struct Reservation<C: Connector> {
    pool: Arc<PoolInner<C>>,
    endpoint: Endpoint,
    generation: u64,
    armed: bool,
}

impl<C: Connector> Reservation<C> {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect(mut self, timeouts: &TimeoutOverrides) -> Result<PooledConnection<C>, PoolError> {
        let connected = self.pool.connector.connect(&self.endpoint, timeouts).await;
        match connected {
            Ok(connection) => {
                self.armed = false;
                let id = ConnectionId::new();
                {
                    let mut state = self.pool.lock_state();
                    if let Some(partition) = state.partitions.get_mut(&self.endpoint) {
                        partition.opened += 1;
                        metrics::record_pool_state(&self.endpoint, partition.live, partition.idle.len());
                    }
                }
                debug!(connection_id = %id, endpoint = %self.endpoint, "Opened pooled connection");
                metrics::record_connection_opened(&self.endpoint);
                Ok(PooledConnection::new(
                    connection,
                    id,
                    self.generation,
                    false,
                    self.endpoint.clone(),
                    Arc::clone(&self.pool),
                ))
            }
            Err(source) => {
                let endpoint = self.endpoint.clone();
                drop(self);
                warn!(endpoint = %endpoint, error = %source, "Failed to open connection");
                Err(PoolError::Connect { endpoint, source })
            }
        }
    }
}

impl<C: Connector> Drop for Reservation<C> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.unreserve(&self.endpoint);
        }
    }
}

/// Bounded pool of reusable connections, partitioned by endpoint.
///
/// Clones share the same pool.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(config: PoolConfig, connector: C) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                connector,
                state: Mutex::new(PoolState {
                    partitions: HashMap::new(),
                    closed: false,
                }),
                released: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// Borrow a connection to `endpoint`.
    ///
    /// Reuses an idle connection when one is available, opens a new one
    /// while the partition is below `max_size`, and otherwise waits for a
    /// release (if blocking is allowed) until `block_timeout` elapses.
    pub async fn acquire(&self, endpoint: &Endpoint) -> Result<PooledConnection<C>, PoolError> {
        self.reserve(endpoint)
            .await?
            .open(&TimeoutOverrides::default())
            .await
    }

    /// Claim capacity for `endpoint` without connecting.
    ///
    /// Makes the same exhaustion and shutdown decisions as
    /// [`acquire`](Self::acquire); a reserved slot is connected later by
    /// [`Slot::open`].
    pub async fn reserve(&self, endpoint: &Endpoint) -> Result<Slot<C>, PoolError> {
        let deadline = Instant::now() + self.inner.config.block_timeout;

        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(slot) = self.try_checkout(endpoint)? {
                return Ok(slot);
            }

            let timed_out = !self.inner.config.allow_blocking
                || tokio::time::timeout_at(deadline, released).await.is_err();
            if timed_out {
                warn!(
                    endpoint = %endpoint,
                    max_size = self.inner.config.max_size,
                    allow_blocking = self.inner.config.allow_blocking,
                    "Connection pool exhausted"
                );
                metrics::record_pool_exhausted(endpoint);
                return Err(PoolError::Exhausted {
                    endpoint: endpoint.clone(),
                });
            }
        }
    }

    /// Return a borrowed connection. Equivalent to [`PooledConnection::release`].
    pub fn release(&self, connection: PooledConnection<C>, health: ReleaseHealth) {
        connection.release(health);
    }

    /// Close every idle connection and refuse further checkouts.
    ///
    /// Connections currently lent out are closed when they are released.
    /// Returns the number of connections closed immediately.
    pub fn shutdown(&self) -> usize {
        let closed: Vec<C::Connection> = {
            let mut state = self.inner.lock_state();
            if state.closed {
                return 0;
            }
            state.closed = true;
            state
                .partitions
                .drain()
                .flat_map(|(_, partition)| partition.idle.into_iter().map(|slot| slot.connection))
                .collect()
        };

        let count = closed.len();
        drop(closed);
        self.inner.released.notify_waiters();
        info!(closed = count, "Connection pool shut down");
        count
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock_state().closed
    }

    /// Statistics for one endpoint; all zero if it was never used.
    pub fn stats(&self, endpoint: &Endpoint) -> PartitionStats {
        self.inner
            .lock_state()
            .partitions
            .get(endpoint)
            .map(Partition::stats)
            .unwrap_or_default()
    }

    fn try_checkout(&self, endpoint: &Endpoint) -> Result<Option<Slot<C>>, PoolError> {
        let mut state = self.inner.lock_state();
        if state.closed {
            return Err(PoolError::Closed);
        }

        let partition = state.partitions.entry(endpoint.clone()).or_default();
        while let Some(slot) = partition.idle.pop() {
            if slot.generation == partition.generation && slot.connection.is_open() {
                partition.reused += 1;
                debug!(connection_id = %slot.id, endpoint = %endpoint, "Reusing idle connection");
                return Ok(Some(Slot::Idle(PooledConnection::new(
                    slot.connection,
                    slot.id,
                    slot.generation,
                    true,
                    endpoint.clone(),
                    Arc::clone(&self.inner),
                ))));
            }
            partition.live = partition.live.saturating_sub(1);
            debug!(connection_id = %slot.id, endpoint = %endpoint, "Evicting stale idle connection");
        }

        if partition.live < self.inner.config.max_size {
            partition.live += 1;
            return Ok(Some(Slot::Reserved(Reservation {
                pool: Arc::clone(&self.inner),
                endpoint: endpoint.clone(),
                generation: partition.generation,
                armed: true,
            })));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::mock::MockConnector;

    fn pool(max_size: usize, allow_blocking: bool) -> (ConnectionPool<MockConnector>, MockConnector) {
        let connector = MockConnector::new();
        let config = PoolConfig {
            max_size,
            allow_blocking,
            block_timeout: Duration::from_millis(200),
        };
        (ConnectionPool::new(config, connector.clone()), connector)
    }

    fn endpoint() -> Endpoint {
        Endpoint::http("foo.bar.com", 80)
    }

    #[tokio::test]
    async fn reuses_released_connection() {
        let (pool, connector) = pool(1, false);

        let first = pool.acquire(&endpoint()).await.unwrap();
        let first_id = first.id();
        assert!(!first.is_reused());
        pool.release(first, ReleaseHealth::Reusable);

        let second = pool.acquire(&endpoint()).await.unwrap();
        assert_eq!(second.id(), first_id);
        assert!(second.is_reused());
        assert_eq!(connector.opened(), 1);

        let stats = pool.stats(&endpoint());
        assert_eq!(stats.live, 1);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.reused, 1);
    }

    #[tokio::test]
    async fn exhaustion_without_blocking_fails_exactly_k() {
        let (pool, _connector) = pool(3, false);
        let k = 2;
        let target = endpoint();

        let attempts = (0..3 + k).map(|_| pool.acquire(&target));
        let results = futures_util::future::join_all(attempts).await;

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let exhausted = results
            .iter()
            .filter(|r| matches!(r, Err(PoolError::Exhausted { .. })))
            .count();
        assert_eq!(successes, 3);
        assert_eq!(exhausted, k);
        assert_eq!(pool.stats(&endpoint()).live, 3);
    }

    #[tokio::test]
    async fn partitions_are_independent() {
        let (pool, _connector) = pool(1, false);
        let _a = pool.acquire(&Endpoint::http("a.example", 80)).await.unwrap();
        let _b = pool.acquire(&Endpoint::http("b.example", 80)).await.unwrap();
        assert!(matches!(
            pool.acquire(&Endpoint::http("a.example", 80)).await,
            Err(PoolError::Exhausted { .. })
        ));
    }

    #[tokio::test]
    async fn blocked_acquire_wakes_on_release() {
        let (pool, connector) = pool(1, true);
        let held = pool.acquire(&endpoint()).await.unwrap();
        let held_id = held.id();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(&endpoint()).await.map(|lease| lease.id()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        held.release(ReleaseHealth::Reusable);

        assert_eq!(waiter.await.unwrap().unwrap(), held_id);
        assert_eq!(connector.opened(), 1);
    }

    #[tokio::test]
    async fn blocked_acquire_times_out() {
        let (pool, _connector) = pool(1, true);
        let _held = pool.acquire(&endpoint()).await.unwrap();

        let started = std::time::Instant::now();
        let result = pool.acquire(&endpoint()).await;
        assert!(matches!(result, Err(PoolError::Exhausted { .. })));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn discarded_connection_is_not_reused() {
        let (pool, connector) = pool(1, false);
        let lease = pool.acquire(&endpoint()).await.unwrap();
        let first_id = lease.id();
        lease.release(ReleaseHealth::Discard);
        assert_eq!(connector.closed(), 1);

        let lease = pool.acquire(&endpoint()).await.unwrap();
        assert_ne!(lease.id(), first_id);
        assert_eq!(connector.opened(), 2);
    }

    #[tokio::test]
    async fn dropped_lease_is_discarded() {
        let (pool, connector) = pool(1, false);
        drop(pool.acquire(&endpoint()).await.unwrap());
        assert_eq!(connector.closed(), 1);
        assert_eq!(pool.stats(&endpoint()).live, 0);
    }

    #[tokio::test]
    async fn poison_retires_older_idle_connections() {
        let (pool, connector) = pool(3, false);
        let a = pool.acquire(&endpoint()).await.unwrap();
        let b = pool.acquire(&endpoint()).await.unwrap();
        let c = pool.acquire(&endpoint()).await.unwrap();
        a.release(ReleaseHealth::Reusable);
        b.release(ReleaseHealth::Reusable);
        assert_eq!(pool.stats(&endpoint()).idle, 2);

        c.release(ReleaseHealth::Poison);
        let stats = pool.stats(&endpoint());
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.live, 0);
        assert_eq!(stats.generation, 1);
        assert_eq!(connector.closed(), 3);
    }

    #[tokio::test]
    async fn in_flight_connection_from_old_generation_is_dropped_on_release() {
        let (pool, connector) = pool(2, false);
        let old = pool.acquire(&endpoint()).await.unwrap();
        let failed = pool.acquire(&endpoint()).await.unwrap();
        failed.release(ReleaseHealth::Poison);

        old.release(ReleaseHealth::Reusable);
        assert_eq!(pool.stats(&endpoint()).idle, 0);
        assert_eq!(connector.closed(), 2);
    }

    #[tokio::test]
    async fn connect_failure_frees_the_slot() {
        let (pool, connector) = pool(1, false);
        connector.fail_next_connect(TransportError::Network("connection refused".into()));

        let result = pool.acquire(&endpoint()).await;
        assert!(matches!(result, Err(PoolError::Connect { .. })));
        assert_eq!(pool.stats(&endpoint()).live, 0);

        assert!(pool.acquire(&endpoint()).await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_closes_idle_and_rejects_acquire() {
        let (pool, connector) = pool(2, true);
        let idle = pool.acquire(&endpoint()).await.unwrap();
        let busy = pool.acquire(&endpoint()).await.unwrap();
        idle.release(ReleaseHealth::Reusable);

        assert_eq!(pool.shutdown(), 1);
        assert_eq!(connector.closed(), 1);
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire(&endpoint()).await, Err(PoolError::Closed)));

        busy.release(ReleaseHealth::Reusable);
        assert_eq!(connector.closed(), 2);
    }

    #[tokio::test]
    async fn shutdown_wakes_blocked_waiters() {
        let (pool, _connector) = pool(1, true);
        let _held = pool.acquire(&endpoint()).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(&endpoint()).await.map(|lease| lease.id()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.shutdown();

        assert!(matches!(waiter.await.unwrap(), Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn reserve_counts_capacity_without_connecting() {
        let (pool, connector) = pool(1, false);
        let slot = pool.reserve(&endpoint()).await.unwrap();
        assert!(matches!(slot, Slot::Reserved(_)));
        assert_eq!(connector.opened(), 0);
        assert_eq!(pool.stats(&endpoint()).live, 1);
        assert!(matches!(
            pool.reserve(&endpoint()).await,
            Err(PoolError::Exhausted { .. })
        ));

        drop(slot);
        assert_eq!(pool.stats(&endpoint()).live, 0);

        let lease = pool
            .reserve(&endpoint())
            .await
            .unwrap()
            .open(&TimeoutOverrides::default())
            .await
            .unwrap();
        assert_eq!(connector.opened(), 1);
        lease.release(ReleaseHealth::Reusable);
        assert!(matches!(pool.reserve(&endpoint()).await.unwrap(), Slot::Idle(_)));
    }

    #[tokio::test]
    async fn open_passes_timeouts_to_the_connector() {
        let (pool, connector) = pool(1, false);
        let timeouts = TimeoutOverrides {
            connect: Some(Duration::from_secs(2)),
            inactivity: None,
        };
        let slot = pool.reserve(&endpoint()).await.unwrap();
        let _lease = slot.open(&timeouts).await.unwrap();
        assert_eq!(connector.connects(), vec![timeouts]);
    }
}
