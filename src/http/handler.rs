//! Request handler: the entry point tying the subsystems together.
//!
//! # Responsibilities
//! - Translate the request and borrow a pooled connection
//! - Execute the call and normalize the response
//! - Return the connection with a health verdict
//! - Dispatch async-mode requests onto the runtime
//! - Offer a blocking front end with its own runtime

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, Instrument};
use uuid::Uuid;

use crate::config::{validate_config, ConfigError, HandlerConfig};
use crate::http::request::{translate, ClientDefaults, RequestDescriptor};
use crate::http::response::{Response, ResponseDescriptor};
use crate::net::HyperConnector;
use crate::observability::metrics;
use crate::pool::{ConnectionPool, Endpoint, PoolConfig, PoolError, PooledConnection, ReleaseHealth};
use crate::transport::{
    classify, execute, ChunkSink, Classified, Connector, FatalError, NetworkErrorKind,
    NetworkFailure, Outcome, TransportParams,
};

/// Errors that make `handle` fail instead of returning an outcome.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("connection pool exhausted for {endpoint}")]
    PoolExhausted { endpoint: Endpoint },

    #[error("connection pool is closed")]
    PoolClosed,

    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("dispatched request was cancelled")]
    Cancelled,
}

impl HandlerError {
    fn outcome_label(&self) -> &'static str {
        match self {
            HandlerError::PoolExhausted { .. } => "pool_exhausted",
            HandlerError::PoolClosed => "pool_closed",
            HandlerError::Fatal(_) => "fatal",
            HandlerError::Cancelled => "cancelled",
        }
    }
}

/// Errors building a handler.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start runtime: {0}")]
    Runtime(#[from] io::Error),
}

/// Result of a handled request.
#[derive(Debug)]
pub enum HandleOutcome {
    Completed(Response),
    /// The request failed for a network reason; captured, not raised.
    NetworkFailure(NetworkFailure),
    /// Async mode: the request runs in the background.
    Dispatched(PendingResponse),
}

impl HandleOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, HandleOutcome::Dispatched(_))
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            HandleOutcome::Completed(response) => Some(response),
            _ => None,
        }
    }

    pub fn network_failure(&self) -> Option<&NetworkFailure> {
        match self {
            HandleOutcome::NetworkFailure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Split into the populated-record view and, for async dispatches, the
    /// pending handle. A dispatched request yields an empty descriptor.
    pub fn into_parts(self) -> (ResponseDescriptor, Option<PendingResponse>) {
        match self {
            HandleOutcome::Completed(response) => (response.into(), None),
            HandleOutcome::NetworkFailure(failure) => (failure.into(), None),
            HandleOutcome::Dispatched(pending) => (ResponseDescriptor::default(), Some(pending)),
        }
    }
}

/// Handle on a request dispatched in async mode.
///
/// Dropping it lets the request finish in the background.
#[derive(Debug)]
pub struct PendingResponse {
    task: JoinHandle<Result<HandleOutcome, HandlerError>>,
}

impl PendingResponse {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the request; its connection is discarded.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the request to finish.
    ///
    /// A panic inside the request resumes here.
    pub async fn wait(self) -> Result<HandleOutcome, HandlerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(HandlerError::Cancelled),
        }
    }
}

/// Pooled request handler. Clones share the pool.
pub struct Handler<C: Connector = HyperConnector> {
    pool: ConnectionPool<C>,
    defaults: Arc<ClientDefaults>,
}

impl<C: Connector> Clone for Handler<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            defaults: Arc::clone(&self.defaults),
        }
    }
}

impl Handler<HyperConnector> {
    /// Build a handler from configuration.
    pub fn new(config: &HandlerConfig) -> Result<Self, SetupError> {
        validate_config(config).map_err(ConfigError::Validation)?;
        metrics::set_enabled(config.observability.metrics_enabled);

        let connector = HyperConnector::new(&config.timeouts, &config.tls)?;
        let handler = Self::with_connector(
            config.pool_config(),
            ClientDefaults::from_config(&config.client),
            connector,
        );

        tracing::info!(
            max_size = config.pool.max_size,
            allow_blocking = config.pool.allow_blocking,
            block_timeout_ms = config.pool.block_timeout_ms,
            connect_ms = config.timeouts.connect_ms,
            inactivity_ms = config.timeouts.inactivity_ms,
            "Request handler created"
        );
        Ok(handler)
    }
}

impl<C: Connector> Handler<C> {
    pub fn with_connector(pool: PoolConfig, defaults: ClientDefaults, connector: C) -> Self {
        Self {
            pool: ConnectionPool::new(pool, connector),
            defaults: Arc::new(defaults),
        }
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    pub fn defaults(&self) -> &ClientDefaults {
        &self.defaults
    }

    /// Execute one request.
    ///
    /// Network failures are returned as [`HandleOutcome::NetworkFailure`];
    /// only pool failures and fatal errors are returned as `Err`.
    pub async fn handle(&self, request: &RequestDescriptor) -> Result<HandleOutcome, HandlerError> {
        self.dispatch(request, None).await
    }

    /// Like [`handle`](Self::handle), also passing every body chunk to
    /// `on_chunk` as it arrives.
    pub async fn handle_streaming<F>(
        &self,
        request: &RequestDescriptor,
        on_chunk: F,
    ) -> Result<HandleOutcome, HandlerError>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.dispatch(request, Some(Box::new(on_chunk))).await
    }

    /// Close idle connections and refuse new requests.
    pub fn shutdown(&self) -> usize {
        self.pool.shutdown()
    }

    async fn dispatch(
        &self,
        request: &RequestDescriptor,
        on_chunk: Option<Box<ChunkSink>>,
    ) -> Result<HandleOutcome, HandlerError> {
        let request_id = Uuid::new_v4();
        let span = debug_span!(
            "handle",
            request_id = %request_id,
            method = %request.method,
            endpoint = %request.endpoint,
        );

        let start = Instant::now();
        let result = self.run(request, on_chunk, start).instrument(span).await;

        if let Some(label) = final_label(&result) {
            metrics::record_request(request.method.as_str(), label, start);
        }
        result
    }

    async fn run(
        &self,
        request: &RequestDescriptor,
        mut on_chunk: Option<Box<ChunkSink>>,
        start: Instant,
    ) -> Result<HandleOutcome, HandlerError> {
        let params = translate(request, &self.defaults);
        debug!(target = %params.target(), async_mode = params.async_mode, "Handling request");

        // Capacity is decided before returning, even in async mode.
        let slot = match self.pool.reserve(&request.endpoint).await {
            Ok(slot) => slot,
            Err(e) => return pool_failure(e),
        };
        let timeouts = params.timeouts();

        if params.async_mode {
            let method = request.method;
            let task = tokio::spawn(
                async move {
                    let result = match slot.open(&timeouts).await {
                        Ok(lease) => complete(lease, &params, on_chunk.as_deref_mut()).await,
                        Err(e) => pool_failure(e),
                    };
                    if let Some(label) = final_label(&result) {
                        metrics::record_request(method.as_str(), label, start);
                    }
                    result
                }
                .in_current_span(),
            );
            debug!("Request dispatched");
            return Ok(HandleOutcome::Dispatched(PendingResponse { task }));
        }

        match slot.open(&timeouts).await {
            Ok(lease) => complete(lease, &params, on_chunk.as_deref_mut()).await,
            Err(e) => pool_failure(e),
        }
    }
}

/// Metric label for a finished request. Dispatched requests are counted by
/// their task once they finish.
fn final_label(result: &Result<HandleOutcome, HandlerError>) -> Option<&'static str> {
    match result {
        Ok(HandleOutcome::Completed(_)) => Some("completed"),
        Ok(HandleOutcome::NetworkFailure(_)) => Some("network_failure"),
        Ok(HandleOutcome::Dispatched(_)) => None,
        Err(e) => Some(e.outcome_label()),
    }
}

/// Map a pool failure; connect failures are classified like call failures.
fn pool_failure(err: PoolError) -> Result<HandleOutcome, HandlerError> {
    match err {
        PoolError::Exhausted { endpoint } => Err(HandlerError::PoolExhausted { endpoint }),
        PoolError::Closed => Err(HandlerError::PoolClosed),
        PoolError::Connect { source, .. } => match classify(source) {
            Classified::Network(failure) => Ok(HandleOutcome::NetworkFailure(failure)),
            Classified::Fatal(fatal) => Err(fatal.into()),
        },
    }
}

/// Execute on the lease, return it to the pool, and normalize the result.
async fn complete<C: Connector>(
    mut lease: PooledConnection<C>,
    params: &TransportParams,
    on_chunk: Option<&mut ChunkSink>,
) -> Result<HandleOutcome, HandlerError> {
    let result = execute(&mut *lease, params, on_chunk).await;

    let health = match &result {
        Ok(Outcome::Completed(_)) => ReleaseHealth::Reusable,
        Ok(Outcome::NetworkFailure(failure)) => match failure.kind {
            NetworkErrorKind::ConnectionReset | NetworkErrorKind::TlsFailure => ReleaseHealth::Poison,
            _ => ReleaseHealth::Discard,
        },
        Err(_) => ReleaseHealth::Discard,
    };
    lease.release(health);

    match result? {
        Outcome::Completed(raw) => {
            let response = Response::from_raw(raw);
            debug!(status = response.status, bytes = response.body.len(), "Request completed");
            Ok(HandleOutcome::Completed(response))
        }
        Outcome::NetworkFailure(failure) => Ok(HandleOutcome::NetworkFailure(failure)),
    }
}

/// Blocking front end owning its runtime.
///
/// Must not be dropped from inside an async context.
pub struct BlockingHandler<C: Connector = HyperConnector> {
    handler: Handler<C>,
    runtime: Runtime,
}

impl BlockingHandler<HyperConnector> {
    pub fn new(config: &HandlerConfig) -> Result<Self, SetupError> {
        Self::with_handler(Handler::new(config)?)
    }
}

impl<C: Connector> BlockingHandler<C> {
    pub fn with_handler(handler: Handler<C>) -> Result<Self, SetupError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("http-handler")
            .enable_all()
            .build()?;
        Ok(Self { handler, runtime })
    }

    pub fn handler(&self) -> &Handler<C> {
        &self.handler
    }

    pub fn handle(&self, request: &RequestDescriptor) -> Result<HandleOutcome, HandlerError> {
        self.runtime.block_on(self.handler.handle(request))
    }

    pub fn handle_streaming<F>(
        &self,
        request: &RequestDescriptor,
        on_chunk: F,
    ) -> Result<HandleOutcome, HandlerError>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.runtime
            .block_on(self.handler.handle_streaming(request, on_chunk))
    }

    /// Run a future on the handler's runtime, e.g. [`PendingResponse::wait`].
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl<C: Connector> Drop for BlockingHandler<C> {
    fn drop(&mut self) {
        self.handler.shutdown();
    }
}
