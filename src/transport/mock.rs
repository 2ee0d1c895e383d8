//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;

use crate::pool::Endpoint;
use crate::transport::{
    ChunkSink, Connection, Connector, RawHeaderValue, RawResponse, TimeoutOverrides,
    TransportError, TransportParams,
};

/// What the next call on any mock connection does.
pub(crate) enum Reply {
    Respond {
        status: u16,
        headers: Vec<(String, RawHeaderValue)>,
        chunks: Vec<Bytes>,
    },
    /// Respond, then report the connection as closed.
    Hangup(u16),
    /// Wait until `release` is notified, then respond 200 with `body`.
    Hold { release: Arc<Notify>, body: Bytes },
    Fail(TransportError),
}

impl Reply {
    pub(crate) fn ok(body: &str) -> Self {
        Self::chunked(200, &[body])
    }

    pub(crate) fn status(status: u16) -> Self {
        Self::chunked(status, &[])
    }

    pub(crate) fn chunked(status: u16, chunks: &[&str]) -> Self {
        Reply::Respond {
            status,
            headers: Vec::new(),
            chunks: chunks
                .iter()
                .filter(|c| !c.is_empty())
                .map(|c| Bytes::copy_from_slice(c.as_bytes()))
                .collect(),
        }
    }

    pub(crate) fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Reply::Respond { headers, .. } = &mut self {
            headers.push((name.to_string(), RawHeaderValue::Single(value.to_string())));
        }
        self
    }
}

#[derive(Default)]
struct MockState {
    replies: Mutex<VecDeque<Reply>>,
    connect_failures: Mutex<VecDeque<TransportError>>,
    calls: Mutex<Vec<(usize, TransportParams)>>,
    connects: Mutex<Vec<TimeoutOverrides>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Connector handing out scripted connections; clones share one script.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the reply for the next call. Calls with an empty queue get `200 OK`.
    pub(crate) fn push(&self, reply: Reply) {
        self.state.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn fail_next_connect(&self, error: TransportError) {
        self.state.connect_failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Timeout overrides passed to every connect attempt so far.
    pub(crate) fn connects(&self) -> Vec<TimeoutOverrides> {
        self.state.connects.lock().unwrap().clone()
    }

    /// Every call made so far, tagged with the serial of the connection used.
    pub(crate) fn calls(&self) -> Vec<(usize, TransportParams)> {
        self.state.calls.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(
        &self,
        _endpoint: &Endpoint,
        timeouts: &TimeoutOverrides,
    ) -> Result<MockConnection, TransportError> {
        self.state.connects.lock().unwrap().push(*timeouts);
        let failure = self.state.connect_failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        let serial = self.state.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection {
            serial,
            open: true,
            state: Arc::clone(&self.state),
        })
    }
}

pub(crate) struct MockConnection {
    serial: usize,
    open: bool,
    state: Arc<MockState>,
}

impl Connection for MockConnection {
    async fn call(
        &mut self,
        params: &TransportParams,
        mut on_chunk: Option<&mut ChunkSink>,
    ) -> Result<RawResponse, TransportError> {
        self.state.calls.lock().unwrap().push((self.serial, params.clone()));
        let reply = self.state.replies.lock().unwrap().pop_front();

        match reply.unwrap_or_else(|| Reply::ok("")) {
            Reply::Respond { status, headers, chunks } => {
                let mut body = BytesMut::new();
                for chunk in chunks {
                    if let Some(sink) = on_chunk.as_deref_mut() {
                        sink(chunk.clone());
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(RawResponse { status, headers, body: body.freeze() })
            }
            Reply::Hangup(status) => {
                self.open = false;
                Ok(RawResponse { status, headers: Vec::new(), body: Bytes::new() })
            }
            Reply::Hold { release, body } => {
                release.notified().await;
                Ok(RawResponse { status: 200, headers: Vec::new(), body })
            }
            Reply::Fail(error) => Err(error),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}
