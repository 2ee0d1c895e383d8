//! Transport failures and their classification.
//!
//! Every failure raised while issuing a call is sorted into one of two
//! classes:
//! - `Fatal`: a defect in the caller or the runtime. Propagated unchanged.
//! - `NetworkFailure`: a remote or network condition. Captured as data.
//!
//! The fatal class is the closed [`FatalKind`] set; everything else is a
//! network failure.

use std::fmt;
use std::io;

use thiserror::Error;

/// Defect categories that must always propagate to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatalKind {
    /// Programming or logic error (wrong type, missing method, bad index).
    Logic,
    /// Fatal runtime condition.
    Runtime,
    /// Malformed argument supplied by the caller.
    InvalidArgument,
    /// Memory or stack exhaustion.
    ResourceExhausted,
    /// Syntax or load failure.
    Load,
    /// Control-flow interrupt (signal, exit request).
    Interrupted,
}

impl FatalKind {
    /// The complete allow-list of propagating categories.
    pub const ALL: [FatalKind; 6] = [
        FatalKind::Logic,
        FatalKind::Runtime,
        FatalKind::InvalidArgument,
        FatalKind::ResourceExhausted,
        FatalKind::Load,
        FatalKind::Interrupted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FatalKind::Logic => "logic",
            FatalKind::Runtime => "runtime",
            FatalKind::InvalidArgument => "invalid argument",
            FatalKind::ResourceExhausted => "resource exhaustion",
            FatalKind::Load => "load",
            FatalKind::Interrupted => "interrupt",
        }
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A defect-class error. Never captured into a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct FatalError {
    pub kind: FatalKind,
    pub message: String,
}

impl FatalError {
    pub fn new(kind: FatalKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Categories of captured network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    Timeout,
    ConnectionReset,
    TlsFailure,
    DnsFailure,
    Other,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::ConnectionReset => "connection reset",
            NetworkErrorKind::TlsFailure => "TLS failure",
            NetworkErrorKind::DnsFailure => "DNS failure",
            NetworkErrorKind::Other => "network error",
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network failure captured into the response instead of raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct NetworkFailure {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl NetworkFailure {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::Timeout, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == NetworkErrorKind::Timeout
    }
}

/// Failure raised by a connector or connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection reset: {0}")]
    ConnectionReset(String),

    #[error("TLS failure: {0}")]
    Tls(String),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("network error: {0}")]
    Network(String),

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl TransportError {
    /// Map an OS-level I/O error onto the transport taxonomy.
    pub fn from_io(err: &io::Error) -> Self {
        use io::ErrorKind;

        match err.kind() {
            ErrorKind::TimedOut => TransportError::Timeout(err.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof => TransportError::ConnectionReset(err.to_string()),
            ErrorKind::OutOfMemory => {
                FatalError::new(FatalKind::ResourceExhausted, err.to_string()).into()
            }
            ErrorKind::InvalidInput => {
                FatalError::new(FatalKind::InvalidArgument, err.to_string()).into()
            }
            ErrorKind::Unsupported => FatalError::new(FatalKind::Logic, err.to_string()).into(),
            _ => TransportError::Network(err.to_string()),
        }
    }
}

/// Result of sorting a [`TransportError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Fatal(FatalError),
    Network(NetworkFailure),
}

/// Sort a transport failure into the fatal or the captured class.
pub fn classify(error: TransportError) -> Classified {
    let (kind, message) = match error {
        TransportError::Fatal(fatal) => return Classified::Fatal(fatal),
        TransportError::Timeout(message) => (NetworkErrorKind::Timeout, message),
        TransportError::ConnectionReset(message) => (NetworkErrorKind::ConnectionReset, message),
        TransportError::Tls(message) => (NetworkErrorKind::TlsFailure, message),
        TransportError::Dns(message) => (NetworkErrorKind::DnsFailure, message),
        TransportError::Network(message) => (NetworkErrorKind::Other, message),
    };
    Classified::Network(NetworkFailure::new(kind, message))
}
