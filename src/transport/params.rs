//! Concrete call parameters handed to a transport connection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

/// HTTP methods the transport issues, mapped 1:1 onto transport calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }

    pub fn as_hyper(&self) -> hyper::Method {
        match self {
            Method::Get => hyper::Method::GET,
            Method::Post => hyper::Method::POST,
            Method::Put => hyper::Method::PUT,
            Method::Delete => hyper::Method::DELETE,
            Method::Head => hyper::Method::HEAD,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported method name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported HTTP method '{0}'")]
pub struct ParseMethodError(pub String);

impl FromStr for Method {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            _ => Err(ParseMethodError(s.to_string())),
        }
    }
}

/// Request payload: in-memory bytes or a file streamed from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Bytes),
    File(PathBuf),
}

/// Option keys a connection interprets; values are seconds.
pub const TIMEOUT_OPTION_KEYS: [&str; 2] = ["connect_timeout", "inactivity_timeout"];

/// Per-request timeout overrides read from the option bag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutOverrides {
    pub connect: Option<Duration>,
    /// `Some(Duration::ZERO)` disables the inactivity timeout.
    pub inactivity: Option<Duration>,
}

impl TimeoutOverrides {
    /// Read `connect_timeout` and `inactivity_timeout` (seconds).
    ///
    /// Missing, negative or non-numeric values leave the connection default.
    pub fn from_options(options: &Map<String, Value>) -> Self {
        Self {
            connect: seconds(options, "connect_timeout").filter(|d| !d.is_zero()),
            inactivity: seconds(options, "inactivity_timeout"),
        }
    }

    /// The inactivity limit to apply given the connection's own default.
    pub fn inactivity_or(&self, default: Option<Duration>) -> Option<Duration> {
        match self.inactivity {
            Some(limit) if limit.is_zero() => None,
            Some(limit) => Some(limit),
            None => default,
        }
    }
}

fn seconds(options: &Map<String, Value>, key: &str) -> Option<Duration> {
    options
        .get(key)
        .and_then(Value::as_f64)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Everything a connection needs to issue one call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportParams {
    pub method: Method,
    pub path: Option<String>,
    pub query: Option<String>,
    /// Header entries in send order; names keep the caller's casing.
    pub headers: Vec<(String, String)>,
    /// Seed header names the request left unset. Their empty entries in
    /// `headers` are not written to the wire.
    pub placeholders: Vec<String>,
    pub payload: Payload,
    /// Client defaults merged with per-request overrides.
    pub options: Map<String, Value>,
    pub async_mode: bool,
    pub keepalive: bool,
}

impl TransportParams {
    /// In-memory body, if the payload is not file-backed.
    pub fn body(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::File(_) => None,
        }
    }

    /// Upload file path, if the payload is file-backed.
    pub fn file(&self) -> Option<&Path> {
        match &self.payload {
            Payload::File(path) => Some(path),
            Payload::Bytes(_) => None,
        }
    }

    /// Whether a header entry is an unset seed rather than caller data.
    pub fn is_placeholder(&self, name: &str, value: &str) -> bool {
        value.is_empty()
            && self
                .placeholders
                .iter()
                .any(|seed| seed.eq_ignore_ascii_case(name))
    }

    pub fn timeouts(&self) -> TimeoutOverrides {
        TimeoutOverrides::from_options(&self.options)
    }

    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Origin-form request target: path (default `/`) plus query string.
    pub fn target(&self) -> String {
        let path = self.path.as_deref().filter(|p| !p.is_empty()).unwrap_or("/");
        match self.query.as_deref() {
            Some(query) if !query.is_empty() => format!("{}?{}", path, query),
            _ => path.to_string(),
        }
    }
}
