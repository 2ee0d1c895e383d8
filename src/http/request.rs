//! Request descriptors and their translation into transport parameters.
//!
//! # Responsibilities
//! - Describe one outgoing request (endpoint, method, path, headers, body)
//! - Hold the static client defaults merged into every request
//! - Translate a descriptor plus defaults into `TransportParams`
//!
//! # Design Decisions
//! - Translation is a pure function; no I/O happens here
//! - Request header casing is preserved; only responses are lowercased
//! - `content-type` and `accept-encoding` are seeded empty so the transport
//!   never injects values that would break signatures or checksums

use std::path::PathBuf;

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::pool::Endpoint;
use crate::transport::{Method, Payload, TransportParams, TIMEOUT_OPTION_KEYS};

/// Headers sent empty unless the request sets them.
pub const SEED_HEADERS: [&str; 2] = ["content-type", "accept-encoding"];

/// Option keys that are always per-request, fixed, or pool-level and are
/// never taken from the client defaults.
pub const RESERVED_OPTION_KEYS: &[&str] = &[
    "body",
    "head",
    "headers",
    "file",
    "path",
    "query",
    "parser",
    "ca_file",
    "ssl_ca_file",
    "pool_size",
    "never_block",
    "blocking_timeout",
];

/// Request body: in-memory bytes or a file streamed from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Bytes(Bytes),
    File(PathBuf),
}

impl Default for RequestBody {
    fn default() -> Self {
        RequestBody::Bytes(Bytes::new())
    }
}

/// One request as built by the calling layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub endpoint: Endpoint,
    pub path: Option<String>,
    pub query: Option<String>,
    /// Ordered header entries; repeated names are allowed.
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Overrides the client default when set.
    pub async_mode: Option<bool>,
    /// Per-request transport options; win over the client defaults.
    pub options: Map<String, Value>,
}

impl RequestDescriptor {
    pub fn new(method: Method, endpoint: Endpoint) -> Self {
        Self {
            method,
            endpoint,
            path: None,
            query: None,
            headers: Vec::new(),
            body: RequestBody::default(),
            async_mode: None,
            options: Map::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Append a header; the value is stringified.
    pub fn with_header(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.headers.push((name.into(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    /// Stream the body from a file instead of memory.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.body = RequestBody::File(path.into());
        self
    }

    pub fn with_async(mut self, async_mode: bool) -> Self {
        self.async_mode = Some(async_mode);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Static defaults merged into every request's transport parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientDefaults {
    options: Map<String, Value>,
    async_mode: bool,
}

impl ClientDefaults {
    /// Build defaults from an option bag. Reserved keys are dropped.
    ///
    /// Keys the HTTP transport does not interpret are kept for custom
    /// connectors and logged once here.
    pub fn new(options: Map<String, Value>, async_mode: bool) -> Self {
        let options: Map<String, Value> = options
            .into_iter()
            .filter(|(key, _)| {
                let reserved = is_reserved(key);
                if reserved {
                    warn!(option = %key, "Ignoring reserved client option");
                }
                !reserved
            })
            .collect();
        for key in options.keys().filter(|key| !is_interpreted(key)) {
            warn!(option = %key, "Client option is not interpreted by the HTTP transport");
        }
        Self { options, async_mode }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        if !config.keepalive {
            warn!("keepalive = false is not supported; connections are always kept alive");
        }
        Self::new(config.options.clone(), config.async_mode)
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn async_mode(&self) -> bool {
        self.async_mode
    }
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self::new(Map::new(), false)
    }
}

fn is_interpreted(key: &str) -> bool {
    TIMEOUT_OPTION_KEYS.contains(&key)
}

fn is_reserved(key: &str) -> bool {
    RESERVED_OPTION_KEYS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(key))
}

/// Map a request descriptor and the client defaults to transport parameters.
pub fn translate(request: &RequestDescriptor, defaults: &ClientDefaults) -> TransportParams {
    let mut options = defaults.options.clone();
    for (key, value) in &request.options {
        if is_reserved(key) {
            continue;
        }
        if !is_interpreted(key) {
            debug!(option = %key, "Request option is not interpreted by the HTTP transport");
        }
        options.insert(key.clone(), value.clone());
    }

    let placeholders: Vec<String> = SEED_HEADERS
        .iter()
        .filter(|seed| !request.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case(seed)))
        .map(|seed| seed.to_string())
        .collect();
    let mut headers: Vec<(String, String)> = placeholders
        .iter()
        .map(|seed| (seed.clone(), String::new()))
        .collect();
    headers.extend(request.headers.iter().cloned());

    let payload = match &request.body {
        RequestBody::File(path) => Payload::File(path.clone()),
        RequestBody::Bytes(bytes) => Payload::Bytes(bytes.clone()),
    };

    TransportParams {
        method: request.method,
        path: request.path.clone(),
        query: request.query.clone(),
        headers,
        placeholders,
        payload,
        options,
        async_mode: request.async_mode.unwrap_or(defaults.async_mode),
        keepalive: true,
    }
}
