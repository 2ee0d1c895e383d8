//! Endpoint: the `scheme://host:port` key of a pool partition.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Transport scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from parsing an endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("endpoint URL has no host")]
    MissingHost,
}

/// Target endpoint of a request. Equal endpoints share pooled connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint. Host names are compared case-insensitively.
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self::new(Scheme::Http, host, port)
    }

    pub fn https(host: impl Into<String>, port: u16) -> Self {
        Self::new(Scheme::Https, host, port)
    }

    /// Parse the scheme, host and port of a URL; anything else is ignored.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(input)?;
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };
        let host = url.host_str().ok_or(EndpointError::MissingHost)?;
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Self::new(scheme, host, port))
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Host suitable for name resolution and TLS (IPv6 brackets removed).
    pub fn dns_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Value for the `Host` header: the port is omitted when it is the default.
    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
