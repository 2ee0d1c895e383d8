//! Response normalization.
//!
//! # Responsibilities
//! - Lowercase header names and store every value as a list
//! - Merge values whose names collide after lowercasing
//! - Provide case-insensitive lookup by the original spelling
//!
//! # Design Decisions
//! - Storage is keyed by the lowercase name only; lookups lowercase the key,
//!   so a header is found under any casing without storing it twice
//! - Normalization is idempotent

use std::collections::btree_map::{self, BTreeMap};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::transport::{NetworkFailure, RawHeaderValue, RawResponse};

/// Response headers: lowercase name → non-empty ordered list of values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseHeaders(BTreeMap<String, Vec<String>>);

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values for `name`, looked up case-insensitively.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// First value for `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.0.iter()
    }

    /// Raw form of these headers, for re-normalization.
    pub fn to_raw(&self) -> Vec<(String, RawHeaderValue)> {
        self.0
            .iter()
            .map(|(name, values)| (name.clone(), RawHeaderValue::List(values.clone())))
            .collect()
    }

    fn append(&mut self, name: &str, values: Vec<String>) {
        if values.is_empty() {
            return;
        }
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .extend(values);
    }
}

impl<'a> IntoIterator for &'a ResponseHeaders {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Normalize raw transport headers.
pub fn normalize(raw: &[(String, RawHeaderValue)]) -> ResponseHeaders {
    let mut headers = ResponseHeaders::new();
    for (name, value) in raw {
        let values = match value {
            RawHeaderValue::Single(value) => vec![value.clone()],
            RawHeaderValue::List(values) => values.clone(),
        };
        headers.append(name, values);
    }
    headers
}

/// A completed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: Bytes,
}

impl Response {
    pub fn from_raw(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            headers: normalize(&raw.headers),
            body: raw.body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }
}

/// Populated-record view of a handled request.
///
/// After a synchronous call either the status, headers and body are set or
/// `network_error` is; after an async dispatch nothing is set yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDescriptor {
    pub status: Option<u16>,
    pub headers: ResponseHeaders,
    pub body: Option<Bytes>,
    pub network_error: Option<NetworkFailure>,
}

impl ResponseDescriptor {
    pub fn is_network_error(&self) -> bool {
        self.network_error.is_some()
    }
}

impl From<Response> for ResponseDescriptor {
    fn from(response: Response) -> Self {
        Self {
            status: Some(response.status),
            headers: response.headers,
            body: Some(response.body),
            network_error: None,
        }
    }
}

impl From<NetworkFailure> for ResponseDescriptor {
    fn from(failure: NetworkFailure) -> Self {
        Self {
            network_error: Some(failure),
            ..Self::default()
        }
    }
}
