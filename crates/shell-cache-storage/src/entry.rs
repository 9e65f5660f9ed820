//! Cache entry types: request identity and stored response snapshots

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::error::StorageError;

/// Identity of a cached request: method plus normalized URL.
///
/// The fragment is never part of the identity, so `index.html#top` and
/// `index.html` resolve to the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    url: Url,
}

impl RequestKey {
    /// Create a key from a method and URL, normalizing the URL
    pub fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self { method, url }
    }

    /// Shorthand for a GET key, the only kind the orchestrator stores
    pub fn get(url: &Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Canonical string form, e.g. `GET https://example.com/index.html`
    pub fn as_string(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Hex SHA-256 of the canonical form, used as an on-disk file name
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.as_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Parse the canonical string form back into a key
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let (method, url) = s.split_once(' ').ok_or_else(|| StorageError::Corrupt {
            key: s.to_string(),
            reason: "missing method separator".to_string(),
        })?;

        let method = Method::from_bytes(method.as_bytes()).map_err(|e| StorageError::Corrupt {
            key: s.to_string(),
            reason: e.to_string(),
        })?;

        let url = Url::parse(url).map_err(|e| StorageError::Corrupt {
            key: s.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self::new(method, &url))
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Immutable snapshot of a response held in a partition.
///
/// Entries are replaced wholesale on re-put, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Final URL the response was served from
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers in their original order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
    /// When the snapshot was written
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(url: impl Into<String>, status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            url: url.into(),
            status,
            headers,
            body,
            stored_at: Utc::now(),
        }
    }

    /// Look up the first header with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether two snapshots carry the same content, ignoring write time
    pub fn same_content(&self, other: &CachedResponse) -> bool {
        self.url == other.url
            && self.status == other.status
            && self.headers == other.headers
            && self.body == other.body
    }
}
