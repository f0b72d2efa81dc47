//! # Request Module
//!
//! The request model the frontier stores and hands back to the engine, plus the
//! fingerprint function used for deduplication.
//!
//! Callbacks are carried by name (`callback` / `errback`) rather than as
//! closures so a request survives serialization and can be picked up by any
//! worker in the group. Resolving the name back to code is the engine's job.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_frontier::request::{Fingerprinter, Request, Sha256Fingerprinter};
//!
//! let request = Request::get("https://example.com/list?page=2")?
//!     .with_callback("parse_list")
//!     .with_priority(10);
//!
//! let fp = Sha256Fingerprinter::default().fingerprint(&request);
//! assert_eq!(fp.len(), 64);
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

/// A crawl request as seen by the frontier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub url: Url,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// Arbitrary engine metadata (retry counters, redirect chains, rule ids...).
    pub meta: Map<String, Value>,
    /// Ordering key for the priority queue; lower values are popped first.
    pub priority: i32,
    pub callback: Option<String>,
    pub errback: Option<String>,
    /// Skip the duplicate filter for this request.
    pub dont_filter: bool,
}

impl Request {
    /// Creates a `GET` request for the given URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
            meta: Map::new(),
            priority: 0,
            callback: None,
            errback: None,
            dont_filter: false,
        }
    }

    /// Parses `url` and creates a `GET` request for it.
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        let method: String = method.into();
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Names the engine method that should handle the response.
    pub fn with_callback(mut self, name: impl Into<String>) -> Self {
        self.callback = Some(name.into());
        self
    }

    /// Names the engine method that should handle a download failure.
    pub fn with_errback(mut self, name: impl Into<String>) -> Self {
        self.errback = Some(name.into());
        self
    }

    /// Marks the request as exempt from duplicate filtering.
    pub fn dont_filter(mut self) -> Self {
        self.dont_filter = true;
        self
    }

    /// Fingerprint computed with the default [`Sha256Fingerprinter`].
    pub fn fingerprint(&self) -> String {
        Sha256Fingerprinter::default().fingerprint(self)
    }
}

/// Derives the dedup fingerprint of a request.
///
/// Implementations must return a fixed-length hexadecimal string: the filter
/// parses its leading digits to pick a shard and a lock.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, request: &Request) -> String;
}

/// SHA-256 over the canonical form of a request.
///
/// The canonical form is the upper-cased method, the URL without fragment and
/// with sorted query parameters, the selected headers and the body.
#[derive(Debug, Clone, Default)]
pub struct Sha256Fingerprinter {
    include_headers: Vec<String>,
}

impl Sha256Fingerprinter {
    /// Includes the named headers (case-insensitive) in the fingerprint.
    pub fn with_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut include_headers: Vec<String> = headers
            .into_iter()
            .map(|h| h.as_ref().to_ascii_lowercase())
            .collect();
        include_headers.sort();
        include_headers.dedup();
        Self { include_headers }
    }
}

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, request: &Request) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.method.to_ascii_uppercase().as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical_url(&request.url).as_bytes());
        hasher.update(b"\n");

        for name in &self.include_headers {
            let value = request
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str());
            if let Some(value) = value {
                hasher.update(name.as_bytes());
                hasher.update(b":");
                hasher.update(value.as_bytes());
                hasher.update(b"\n");
            }
        }

        hasher.update(&request.body);
        hex::encode(hasher.finalize())
    }
}

fn canonical_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }
    url.to_string()
}
