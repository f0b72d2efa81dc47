//! Wire form of a queued request.
//!
//! Entries are MessagePack maps with named fields, so entries written by an
//! older worker that lack a field still decode; missing fields take their
//! defaults.

use crate::error::{FrontierError, Result};
use crate::request::Request;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

fn default_method() -> String {
    "GET".to_string()
}

/// A request as stored in the shared queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub url: String,
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default)]
    pub errback: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
    #[serde(default)]
    pub dont_filter: bool,
}

impl QueueEntry {
    pub fn from_request(request: &Request) -> Self {
        QueueEntry {
            url: request.url.to_string(),
            callback: request.callback.clone(),
            errback: request.errback.clone(),
            meta: request.meta.clone(),
            priority: request.priority,
            method: request.method.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            dont_filter: request.dont_filter,
        }
    }

    pub fn into_request(self) -> Result<Request> {
        let url = Url::parse(&self.url)
            .map_err(|e| FrontierError::malformed(format!("bad url '{}': {}", self.url, e)))?;
        Ok(Request {
            url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            meta: self.meta,
            priority: self.priority,
            callback: self.callback,
            errback: self.errback,
            dont_filter: self.dont_filter,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Encodes `request` for the queue.
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    QueueEntry::from_request(request).encode()
}

/// Decodes a queue entry back into a request.
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    QueueEntry::decode(bytes)?.into_request()
}
