//! Error type shared by every frontier component.
//!
//! A duplicate verdict from the dedup filter is ordinary control flow and is
//! never represented here.

use thiserror::Error;

/// Result type alias for frontier operations.
pub type Result<T> = std::result::Result<T, FrontierError>;

/// Unified frontier error type.
#[derive(Error, Debug)]
pub enum FrontierError {
    /// Missing or invalid setting, or an unresolvable queue/dedup strategy.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The shared store could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The shared store answered with an error (wrong type, script failure...).
    #[error("Store error: {0}")]
    Store(String),

    /// Bounded lock acquisition gave up.
    #[error("Timed out acquiring lock '{key}' after {attempts} attempts")]
    LockTimeout { key: String, attempts: u32 },

    /// A fingerprint whose shard prefix is not hexadecimal.
    #[error("Invalid fingerprint '{0}'")]
    InvalidFingerprint(String),

    /// A queue entry that could not be decoded.
    #[error("Malformed queue entry: {0}")]
    MalformedEntry(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrontierError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a malformed-entry error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEntry(message.into())
    }

    /// True for errors that abort the in-flight operation because the store is gone.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for FrontierError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            Self::StoreUnavailable(e.to_string())
        } else {
            Self::Store(e.to_string())
        }
    }
}

impl From<rmp_serde::decode::Error> for FrontierError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::MalformedEntry(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for FrontierError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Store(format!("failed to encode queue entry: {}", e))
    }
}
