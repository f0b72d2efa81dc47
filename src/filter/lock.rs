//! Advisory locks over the shared store.
//!
//! A lock is a store key written with a per-acquisition token and a TTL. Each
//! attempt is a single non-blocking set-if-absent; contention is handled here
//! with bounded exponential backoff. Release compares the token before
//! deleting, so a holder whose lock expired and was taken by another worker
//! cannot release the new holder's lock.

use super::{hex_index, prefix_width};
use crate::config::MAX_BLOCKS;
use crate::error::{FrontierError, Result};
use crate::keys::indexed;
use crate::store::FrontierStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{trace, warn};
use uuid::Uuid;

/// Retry schedule of a contended lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockBackoff {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub max_attempts: u32,
}

impl Default for LockBackoff {
    fn default() -> Self {
        LockBackoff {
            initial_ms: 5,
            max_ms: 200,
            max_attempts: 50,
        }
    }
}

impl LockBackoff {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(FrontierError::config("lock max_attempts must be greater than 0."));
        }
        if self.initial_ms == 0 {
            return Err(FrontierError::config("lock initial backoff must be greater than 0."));
        }
        if self.max_ms < self.initial_ms {
            return Err(FrontierError::config(format!(
                "lock max backoff ({}ms) must not be below the initial backoff ({}ms).",
                self.max_ms, self.initial_ms
            )));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_ms.saturating_mul(factor).min(self.max_ms))
    }
}

/// One TTL-bound mutex in the store.
#[derive(Debug, Clone)]
pub struct AdvisoryLock {
    key: String,
    ttl: Duration,
    backoff: LockBackoff,
}

impl AdvisoryLock {
    pub fn new(key: impl Into<String>, ttl: Duration, backoff: LockBackoff) -> Self {
        Self {
            key: key.into(),
            ttl,
            backoff,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Acquires the lock, retrying with backoff until `max_attempts` is spent.
    pub async fn acquire<'a>(&'a self, store: &'a dyn FrontierStore) -> Result<LockGuard<'a>> {
        let token = Uuid::new_v4().to_string();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if store.try_lock(&self.key, &token, self.ttl).await? {
                trace!("Acquired lock {} on attempt {}", self.key, attempt);
                return Ok(LockGuard {
                    store,
                    key: &self.key,
                    token,
                });
            }
            if attempt >= self.backoff.max_attempts {
                return Err(FrontierError::LockTimeout {
                    key: self.key.clone(),
                    attempts: attempt,
                });
            }
            tokio::time::sleep(self.backoff.delay(attempt)).await;
        }
    }
}

/// Proof of holding an [`AdvisoryLock`]. Dropping it without `release` leaves
/// the lock to expire through its TTL.
pub struct LockGuard<'a> {
    store: &'a dyn FrontierStore,
    key: &'a str,
    token: String,
}

impl LockGuard<'_> {
    /// Releases the lock. Returns false when it had already expired.
    pub async fn release(self) -> Result<bool> {
        let released = self.store.unlock(self.key, &self.token).await?;
        if !released {
            warn!("Lock {} expired before release", self.key);
        }
        Ok(released)
    }
}

/// Fixed pool of locks addressed by a fingerprint's leading hex digits.
#[derive(Debug, Clone)]
pub struct LockPool {
    locks: Vec<AdvisoryLock>,
    width: usize,
}

impl LockPool {
    /// Builds the pool below `prefix`. `count` is rounded up to 16, 256 or 4096.
    pub fn new(prefix: &str, count: usize, ttl: Duration, backoff: LockBackoff) -> Result<Self> {
        if count == 0 || count > MAX_BLOCKS {
            return Err(FrontierError::config(format!(
                "lock count must be between 1 and {}, got {}.",
                MAX_BLOCKS, count
            )));
        }
        let width = prefix_width(count);
        let size = 16usize.pow(width as u32);
        let locks = (0..size)
            .map(|i| AdvisoryLock::new(indexed(prefix, i), ttl, backoff.clone()))
            .collect();
        Ok(Self { locks, width })
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// The lock guarding `fingerprint`.
    pub fn select(&self, fingerprint: &str) -> Result<&AdvisoryLock> {
        let index = hex_index(fingerprint, self.width)?;
        Ok(&self.locks[index % self.locks.len()])
    }
}
