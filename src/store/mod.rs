//! # Store Module
//!
//! The shared store every worker of a group talks to.
//!
//! ## Overview
//!
//! `FrontierStore` is the narrow set of primitives the frontier needs from the
//! remote store: batched bit and counter access for the filters, list and
//! sorted-set operations for the queues, and a TTL-bound compare-and-delete
//! lock. Each call is a single round trip, and every multi-step operation that
//! must be indivisible (priority pop, counter decrement, lock release) is
//! atomic on the store side.
//!
//! Two implementations ship with the crate:
//!
//! - **RedisStore** (feature `redis-store`): standalone, cluster or sentinel
//!   deployments, resolved from [`StoreSettings`].
//! - **MemoryStore**: a single-process stand-in with the same semantics, used by
//!   tests and by single-worker runs.
//!
//! An unreachable store is reported as `FrontierError::StoreUnavailable` and
//! never mapped onto an "absent" answer.

pub mod connection;
#[cfg(test)]
pub(crate) mod faulty;
pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

pub use connection::{StoreSettings, StoreTopology};
pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisStore;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Primitive operations of the shared store.
#[async_trait]
pub trait FrontierStore: Send + Sync + 'static {
    /// Reads the bits at `offsets` of the bit array stored at `key`.
    async fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>>;

    /// Sets the bits at `offsets` of the bit array stored at `key`.
    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<()>;

    /// Reads the counters at `offsets` of the counter array stored at `key`.
    async fn get_counters(&self, key: &str, offsets: &[u64]) -> Result<Vec<i64>>;

    /// Increments every counter at `offsets` by one.
    async fn incr_counters(&self, key: &str, offsets: &[u64]) -> Result<()>;

    /// Decrements every counter at `offsets` by one, never below zero.
    async fn decr_counters(&self, key: &str, offsets: &[u64]) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn delete(&self, keys: &[String]) -> Result<()>;

    /// Pushes onto the head of the list at `key`.
    async fn push_head(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Pops from the head of the list; waits up to `timeout` when it is non-zero.
    async fn pop_head(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Pops from the tail of the list; waits up to `timeout` when it is non-zero.
    async fn pop_tail(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;

    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Adds `member` to the sorted set at `key` with `score`.
    async fn zadd(&self, key: &str, score: f64, member: Vec<u8>) -> Result<()>;

    /// Atomically removes and returns the lowest-scored member.
    async fn zpop_min(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn zcard(&self, key: &str) -> Result<usize>;

    /// Single non-blocking attempt to take the lock at `key` for `ttl`.
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Releases the lock at `key` if it is still held with `token`.
    async fn unlock(&self, key: &str, token: &str) -> Result<bool>;
}
