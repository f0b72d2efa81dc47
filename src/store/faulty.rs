//! Test store that can drop off the network on demand.
//!
//! Wraps a [`MemoryStore`]; while `set_unavailable(true)` is in effect every
//! call fails with `StoreUnavailable`. `fail_locks` restricts the outage to
//! lock acquisition. Sorted-set pops are counted.

use super::{FrontierStore, MemoryStore};
use crate::error::{FrontierError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub(crate) struct FaultyStore {
    inner: MemoryStore,
    unavailable: Arc<AtomicBool>,
    fail_locks: Arc<AtomicBool>,
    zpop_calls: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_locks(&self, fail: bool) {
        self.fail_locks.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn zpop_calls(&self) -> usize {
        self.zpop_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FrontierError::StoreUnavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FrontierStore for FaultyStore {
    async fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>> {
        self.check()?;
        self.inner.get_bits(key, offsets).await
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<()> {
        self.check()?;
        self.inner.set_bits(key, offsets).await
    }

    async fn get_counters(&self, key: &str, offsets: &[u64]) -> Result<Vec<i64>> {
        self.check()?;
        self.inner.get_counters(key, offsets).await
    }

    async fn incr_counters(&self, key: &str, offsets: &[u64]) -> Result<()> {
        self.check()?;
        self.inner.incr_counters(key, offsets).await
    }

    async fn decr_counters(&self, key: &str, offsets: &[u64]) -> Result<()> {
        self.check()?;
        self.inner.decr_counters(key, offsets).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        self.check()?;
        self.inner.delete(keys).await
    }

    async fn push_head(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.check()?;
        self.inner.push_head(key, value).await
    }

    async fn pop_head(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.pop_head(key, timeout).await
    }

    async fn pop_tail(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.pop_tail(key, timeout).await
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        self.check()?;
        self.inner.list_len(key).await
    }

    async fn zadd(&self, key: &str, score: f64, member: Vec<u8>) -> Result<()> {
        self.check()?;
        self.inner.zadd(key, score, member).await
    }

    async fn zpop_min(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.zpop_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.zpop_min(key).await
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        self.check()?;
        self.inner.zcard(key).await
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.check()?;
        if self.fail_locks.load(Ordering::SeqCst) {
            return Err(FrontierError::StoreUnavailable("connection reset".to_string()));
        }
        self.inner.try_lock(key, token, ttl).await
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<bool> {
        self.check()?;
        self.inner.unlock(key, token).await
    }
}
