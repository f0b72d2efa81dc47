//! Sharded approximate membership over the shared store.
//!
//! A fingerprint selects one shard by its leading hex digits and `k` offsets
//! inside it. Membership is the AND of all `k` positions, so a present item is
//! never reported absent; an absent one may be reported present with a bounded
//! probability. Each call costs one batched round trip per shard touched.

use super::hash::HashFamily;
use super::{hex_index, prefix_width};
use crate::config::{FilterParams, SetStrategy};
use crate::error::{FrontierError, Result};
use crate::keys::indexed;
use crate::store::FrontierStore;
use std::sync::Arc;

/// A bloom (bits) or counting-bloom (counters) filter split into shards.
#[derive(Clone)]
pub struct ApproximateSet {
    store: Arc<dyn FrontierStore>,
    prefix: String,
    strategy: SetStrategy,
    family: HashFamily,
    block_count: usize,
    width: usize,
}

impl ApproximateSet {
    /// Creates the set with shard keys `{prefix}:{index}`. Nothing is written
    /// until the first insert.
    pub fn new(
        store: Arc<dyn FrontierStore>,
        prefix: impl Into<String>,
        params: &FilterParams,
        strategy: SetStrategy,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            store,
            prefix: prefix.into(),
            strategy,
            family: HashFamily::new(params.bit, params.hash_count)?,
            block_count: params.block_count,
            width: prefix_width(params.block_count),
        })
    }

    pub fn strategy(&self) -> SetStrategy {
        self.strategy
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the shard `fingerprint` belongs to.
    pub fn shard_key(&self, fingerprint: &str) -> Result<String> {
        let index = hex_index(fingerprint, self.width)? % self.block_count;
        Ok(indexed(&self.prefix, index))
    }

    /// Every shard key, in index order.
    pub fn shard_keys(&self) -> Vec<String> {
        (0..self.block_count)
            .map(|index| indexed(&self.prefix, index))
            .collect()
    }

    /// True iff every offset of `fingerprint` is set. Empty input is never present.
    pub async fn exists(&self, fingerprint: &str) -> Result<bool> {
        if fingerprint.is_empty() {
            return Ok(false);
        }
        let key = self.shard_key(fingerprint)?;
        let offsets = self.family.offsets(fingerprint);
        match self.strategy {
            SetStrategy::Bits => {
                let bits = self.store.get_bits(&key, &offsets).await?;
                Ok(bits.iter().all(|&bit| bit))
            }
            SetStrategy::Counting => {
                let counters = self.store.get_counters(&key, &offsets).await?;
                Ok(counters.iter().all(|&count| count > 0))
            }
        }
    }

    /// Adds `fingerprint`. Inserting a present item changes nothing.
    pub async fn insert(&self, fingerprint: &str) -> Result<()> {
        if fingerprint.is_empty() {
            return Err(FrontierError::InvalidFingerprint(String::new()));
        }
        let key = self.shard_key(fingerprint)?;
        let offsets = self.family.offsets(fingerprint);
        match self.strategy {
            SetStrategy::Bits => self.store.set_bits(&key, &offsets).await,
            SetStrategy::Counting => {
                if self.exists(fingerprint).await? {
                    return Ok(());
                }
                self.store.incr_counters(&key, &offsets).await
            }
        }
    }

    /// Removes `fingerprint` from a counting set. Returns false, touching
    /// nothing, when it was not present.
    pub async fn remove(&self, fingerprint: &str) -> Result<bool> {
        if self.strategy == SetStrategy::Bits {
            return Err(FrontierError::config(
                "remove is only supported by the counting strategy.",
            ));
        }
        if !self.exists(fingerprint).await? {
            return Ok(false);
        }
        let key = self.shard_key(fingerprint)?;
        let offsets = self.family.offsets(fingerprint);
        self.store.decr_counters(&key, &offsets).await?;
        Ok(true)
    }

    /// Deletes every shard.
    pub async fn clear(&self) -> Result<()> {
        self.store.delete(&self.shard_keys()).await
    }
}

impl std::fmt::Debug for ApproximateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApproximateSet")
            .field("prefix", &self.prefix)
            .field("strategy", &self.strategy)
            .field("hash_count", &self.family.hash_count())
            .field("size", &self.family.size())
            .field("block_count", &self.block_count)
            .finish()
    }
}
