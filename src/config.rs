//! # Configuration Module
//!
//! Every tunable the frontier recognises, with the defaults a fresh worker
//! group starts from.
//!
//! `FrontierConfig` derives `Deserialize` so a host can embed it in whatever
//! settings file it already loads; missing fields fall back to the defaults
//! below. `validate` is called when a scheduler is opened, so a bad
//! configuration aborts worker startup instead of degrading silently.

use crate::error::{FrontierError, Result};
use crate::filter::lock::LockBackoff;
use crate::keys::KeyLayout;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest shard count addressable with three leading hex digits.
pub const MAX_BLOCKS: usize = 4096;
/// Largest bit width; a single Redis string value caps out at 512 MiB.
pub const MAX_BIT: u8 = 32;

/// Ordering of the shared request queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Fifo,
    Lifo,
    #[default]
    Priority,
}

/// How `request_seen` protects its check-and-insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    /// Unlocked exists + insert.
    #[default]
    Plain,
    /// Exists + insert under a per-shard advisory lock.
    Locked,
    /// Locked primary filter plus an unlocked secondary filter for URLs
    /// matching `secondary_patterns`.
    DualNamespace,
}

/// Storage strategy of an approximate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetStrategy {
    /// One bit per offset.
    #[default]
    Bits,
    /// One counter per offset; supports removal.
    Counting,
}

/// Shape of one sharded filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// `m = 2^bit` offsets per shard.
    pub bit: u8,
    pub hash_count: usize,
    pub block_count: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            bit: 30,
            hash_count: 6,
            block_count: 1,
        }
    }
}

impl FilterParams {
    pub fn validate(&self) -> Result<()> {
        if self.bit == 0 || self.bit > MAX_BIT {
            return Err(FrontierError::config(format!(
                "bit must be between 1 and {}, got {}.",
                MAX_BIT, self.bit
            )));
        }
        if self.hash_count == 0 || self.hash_count > crate::filter::hash::MAX_HASH_COUNT {
            return Err(FrontierError::config(format!(
                "hash_count must be between 1 and {}, got {}.",
                crate::filter::hash::MAX_HASH_COUNT,
                self.hash_count
            )));
        }
        if self.block_count == 0 || self.block_count > MAX_BLOCKS {
            return Err(FrontierError::config(format!(
                "block_count must be between 1 and {}, got {}.",
                MAX_BLOCKS, self.block_count
            )));
        }
        Ok(())
    }
}

/// Advisory lock pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockParams {
    /// Requested pool size, rounded up to 16, 256 or 4096.
    pub count: usize,
    pub ttl_ms: u64,
    pub backoff: LockBackoff,
}

impl Default for LockParams {
    fn default() -> Self {
        LockParams {
            count: 16,
            ttl_ms: 10_000,
            backoff: LockBackoff::default(),
        }
    }
}

impl LockParams {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 || self.count > MAX_BLOCKS {
            return Err(FrontierError::config(format!(
                "lock count must be between 1 and {}, got {}.",
                MAX_BLOCKS, self.count
            )));
        }
        if self.ttl_ms == 0 {
            return Err(FrontierError::config("lock ttl must be greater than 0."));
        }
        self.backoff.validate()
    }
}

/// Complete frontier configuration of one worker group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
    pub filter: FilterParams,
    /// Parameters of the unlocked secondary filter (dual-namespace mode).
    pub secondary_filter: Option<FilterParams>,
    pub strategy: SetStrategy,
    pub dedup_mode: DedupMode,
    /// Log every filtered duplicate instead of only the first one.
    pub dupefilter_debug: bool,
    pub keys: KeyLayout,
    pub lock: LockParams,
    pub queue: QueueKind,
    /// Keep queue and filter in the store when the scheduler closes.
    pub persist: bool,
    /// Clear queue and filter when the scheduler opens.
    pub flush_on_start: bool,
    /// Blocking-pop timeout of `next_request`; 0 pops without waiting.
    pub idle_wait_ms: u64,
    /// Consecutive idle ticks tolerated before shutdown is requested.
    pub idle_threshold: u32,
    /// URL patterns routed to the secondary filter.
    pub secondary_patterns: Vec<String>,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        FrontierConfig {
            filter: FilterParams::default(),
            secondary_filter: None,
            strategy: SetStrategy::default(),
            dedup_mode: DedupMode::default(),
            dupefilter_debug: false,
            keys: KeyLayout::default(),
            lock: LockParams::default(),
            queue: QueueKind::default(),
            persist: false,
            flush_on_start: false,
            idle_wait_ms: 0,
            idle_threshold: 360,
            secondary_patterns: Vec::new(),
        }
    }
}

impl FrontierConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Checks every setting; called before anything touches the store.
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        if let Some(secondary) = &self.secondary_filter {
            secondary.validate()?;
        }
        if self.dedup_mode != DedupMode::Plain {
            self.lock.validate()?;
        }
        if self.dedup_mode == DedupMode::DualNamespace {
            if self.secondary_filter.is_none() {
                return Err(FrontierError::config(
                    "dual_namespace dedup requires secondary_filter.",
                ));
            }
            if self.secondary_patterns.is_empty() {
                return Err(FrontierError::config(
                    "dual_namespace dedup requires at least one secondary pattern.",
                ));
            }
            for pattern in &self.secondary_patterns {
                Regex::new(pattern).map_err(|e| {
                    FrontierError::config(format!("invalid secondary pattern '{}': {}", pattern, e))
                })?;
            }
        }
        if self.idle_threshold == 0 {
            return Err(FrontierError::config("idle_threshold must be greater than 0."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(FrontierConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_filter() {
        let mut config = FrontierConfig::default();
        config.filter.bit = 33;
        assert!(matches!(config.validate(), Err(FrontierError::Configuration(_))));

        let mut config = FrontierConfig::default();
        config.filter.block_count = MAX_BLOCKS + 1;
        assert!(matches!(config.validate(), Err(FrontierError::Configuration(_))));

        let mut config = FrontierConfig::default();
        config.filter.hash_count = 0;
        assert!(matches!(config.validate(), Err(FrontierError::Configuration(_))));
    }

    #[test]
    fn dual_namespace_needs_secondary_filter_and_patterns() {
        let mut config = FrontierConfig {
            dedup_mode: DedupMode::DualNamespace,
            ..FrontierConfig::default()
        };
        assert!(config.validate().is_err());

        config.secondary_filter = Some(FilterParams::default());
        assert!(config.validate().is_err());

        config.secondary_patterns = vec!["/list/".to_string()];
        assert!(config.validate().is_ok());

        config.secondary_patterns = vec!["(".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_idle_threshold_is_rejected() {
        let config = FrontierConfig {
            idle_threshold: 0,
            ..FrontierConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let config: FrontierConfig = serde_json::from_str(
            r#"{"queue": "fifo", "dedup_mode": "locked", "filter": {"bit": 20}, "persist": true}"#,
        )
        .unwrap();
        assert_eq!(config.queue, QueueKind::Fifo);
        assert_eq!(config.dedup_mode, DedupMode::Locked);
        assert_eq!(config.filter.bit, 20);
        assert_eq!(config.filter.hash_count, 6);
        assert!(config.persist);
        assert_eq!(config.keys, KeyLayout::default());
    }
}
