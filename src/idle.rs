//! Idle shutdown.
//!
//! A worker whose queue stays empty keeps ticking. Once it has seen more than
//! `threshold` consecutive idle ticks and the group's seed key is gone, the
//! monitor asks for shutdown. Any scheduled request resets the count.

use crate::error::{FrontierError, Result};
use crate::filter::ApproximateSet;
use crate::keys::KeySpace;
use crate::scheduler::FrontierScheduler;
use crate::stats::FrontierStats;
use crate::store::FrontierStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

/// Outcome of an idle tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleVerdict {
    Continue,
    Shutdown { reason: String },
}

pub struct IdleShutdownMonitor {
    store: Arc<dyn FrontierStore>,
    seeds_key: String,
    threshold: u32,
    idle_ticks: AtomicU32,
    secondary: Option<ApproximateSet>,
    stats: Arc<FrontierStats>,
}

impl IdleShutdownMonitor {
    pub fn new(
        store: Arc<dyn FrontierStore>,
        keys: &KeySpace,
        threshold: u32,
        stats: Arc<FrontierStats>,
    ) -> Result<Self> {
        if threshold == 0 {
            return Err(FrontierError::config("idle_threshold must be greater than 0."));
        }
        Ok(Self {
            store,
            seeds_key: keys.seeds(),
            threshold,
            idle_ticks: AtomicU32::new(0),
            secondary: None,
            stats,
        })
    }

    /// Monitor wired to `scheduler`'s store, keys, threshold and stats. In
    /// dual-namespace mode the secondary filter is cleared on shutdown.
    pub fn for_scheduler(scheduler: &FrontierScheduler) -> Result<Self> {
        let monitor = Self::new(
            scheduler.store(),
            scheduler.keys(),
            scheduler.config().idle_threshold,
            scheduler.stats(),
        )?;
        Ok(match scheduler.dedup().secondary() {
            Some(secondary) => monitor.with_secondary(secondary.clone()),
            None => monitor,
        })
    }

    pub fn with_secondary(mut self, secondary: ApproximateSet) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn on_opened(&self) {
        info!(
            "Idle shutdown armed: closing after {} idle ticks once {} is empty",
            self.threshold, self.seeds_key
        );
    }

    pub fn on_request_scheduled(&self) {
        self.idle_ticks.store(0, Ordering::SeqCst);
    }

    pub async fn on_idle_tick(&self) -> Result<IdleVerdict> {
        let ticks = self.idle_ticks.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.stats.increment_idle_ticks();
        if ticks <= self.threshold {
            return Ok(IdleVerdict::Continue);
        }
        if self.store.exists(&self.seeds_key).await? {
            debug!("Idle for {} ticks but seeds remain in {}", ticks, self.seeds_key);
            return Ok(IdleVerdict::Continue);
        }

        if let Some(secondary) = &self.secondary {
            secondary.clear().await?;
            info!("Cleared secondary filter {}", secondary.prefix());
        }
        info!("Idle for {} ticks with no seeds left, requesting shutdown", ticks);
        Ok(IdleVerdict::Shutdown {
            reason: format!("closed after {} idle ticks", ticks),
        })
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DedupMode, FilterParams, FrontierConfig};
    use crate::keys::KeyLayout;
    use crate::request::Request;
    use crate::store::MemoryStore;

    fn monitor(store: &MemoryStore, threshold: u32) -> IdleShutdownMonitor {
        IdleShutdownMonitor::new(
            Arc::new(store.clone()),
            &KeySpace::new("news", KeyLayout::default()),
            threshold,
            Arc::new(FrontierStats::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn shuts_down_only_after_more_than_threshold_ticks() {
        let store = MemoryStore::new();
        let monitor = monitor(&store, 3);
        monitor.on_opened();

        for _ in 0..3 {
            assert_eq!(monitor.on_idle_tick().await.unwrap(), IdleVerdict::Continue);
        }
        assert_eq!(
            monitor.on_idle_tick().await.unwrap(),
            IdleVerdict::Shutdown {
                reason: "closed after 4 idle ticks".to_string()
            }
        );
    }

    #[tokio::test]
    async fn scheduled_request_resets_the_count() {
        let store = MemoryStore::new();
        let monitor = monitor(&store, 3);

        for _ in 0..3 {
            monitor.on_idle_tick().await.unwrap();
        }
        monitor.on_request_scheduled();
        assert_eq!(monitor.idle_ticks(), 0);
        for _ in 0..3 {
            assert_eq!(monitor.on_idle_tick().await.unwrap(), IdleVerdict::Continue);
        }
        assert!(matches!(
            monitor.on_idle_tick().await.unwrap(),
            IdleVerdict::Shutdown { .. }
        ));
    }

    #[tokio::test]
    async fn remaining_seeds_defer_shutdown() {
        let store = MemoryStore::new();
        let monitor = monitor(&store, 1);
        store
            .push_head("news:start_urls", b"https://example.com/".to_vec())
            .await
            .unwrap();

        monitor.on_idle_tick().await.unwrap();
        assert_eq!(monitor.on_idle_tick().await.unwrap(), IdleVerdict::Continue);
        assert_eq!(monitor.on_idle_tick().await.unwrap(), IdleVerdict::Continue);

        store.delete(&["news:start_urls".to_string()]).await.unwrap();
        assert!(matches!(
            monitor.on_idle_tick().await.unwrap(),
            IdleVerdict::Shutdown { .. }
        ));
    }

    #[tokio::test]
    async fn zero_threshold_is_rejected() {
        let result = IdleShutdownMonitor::new(
            Arc::new(MemoryStore::new()),
            &KeySpace::new("news", KeyLayout::default()),
            0,
            Arc::new(FrontierStats::new()),
        );
        assert!(matches!(result, Err(FrontierError::Configuration(_))));
    }

    #[tokio::test]
    async fn shutdown_clears_the_secondary_filter() {
        let store = MemoryStore::new();
        let small = FilterParams {
            bit: 16,
            hash_count: 4,
            block_count: 1,
        };
        let config = FrontierConfig {
            filter: small,
            secondary_filter: Some(small),
            dedup_mode: DedupMode::DualNamespace,
            secondary_patterns: vec!["/list/".to_string()],
            idle_threshold: 1,
            ..FrontierConfig::default()
        };
        let scheduler = FrontierScheduler::open(Arc::new(store.clone()), config, "news")
            .await
            .unwrap();
        let monitor = IdleShutdownMonitor::for_scheduler(&scheduler).unwrap();

        let listing = Request::get("https://example.com/list/1").unwrap();
        scheduler.enqueue_request(listing.clone()).await.unwrap();
        let fingerprint = scheduler.dedup().fingerprint(&listing);
        let secondary = scheduler.dedup().secondary().unwrap();
        assert!(secondary.exists(&fingerprint).await.unwrap());

        monitor.on_idle_tick().await.unwrap();
        assert!(matches!(
            monitor.on_idle_tick().await.unwrap(),
            IdleVerdict::Shutdown { .. }
        ));
        assert!(!secondary.exists(&fingerprint).await.unwrap());
    }
}
