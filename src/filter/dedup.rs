//! The `request_seen` gate.
//!
//! Three modes share one contract: the first call for a fingerprint returns
//! false and records it, every later call returns true.
//!
//! - `Plain`: exists then insert, two round trips. Two workers racing on the
//!   same fingerprint may both see "new"; the crawl tolerates the refetch.
//! - `Locked`: the same two steps under the advisory lock of the
//!   fingerprint's shard, which closes that race.
//! - `DualNamespace`: URLs matching the secondary patterns go unlocked to a
//!   separate filter; everything else takes the locked path.

use super::approximate::ApproximateSet;
use super::lock::LockPool;
use crate::config::{DedupMode, FrontierConfig};
use crate::error::{FrontierError, Result};
use crate::keys::KeySpace;
use crate::request::{Fingerprinter, Request};
use crate::stats::FrontierStats;
use crate::store::FrontierStore;
use regex::{RegexSet, RegexSetBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Race-safe duplicate gate over one or two approximate sets.
pub struct DedupFilter {
    store: Arc<dyn FrontierStore>,
    mode: DedupMode,
    primary: ApproximateSet,
    secondary: Option<ApproximateSet>,
    locks: Option<LockPool>,
    secondary_patterns: Option<RegexSet>,
    fingerprinter: Arc<dyn Fingerprinter>,
    debug: bool,
    duplicate_logged: AtomicBool,
    stats: Arc<FrontierStats>,
}

impl DedupFilter {
    /// Builds the filter, its lock pool and, in dual-namespace mode, the
    /// secondary set. Locks are created here once and reused.
    pub fn new(
        store: Arc<dyn FrontierStore>,
        keys: &KeySpace,
        config: &FrontierConfig,
        fingerprinter: Arc<dyn Fingerprinter>,
        stats: Arc<FrontierStats>,
    ) -> Result<Self> {
        let primary = ApproximateSet::new(
            store.clone(),
            keys.dupefilter(),
            &config.filter,
            config.strategy,
        )?;

        let locks = match config.dedup_mode {
            DedupMode::Plain => None,
            DedupMode::Locked | DedupMode::DualNamespace => Some(LockPool::new(
                &keys.lock(),
                config.lock.count,
                config.lock.ttl(),
                config.lock.backoff.clone(),
            )?),
        };

        let (secondary, secondary_patterns) = if config.dedup_mode == DedupMode::DualNamespace {
            let params = config.secondary_filter.as_ref().ok_or_else(|| {
                FrontierError::config("dual_namespace dedup requires secondary_filter.")
            })?;
            let set = ApproximateSet::new(
                store.clone(),
                keys.secondary_dupefilter(),
                params,
                config.strategy,
            )?;
            let patterns = RegexSetBuilder::new(&config.secondary_patterns)
                .case_insensitive(true)
                .build()
                .map_err(|e| FrontierError::config(format!("invalid secondary pattern: {}", e)))?;
            (Some(set), Some(patterns))
        } else {
            (None, None)
        };

        Ok(Self {
            store,
            mode: config.dedup_mode,
            primary,
            secondary,
            locks,
            secondary_patterns,
            fingerprinter,
            debug: config.dupefilter_debug,
            duplicate_logged: AtomicBool::new(false),
            stats,
        })
    }

    pub fn mode(&self) -> DedupMode {
        self.mode
    }

    pub fn primary(&self) -> &ApproximateSet {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&ApproximateSet> {
        self.secondary.as_ref()
    }

    pub fn fingerprint(&self, request: &Request) -> String {
        self.fingerprinter.fingerprint(request)
    }

    /// Returns true if the request was seen before; otherwise records it and
    /// returns false.
    pub async fn request_seen(&self, request: &Request) -> Result<bool> {
        let fingerprint = self.fingerprint(request);
        match self.mode {
            DedupMode::Plain => check_and_insert(&self.primary, &fingerprint).await,
            DedupMode::Locked => self.locked_seen(&fingerprint).await,
            DedupMode::DualNamespace => match &self.secondary {
                Some(secondary) if self.routes_to_secondary(request) => {
                    check_and_insert(secondary, &fingerprint).await
                }
                _ => self.locked_seen(&fingerprint).await,
            },
        }
    }

    fn routes_to_secondary(&self, request: &Request) -> bool {
        self.secondary_patterns
            .as_ref()
            .is_some_and(|patterns| patterns.is_match(request.url.as_str()))
    }

    async fn locked_seen(&self, fingerprint: &str) -> Result<bool> {
        let Some(locks) = &self.locks else {
            return check_and_insert(&self.primary, fingerprint).await;
        };
        let lock = locks.select(fingerprint)?;
        let guard = match lock.acquire(self.store.as_ref()).await {
            Ok(guard) => guard,
            Err(e) => {
                if let FrontierError::LockTimeout { key, .. } = &e {
                    self.stats.record_lock_timeout(key);
                }
                return Err(e);
            }
        };

        let seen = check_and_insert(&self.primary, fingerprint).await;
        if let Err(e) = guard.release().await {
            warn!("Failed to release lock {}: {}", lock.key(), e);
        }
        seen
    }

    /// Logs a filtered duplicate and counts it.
    pub fn log_duplicate(&self, request: &Request) {
        if self.debug {
            debug!("Filtered duplicate request: {}", request.url);
        } else if !self.duplicate_logged.swap(true, Ordering::SeqCst) {
            info!(
                "Filtered duplicate request: {} - no more duplicates will be shown (enable dupefilter_debug to show all duplicates)",
                request.url
            );
        }
        self.stats.increment_duplicates_filtered();
    }

    /// Deletes every shard of the primary set and, if present, the secondary set.
    pub async fn clear(&self) -> Result<()> {
        self.primary.clear().await?;
        if let Some(secondary) = &self.secondary {
            secondary.clear().await?;
        }
        Ok(())
    }
}

async fn check_and_insert(set: &ApproximateSet, fingerprint: &str) -> Result<bool> {
    if set.exists(fingerprint).await? {
        return Ok(true);
    }
    set.insert(fingerprint).await?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterParams, LockParams};
    use crate::filter::lock::LockBackoff;
    use crate::keys::KeyLayout;
    use crate::request::Sha256Fingerprinter;
    use crate::store::MemoryStore;
    use crate::store::faulty::FaultyStore;
    use std::time::Duration;

    fn small() -> FilterParams {
        FilterParams {
            bit: 20,
            hash_count: 6,
            block_count: 4,
        }
    }

    fn filter(store: &MemoryStore, config: &FrontierConfig) -> DedupFilter {
        DedupFilter::new(
            Arc::new(store.clone()),
            &KeySpace::new("news", KeyLayout::default()),
            config,
            Arc::new(Sha256Fingerprinter::default()),
            Arc::new(FrontierStats::new()),
        )
        .unwrap()
    }

    fn dual_config() -> FrontierConfig {
        FrontierConfig {
            filter: small(),
            secondary_filter: Some(small()),
            dedup_mode: DedupMode::DualNamespace,
            secondary_patterns: vec![r"/list/\d+".to_string()],
            ..FrontierConfig::default()
        }
    }

    #[tokio::test]
    async fn first_sighting_is_new_then_seen() {
        for mode in [DedupMode::Plain, DedupMode::Locked] {
            let store = MemoryStore::new();
            let config = FrontierConfig {
                filter: small(),
                dedup_mode: mode,
                ..FrontierConfig::default()
            };
            let dedup = filter(&store, &config);
            let request = Request::get("https://example.com/a").unwrap();

            assert!(!dedup.request_seen(&request).await.unwrap());
            assert!(dedup.request_seen(&request).await.unwrap());
            assert!(dedup.request_seen(&request).await.unwrap());
        }
    }

    #[tokio::test]
    async fn concurrent_locked_checks_admit_exactly_one() {
        let store = MemoryStore::new();
        let config = FrontierConfig {
            filter: small(),
            dedup_mode: DedupMode::Locked,
            lock: LockParams {
                backoff: LockBackoff {
                    initial_ms: 1,
                    max_ms: 5,
                    max_attempts: 10_000,
                },
                ..LockParams::default()
            },
            ..FrontierConfig::default()
        };
        let dedup = Arc::new(filter(&store, &config));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let dedup = dedup.clone();
            handles.push(tokio::spawn(async move {
                let request = Request::get("https://example.com/contended").unwrap();
                dedup.request_seen(&request).await.unwrap()
            }));
        }
        let mut new_count = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                new_count += 1;
            }
        }
        assert_eq!(new_count, 1);
    }

    #[tokio::test]
    async fn held_lock_surfaces_timeout_and_is_counted() {
        let store = MemoryStore::new();
        let stats = Arc::new(FrontierStats::new());
        let config = FrontierConfig {
            filter: small(),
            dedup_mode: DedupMode::Locked,
            lock: LockParams {
                backoff: LockBackoff {
                    initial_ms: 1,
                    max_ms: 2,
                    max_attempts: 2,
                },
                ..LockParams::default()
            },
            ..FrontierConfig::default()
        };
        let dedup = DedupFilter::new(
            Arc::new(store.clone()),
            &KeySpace::new("news", KeyLayout::default()),
            &config,
            Arc::new(Sha256Fingerprinter::default()),
            stats.clone(),
        )
        .unwrap();

        let request = Request::get("https://example.com/busy").unwrap();
        let fingerprint = dedup.fingerprint(&request);
        let lock_key = format!("news:dupefilter_lock:{}", usize::from_str_radix(&fingerprint[..1], 16).unwrap());
        assert!(store.try_lock(&lock_key, "other-worker", Duration::from_secs(5)).await.unwrap());

        match dedup.request_seen(&request).await {
            Err(FrontierError::LockTimeout { key, attempts }) => {
                assert_eq!(key, lock_key);
                assert_eq!(attempts, 2);
            }
            other => panic!("expected LockTimeout, got {:?}", other),
        }
        assert_eq!(stats.lock_timeouts.load(Ordering::SeqCst), 1);
        assert!(!dedup.primary().exists(&fingerprint).await.unwrap());
    }

    #[tokio::test]
    async fn dual_namespace_routes_matching_urls_to_secondary() {
        let store = MemoryStore::new();
        let dedup = filter(&store, &dual_config());

        let listing = Request::get("https://example.com/LIST/7").unwrap();
        let detail = Request::get("https://example.com/item/7").unwrap();
        assert!(!dedup.request_seen(&listing).await.unwrap());
        assert!(!dedup.request_seen(&detail).await.unwrap());

        let secondary = dedup.secondary().unwrap();
        assert!(secondary.exists(&dedup.fingerprint(&listing)).await.unwrap());
        assert!(!dedup.primary().exists(&dedup.fingerprint(&listing)).await.unwrap());
        assert!(dedup.primary().exists(&dedup.fingerprint(&detail)).await.unwrap());
        assert!(!secondary.exists(&dedup.fingerprint(&detail)).await.unwrap());

        dedup.clear().await.unwrap();
        assert!(!secondary.exists(&dedup.fingerprint(&listing)).await.unwrap());
        assert!(!dedup.request_seen(&detail).await.unwrap());
    }

    #[tokio::test]
    async fn duplicates_are_counted_every_time() {
        let store = MemoryStore::new();
        let stats = Arc::new(FrontierStats::new());
        let dedup = DedupFilter::new(
            Arc::new(store),
            &KeySpace::new("news", KeyLayout::default()),
            &FrontierConfig {
                filter: small(),
                ..FrontierConfig::default()
            },
            Arc::new(Sha256Fingerprinter::default()),
            stats.clone(),
        )
        .unwrap();

        let request = Request::get("https://example.com/dup").unwrap();
        dedup.log_duplicate(&request);
        dedup.log_duplicate(&request);
        assert_eq!(stats.duplicates(), 2);
        assert!(dedup.duplicate_logged.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unreachable_store_fails_the_check() {
        for mode in [DedupMode::Plain, DedupMode::Locked] {
            let store = FaultyStore::new(MemoryStore::new());
            let dedup = DedupFilter::new(
                Arc::new(store.clone()),
                &KeySpace::new("news", KeyLayout::default()),
                &FrontierConfig {
                    filter: small(),
                    dedup_mode: mode,
                    ..FrontierConfig::default()
                },
                Arc::new(Sha256Fingerprinter::default()),
                Arc::new(FrontierStats::new()),
            )
            .unwrap();
            let request = Request::get("https://example.com/outage").unwrap();

            store.set_unavailable(true);
            let result = dedup.request_seen(&request).await;
            assert!(
                matches!(result, Err(FrontierError::StoreUnavailable(_))),
                "{:?}: {:?}",
                mode,
                result
            );

            store.set_unavailable(false);
            assert!(!dedup.request_seen(&request).await.unwrap());
        }
    }

    #[test]
    fn first_duplicate_is_logged_at_info_once() {
        use std::sync::Mutex;
        use tracing::field::{Field, Visit};
        use tracing::{Event, Level, Subscriber};
        use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<(Level, String)>>>);

        struct MessageVisitor(String);

        impl Visit for MessageVisitor {
            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{:?}", value);
                }
            }
        }

        impl<S: Subscriber> Layer<S> for Captured {
            fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
                let mut visitor = MessageVisitor(String::new());
                event.record(&mut visitor);
                self.0
                    .lock()
                    .unwrap()
                    .push((*event.metadata().level(), visitor.0));
            }
        }

        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        tracing::subscriber::with_default(subscriber, || {
            let dedup = filter(
                &MemoryStore::new(),
                &FrontierConfig {
                    filter: small(),
                    ..FrontierConfig::default()
                },
            );
            let request = Request::get("https://example.com/dup").unwrap();
            dedup.log_duplicate(&request);
            dedup.log_duplicate(&request);
        });

        let events = captured.0.lock().unwrap();
        let duplicates: Vec<_> = events
            .iter()
            .filter(|(_, message)| message.contains("Filtered duplicate"))
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].0, Level::INFO);
        assert!(duplicates[0].1.contains("no more duplicates will be shown"));
    }
}
