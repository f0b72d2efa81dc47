//! # Builder Module
//!
//! Provides the `FrontierBuilder`, a fluent API for assembling a scheduler,
//! its idle monitor and a worker loop for one worker group.
//!
//! ## Overview
//!
//! The builder holds a [`FrontierConfig`] and the pieces that cannot live in a
//! config file: the store (or the settings to connect to one), the
//! fingerprinter and the stats collector. `build_scheduler` stops after opening
//! the scheduler for hosts that drive it themselves; `build` also wires the
//! idle monitor and returns a ready [`FrontierWorker`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_frontier::{DedupMode, FrontierBuilder, QueueKind, StoreSettings};
//!
//! let worker = FrontierBuilder::new("news")
//!     .store_settings(StoreSettings::cluster(["redis://10.0.0.1:7000", "redis://10.0.0.2:7000"]))
//!     .queue(QueueKind::Priority)
//!     .dedup_mode(DedupMode::Locked)
//!     .persist(true)
//!     .idle_threshold(60)
//!     .tick_interval(Duration::from_secs(5))
//!     .build()
//!     .await?;
//! ```

use crate::config::{DedupMode, FilterParams, FrontierConfig, LockParams, QueueKind, SetStrategy};
use crate::error::{FrontierError, Result};
use crate::idle::IdleShutdownMonitor;
use crate::keys::KeyLayout;
use crate::request::{Fingerprinter, Sha256Fingerprinter};
use crate::scheduler::FrontierScheduler;
use crate::stats::FrontierStats;
use crate::store::{FrontierStore, StoreSettings};
use crate::worker::FrontierWorker;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct FrontierBuilder {
    group: String,
    config: FrontierConfig,
    store: Option<Arc<dyn FrontierStore>>,
    store_settings: StoreSettings,
    fingerprinter: Arc<dyn Fingerprinter>,
    stats: Arc<FrontierStats>,
    tick_interval: Duration,
    handle_ctrl_c: bool,
}

impl FrontierBuilder {
    /// Creates a builder for the worker group `group`.
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            config: FrontierConfig::default(),
            store: None,
            store_settings: StoreSettings::default(),
            fingerprinter: Arc::new(Sha256Fingerprinter::default()),
            stats: Arc::new(FrontierStats::new()),
            tick_interval: Duration::from_secs(5),
            handle_ctrl_c: true,
        }
    }

    /// Replaces the whole configuration, e.g. one loaded from a settings file.
    pub fn config(mut self, config: FrontierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn queue(mut self, kind: QueueKind) -> Self {
        self.config.queue = kind;
        self
    }

    pub fn dedup_mode(mut self, mode: DedupMode) -> Self {
        self.config.dedup_mode = mode;
        self
    }

    pub fn strategy(mut self, strategy: SetStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn filter(mut self, params: FilterParams) -> Self {
        self.config.filter = params;
        self
    }

    /// Routes URLs matching any of `patterns` to an unlocked secondary filter
    /// and switches to dual-namespace dedup.
    pub fn secondary_filter<I, S>(mut self, params: FilterParams, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.secondary_filter = Some(params);
        self.config.secondary_patterns = patterns.into_iter().map(Into::into).collect();
        self.config.dedup_mode = DedupMode::DualNamespace;
        self
    }

    pub fn lock(mut self, params: LockParams) -> Self {
        self.config.lock = params;
        self
    }

    pub fn dupefilter_debug(mut self, enabled: bool) -> Self {
        self.config.dupefilter_debug = enabled;
        self
    }

    pub fn key_layout(mut self, layout: KeyLayout) -> Self {
        self.config.keys = layout;
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.config.persist = persist;
        self
    }

    pub fn flush_on_start(mut self, flush: bool) -> Self {
        self.config.flush_on_start = flush;
        self
    }

    /// Blocking-pop timeout of `next_request`.
    pub fn idle_wait(mut self, wait: Duration) -> Self {
        self.config.idle_wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn idle_threshold(mut self, ticks: u32) -> Self {
        self.config.idle_threshold = ticks;
        self
    }

    /// Uses an already constructed store.
    pub fn store(mut self, store: Arc<dyn FrontierStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Connects to the store described by `settings` at build time.
    pub fn store_settings(mut self, settings: StoreSettings) -> Self {
        self.store_settings = settings;
        self
    }

    pub fn fingerprinter<F>(mut self, fingerprinter: F) -> Self
    where
        F: Fingerprinter + 'static,
    {
        self.fingerprinter = Arc::new(fingerprinter);
        self
    }

    pub fn stats(mut self, stats: Arc<FrontierStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Period of idle ticks in the worker loop.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn handle_ctrl_c(mut self, enabled: bool) -> Self {
        self.handle_ctrl_c = enabled;
        self
    }

    /// Opens the scheduler only.
    pub async fn build_scheduler(mut self) -> Result<FrontierScheduler> {
        self.validate()?;
        let store = self.take_store().await?;
        FrontierScheduler::open_with(
            store,
            self.config,
            self.group,
            self.fingerprinter,
            self.stats,
        )
        .await
    }

    /// Opens the scheduler and wires it into a worker loop.
    pub async fn build(self) -> Result<FrontierWorker> {
        let tick_interval = self.tick_interval;
        let handle_ctrl_c = self.handle_ctrl_c;
        let scheduler = Arc::new(self.build_scheduler().await?);
        let monitor = IdleShutdownMonitor::for_scheduler(&scheduler)?;
        Ok(FrontierWorker::new(scheduler, monitor, tick_interval).handle_ctrl_c(handle_ctrl_c))
    }

    fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(FrontierError::config("tick_interval must be greater than 0."));
        }
        self.config.validate()
    }

    async fn take_store(&mut self) -> Result<Arc<dyn FrontierStore>> {
        if let Some(store) = self.store.take() {
            return Ok(store);
        }
        self.connect().await
    }

    #[cfg(feature = "redis-store")]
    async fn connect(&self) -> Result<Arc<dyn FrontierStore>> {
        debug!("No store given, connecting from settings");
        let store = crate::store::RedisStore::connect(&self.store_settings).await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "redis-store"))]
    async fn connect(&self) -> Result<Arc<dyn FrontierStore>> {
        debug!("No store given and no store backend compiled in");
        Err(FrontierError::config(
            "no store given; enable the redis-store feature or pass one with FrontierBuilder::store.",
        ))
    }
}
