//! # Scheduler Module
//!
//! The single integration point a crawl engine drives.
//!
//! ## Overview
//!
//! `FrontierScheduler` composes the shared queue and the dedup filter of one
//! worker group. Every worker of the group opens its own scheduler against the
//! same store and group name; they share state only through the store.
//!
//! ## Key Responsibilities
//!
//! - **Gatekeeping**: `enqueue_request` drops requests the filter has seen,
//!   unless the request is marked `dont_filter`.
//! - **Dispatch**: `next_request` pops from the shared queue, skipping entries
//!   that cannot be decoded.
//! - **Request Salvaging**: a request whose dedup lock could not be taken, or
//!   whose push failed after the filter admitted it, is parked in-process and
//!   re-submitted at the start of the next `next_request`.
//! - **Lifecycle**: optional flush on open, resume logging, and clearing of
//!   queue and filter on close unless the crawl is persistent.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_frontier::{FrontierConfig, FrontierScheduler, MemoryStore, Request};
//! use std::sync::Arc;
//!
//! let scheduler = FrontierScheduler::open(Arc::new(MemoryStore::new()), FrontierConfig::default(), "news").await?;
//! scheduler.enqueue_request(Request::get("https://example.com/")?).await?;
//! while let Some(request) = scheduler.next_request().await? {
//!     // download and parse
//! }
//! scheduler.close("finished").await?;
//! ```

use crate::config::FrontierConfig;
use crate::error::{FrontierError, Result};
use crate::filter::DedupFilter;
use crate::keys::KeySpace;
use crate::queue::{RequestQueue, build_queue};
use crate::request::{Fingerprinter, Request, Sha256Fingerprinter};
use crate::stats::FrontierStats;
use crate::store::FrontierStore;
use crossbeam::queue::SegQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, trace, warn};

struct SalvagedRequest {
    request: Request,
    /// False once the filter has already admitted the request.
    needs_filter: bool,
}

pub struct FrontierScheduler {
    store: Arc<dyn FrontierStore>,
    keys: KeySpace,
    config: FrontierConfig,
    queue: Box<dyn RequestQueue>,
    dedup: DedupFilter,
    salvaged_requests: SegQueue<SalvagedRequest>,
    stats: Arc<FrontierStats>,
    is_closed: AtomicBool,
}

impl FrontierScheduler {
    /// Opens the scheduler of `group` with the default fingerprinter.
    pub async fn open(
        store: Arc<dyn FrontierStore>,
        config: FrontierConfig,
        group: impl Into<String>,
    ) -> Result<Self> {
        Self::open_with(
            store,
            config,
            group,
            Arc::new(Sha256Fingerprinter::default()),
            Arc::new(FrontierStats::new()),
        )
        .await
    }

    /// Opens the scheduler of `group`.
    ///
    /// Fails with `Configuration` before touching the store if the
    /// configuration is invalid, and with `StoreUnavailable` if the store
    /// cannot be reached.
    pub async fn open_with(
        store: Arc<dyn FrontierStore>,
        config: FrontierConfig,
        group: impl Into<String>,
        fingerprinter: Arc<dyn Fingerprinter>,
        stats: Arc<FrontierStats>,
    ) -> Result<Self> {
        config.validate()?;
        let group = group.into();
        if group.trim().is_empty() {
            return Err(FrontierError::config("worker group must not be empty."));
        }
        let keys = KeySpace::new(group, config.keys.clone());
        let queue = build_queue(config.queue, store.clone(), keys.queue());
        let dedup = DedupFilter::new(store.clone(), &keys, &config, fingerprinter, stats.clone())?;

        let scheduler = FrontierScheduler {
            store,
            keys,
            config,
            queue,
            dedup,
            salvaged_requests: SegQueue::new(),
            stats,
            is_closed: AtomicBool::new(false),
        };

        if scheduler.config.flush_on_start {
            info!("Flushing frontier of group {} on start", scheduler.keys.group());
            scheduler.flush().await?;
        }

        let pending = scheduler.queue.len().await?;
        if pending > 0 {
            info!("Resuming crawl ({} requests scheduled)", pending);
        }
        info!(
            "Scheduler opened for group {} ({:?} queue, {:?} dedup)",
            scheduler.keys.group(),
            scheduler.config.queue,
            scheduler.config.dedup_mode
        );
        Ok(scheduler)
    }

    /// Schedules `request`. Returns false if it was dropped as a duplicate.
    ///
    /// On `LockTimeout` the request is salvaged and the error returned; it
    /// will be re-submitted by a later `next_request`.
    pub async fn enqueue_request(&self, request: Request) -> Result<bool> {
        if !request.dont_filter {
            match self.dedup.request_seen(&request).await {
                Ok(true) => {
                    self.dedup.log_duplicate(&request);
                    return Ok(false);
                }
                Ok(false) => {}
                Err(e @ FrontierError::LockTimeout { .. }) => {
                    warn!("{}. Salvaging request: {}", e, request.url);
                    self.salvage(request, true);
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
        self.push(request).await?;
        Ok(true)
    }

    /// Pushes an admitted request, salvaging it if the push fails.
    async fn push(&self, request: Request) -> Result<()> {
        trace!("Enqueuing request: {}", request.url);
        if let Err(e) = self.queue.push(&request).await {
            if !self.is_closed.load(Ordering::SeqCst) {
                error!("Failed to push request {}: {}. Salvaging request.", request.url, e);
            }
            self.salvage(request, false);
            return Err(e);
        }
        self.stats.increment_requests_enqueued();
        Ok(())
    }

    fn salvage(&self, request: Request, needs_filter: bool) {
        self.salvaged_requests.push(SalvagedRequest {
            request,
            needs_filter,
        });
        self.stats.increment_requests_salvaged();
    }

    /// Re-submits parked requests and stops at the first one that fails again.
    ///
    /// A request that fails is parked again. Only `LockTimeout` is swallowed;
    /// any other error is returned.
    async fn resubmit_salvaged(&self) -> Result<()> {
        let count = self.salvaged_requests.len();
        if count == 0 {
            return Ok(());
        }
        debug!("Re-submitting {} salvaged requests", count);
        for _ in 0..count {
            let Some(salvaged) = self.salvaged_requests.pop() else {
                break;
            };
            let SalvagedRequest {
                request,
                needs_filter,
            } = salvaged;

            if needs_filter && !request.dont_filter {
                match self.dedup.request_seen(&request).await {
                    Ok(true) => {
                        self.dedup.log_duplicate(&request);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.salvaged_requests.push(SalvagedRequest {
                            request,
                            needs_filter,
                        });
                        if matches!(e, FrontierError::LockTimeout { .. }) {
                            debug!("Salvaged request still waiting for its lock: {}", e);
                            return Ok(());
                        }
                        return Err(e);
                    }
                }
            }
            self.push(request).await?;
        }
        Ok(())
    }

    /// Pops the next request, waiting up to `idle_wait` where the queue can block.
    ///
    /// Fails with the store error if a salvaged request cannot be re-submitted
    /// for any reason other than a still-held lock; the request stays parked.
    pub async fn next_request(&self) -> Result<Option<Request>> {
        self.resubmit_salvaged().await?;

        loop {
            match self.queue.pop(self.config.idle_wait()).await {
                Ok(Some(request)) => {
                    trace!("Dequeued request: {}", request.url);
                    self.stats.increment_requests_dequeued();
                    return Ok(Some(request));
                }
                Ok(None) => return Ok(None),
                Err(FrontierError::MalformedEntry(message)) => {
                    warn!("Skipping malformed queue entry: {}", message);
                    self.stats.increment_malformed_entries();
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// True while the shared queue or the salvage queue holds requests.
    pub async fn has_pending_requests(&self) -> Result<bool> {
        Ok(!self.salvaged_requests.is_empty() || !self.queue.is_empty().await?)
    }

    /// Pending requests in the shared queue plus salvaged ones.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.queue.len().await? + self.salvaged_requests.len())
    }

    pub fn salvaged_len(&self) -> usize {
        self.salvaged_requests.len()
    }

    /// Clears queue and filter.
    pub async fn flush(&self) -> Result<()> {
        self.dedup.clear().await?;
        self.queue.clear().await
    }

    /// Closes the scheduler. Queue and filter are cleared unless `persist` is set.
    pub async fn close(&self, reason: &str) -> Result<()> {
        self.is_closed.store(true, Ordering::SeqCst);

        let lost = self.salvaged_requests.len();
        if lost > 0 {
            warn!(
                "Closing with {} salvaged requests that never reached the shared queue",
                lost
            );
        }
        if !self.config.persist {
            self.flush().await?;
        }
        info!("Scheduler for group {} closed ({})", self.keys.group(), reason);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Arc<FrontierStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &FrontierConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn store(&self) -> Arc<dyn FrontierStore> {
        Arc::clone(&self.store)
    }

    pub fn dedup(&self) -> &DedupFilter {
        &self.dedup
    }

    pub fn queue(&self) -> &dyn RequestQueue {
        self.queue.as_ref()
    }
}
