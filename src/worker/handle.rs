use crate::error::Result;
use crate::idle::IdleShutdownMonitor;
use crate::request::Request;
use crate::scheduler::FrontierScheduler;
use crate::stats::FrontierStats;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Cloneable entry point into a running [`FrontierWorker`](super::FrontierWorker).
#[derive(Clone)]
pub struct FrontierHandle {
    pub(super) scheduler: Arc<FrontierScheduler>,
    pub(super) monitor: Arc<IdleShutdownMonitor>,
    pub(super) shutdown: Arc<AtomicBool>,
}

impl FrontierHandle {
    /// Schedules `request`; a scheduled request resets the idle count.
    pub async fn enqueue(&self, request: Request) -> Result<bool> {
        let scheduled = self.scheduler.enqueue_request(request).await?;
        if scheduled {
            self.monitor.on_request_scheduled();
        }
        Ok(scheduled)
    }

    /// Asks the worker loop to stop after its current step.
    pub fn stop(&self) {
        debug!("Stop requested for group {}", self.scheduler.keys().group());
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Arc<FrontierStats> {
        self.scheduler.stats()
    }

    pub fn scheduler(&self) -> &FrontierScheduler {
        &self.scheduler
    }
}
