//! The worker loop.
//!
//! One step at a time: check for a stop request, pop the next request, send it
//! downstream, or count an idle tick when nothing has been dispatched for
//! `tick_interval`. The pop is never raced against other futures, so a request
//! taken from the shared queue is always either sent or pushed back.

use super::FrontierHandle;
use crate::error::{FrontierError, Result};
use crate::idle::{IdleShutdownMonitor, IdleVerdict};
use crate::request::Request;
use crate::scheduler::FrontierScheduler;
use kanal::AsyncSender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Why a worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The idle monitor requested shutdown.
    Idle { reason: String },
    /// Ctrl-C or [`FrontierHandle::stop`].
    Interrupted,
    /// The downstream receiver went away.
    ReceiverClosed,
}

impl WorkerExit {
    pub fn reason(&self) -> &str {
        match self {
            WorkerExit::Idle { reason } => reason,
            WorkerExit::Interrupted => "shutdown",
            WorkerExit::ReceiverClosed => "receiver closed",
        }
    }
}

pub struct FrontierWorker {
    scheduler: Arc<FrontierScheduler>,
    monitor: Arc<IdleShutdownMonitor>,
    tick_interval: Duration,
    shutdown: Arc<AtomicBool>,
    handle_ctrl_c: bool,
}

impl FrontierWorker {
    pub fn new(
        scheduler: Arc<FrontierScheduler>,
        monitor: IdleShutdownMonitor,
        tick_interval: Duration,
    ) -> Self {
        FrontierWorker {
            scheduler,
            monitor: Arc::new(monitor),
            tick_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            handle_ctrl_c: true,
        }
    }

    /// Whether Ctrl-C stops the loop. On by default.
    pub fn handle_ctrl_c(mut self, enabled: bool) -> Self {
        self.handle_ctrl_c = enabled;
        self
    }

    pub fn handle(&self) -> FrontierHandle {
        FrontierHandle {
            scheduler: Arc::clone(&self.scheduler),
            monitor: Arc::clone(&self.monitor),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Runs until idle shutdown, a stop request or a closed receiver, then
    /// closes the scheduler with the exit reason.
    pub async fn run(self, sender: AsyncSender<Request>) -> Result<WorkerExit> {
        info!(
            "Worker starting for group {} with tick interval {:?}",
            self.scheduler.keys().group(),
            self.tick_interval
        );
        self.monitor.on_opened();

        let ctrl_c_task = if self.handle_ctrl_c {
            let shutdown = Arc::clone(&self.shutdown);
            Some(tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received, initiating graceful shutdown.");
                    shutdown.store(true, Ordering::SeqCst);
                }
            }))
        } else {
            None
        };

        let result = self.drive(&sender).await;
        if let Some(task) = ctrl_c_task {
            task.abort();
        }
        let exit = result?;

        self.scheduler.close(exit.reason()).await?;
        let stats = self.scheduler.stats();
        info!(
            "Worker finished ({}). Stats: requests_enqueued={}, requests_dequeued={}, duplicates_filtered={}",
            exit.reason(),
            stats.enqueued(),
            stats.dequeued(),
            stats.duplicates()
        );
        Ok(exit)
    }

    /// True when an empty pop already spent `idle_wait` blocking in the store.
    fn pop_waited(&self) -> bool {
        self.scheduler.config().idle_wait_ms > 0 && self.scheduler.queue().blocks_on_pop()
    }

    async fn drive(&self, sender: &AsyncSender<Request>) -> Result<WorkerExit> {
        let poll_interval = self.tick_interval.min(Duration::from_millis(100));
        let mut last_activity = Instant::now();

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(WorkerExit::Interrupted);
            }
            if sender.is_closed() {
                return Ok(WorkerExit::ReceiverClosed);
            }

            match self.scheduler.next_request().await {
                Ok(Some(request)) => {
                    trace!("Sending request downstream: {}", request.url);
                    if let Err(e) = sender.send(request.clone()).await {
                        warn!("Receiver dropped ({}), returning {} to the queue", e, request.url);
                        self.scheduler.queue().push(&request).await?;
                        return Ok(WorkerExit::ReceiverClosed);
                    }
                    self.monitor.on_request_scheduled();
                    last_activity = Instant::now();
                }
                Ok(None) => {
                    if last_activity.elapsed() >= self.tick_interval {
                        last_activity = Instant::now();
                        match self.monitor.on_idle_tick().await? {
                            IdleVerdict::Continue => {
                                debug!("Idle tick {}", self.monitor.idle_ticks());
                            }
                            IdleVerdict::Shutdown { reason } => {
                                return Ok(WorkerExit::Idle { reason });
                            }
                        }
                    } else if !self.pop_waited() {
                        tokio::time::sleep(poll_interval).await;
                    }
                }
                Err(e) if e.is_unavailable() => {
                    error!("Store unavailable, stopping worker: {}", e);
                    return Err(e);
                }
                Err(e @ FrontierError::Configuration(_)) => return Err(e),
                Err(e) => {
                    error!("Failed to fetch next request: {}", e);
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}
