//! # spider-frontier
//!
//! A shared crawl frontier for horizontally scaled crawlers.
//!
//! Many worker processes share one pending-request queue and one "already
//! scheduled?" filter, both kept in Redis, so a crawl can add workers without
//! re-visiting URLs and can restart without losing work.
//!
//! Provides the main components: `FrontierScheduler`, `DedupFilter`, the
//! `RequestQueue` orderings, `IdleShutdownMonitor` and the `FrontierWorker`
//! loop, over the `FrontierStore` abstraction.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_frontier::prelude::*;
//!
//! async fn run_worker() -> Result<(), FrontierError> {
//!     let worker = FrontierBuilder::new("news")
//!         .store_settings(StoreSettings::standalone("redis://127.0.0.1:6379"))
//!         .dedup_mode(DedupMode::Locked)
//!         .build()
//!         .await?;
//!
//!     let handle = worker.handle();
//!     handle.enqueue(Request::get("https://example.com/")?).await?;
//!
//!     let (tx, rx) = kanal::bounded_async(64);
//!     tokio::spawn(async move {
//!         while let Ok(request) = rx.recv().await {
//!             println!("fetch {}", request.url);
//!         }
//!     });
//!     let exit = worker.run(tx).await?;
//!     println!("worker stopped: {}", exit.reason());
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod filter;
pub mod idle;
pub mod keys;
pub mod prelude;
pub mod queue;
pub mod request;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod worker;

pub use builder::FrontierBuilder;
pub use config::{DedupMode, FilterParams, FrontierConfig, LockParams, QueueKind, SetStrategy};
pub use error::{FrontierError, Result};
pub use filter::{ApproximateSet, DedupFilter, FilterSizing, LockBackoff};
pub use idle::{IdleShutdownMonitor, IdleVerdict};
pub use keys::{KeyLayout, KeySpace};
pub use queue::{FifoQueue, LifoQueue, PriorityQueue, RequestQueue};
pub use request::{Fingerprinter, Request, Sha256Fingerprinter};
pub use scheduler::FrontierScheduler;
pub use stats::FrontierStats;
#[cfg(feature = "redis-store")]
pub use store::RedisStore;
pub use store::{FrontierStore, MemoryStore, StoreSettings, StoreTopology};
pub use worker::{FrontierHandle, FrontierWorker, WorkerExit};

pub use async_trait::async_trait;
pub use tokio;
