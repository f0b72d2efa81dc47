//! # Worker Module
//!
//! An owned driver loop for hosts that do not want to wire scheduler events
//! by hand.
//!
//! ## Overview
//!
//! `FrontierWorker` pulls requests from a [`FrontierScheduler`] and sends them
//! on a `kanal` channel to whatever downloads them. When the queue stays empty
//! it feeds idle ticks to an [`IdleShutdownMonitor`] and closes the scheduler
//! once the monitor asks for shutdown. New requests found by the engine go
//! back in through a cloneable [`FrontierHandle`], which also resets the idle
//! count.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_frontier::FrontierBuilder;
//!
//! let worker = FrontierBuilder::new("news").build().await?;
//! let handle = worker.handle();
//! let (tx, rx) = kanal::bounded_async(64);
//!
//! tokio::spawn(async move {
//!     while let Ok(request) = rx.recv().await {
//!         // download, parse, then handle.enqueue(next).await
//!     }
//! });
//! let exit = worker.run(tx).await?;
//! ```
//!
//! [`FrontierScheduler`]: crate::scheduler::FrontierScheduler
//! [`IdleShutdownMonitor`]: crate::idle::IdleShutdownMonitor

mod core;
mod handle;

pub use core::{FrontierWorker, WorkerExit};
pub use handle::FrontierHandle;
