//! A "prelude" for users of the `spider-frontier` crate.
//!
//! This prelude re-exports the most commonly used traits, structs and enums
//! so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use spider_frontier::prelude::*;
//! ```

pub use crate::{
    // Core structs
    FrontierBuilder,
    FrontierConfig,
    FrontierHandle,
    FrontierScheduler,
    FrontierWorker,
    MemoryStore,
    Request,
    StoreSettings,
    WorkerExit,
    // Core traits
    Fingerprinter,
    FrontierStore,
    RequestQueue,
    // Settings
    DedupMode,
    QueueKind,
    SetStrategy,
    // Errors
    FrontierError,
    // Essential re-exports for trait implementation
    async_trait,
};
