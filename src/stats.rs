//! # Statistics Module
//!
//! Counters describing one worker's view of the shared frontier.
//!
//! ## Overview
//!
//! `FrontierStats` is shared by the scheduler, the dedup filter and the idle
//! monitor of a worker. Every counter is an atomic, so components update it
//! concurrently without coordination. The numbers are per process: the group
//! as a whole is the sum over its workers.
//!
//! ## Key Metrics Tracked
//!
//! - **Requests**: enqueued, dequeued, filtered as duplicates
//! - **Contention**: lock timeouts (per lock key) and salvaged requests
//! - **Queue health**: malformed entries skipped
//! - **Idleness**: idle ticks observed
//!
//! ## Example
//!
//! ```rust,ignore
//! let stats = scheduler.stats();
//! println!("{}", stats.to_json_string_pretty()?);
//! println!("{}", stats.to_markdown_string());
//! ```

use crate::error::Result;
use dashmap::DashMap;
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

struct StatsSnapshot {
    requests_enqueued: usize,
    requests_dequeued: usize,
    duplicates_filtered: usize,
    requests_salvaged: usize,
    lock_timeouts: usize,
    malformed_entries: usize,
    idle_ticks: usize,
    lock_timeouts_by_key: BTreeMap<String, usize>,
    elapsed_duration: Duration,
}

impl StatsSnapshot {
    fn formatted_duration(&self) -> String {
        format!("{:?}", self.elapsed_duration)
    }

    fn per_second(&self, count: usize) -> f64 {
        let total_seconds = self.elapsed_duration.as_secs();
        if total_seconds > 0 {
            count as f64 / total_seconds as f64
        } else {
            0.0
        }
    }

    fn duplicate_ratio(&self) -> f64 {
        let seen = self.requests_enqueued + self.duplicates_filtered;
        if seen > 0 {
            self.duplicates_filtered as f64 / seen as f64
        } else {
            0.0
        }
    }
}

/// Frontier counters of one worker.
#[derive(Debug, serde::Serialize)]
pub struct FrontierStats {
    #[serde(skip)]
    pub start_time: Instant,

    pub requests_enqueued: AtomicUsize,
    pub requests_dequeued: AtomicUsize,
    pub duplicates_filtered: AtomicUsize,
    pub requests_salvaged: AtomicUsize,

    pub lock_timeouts: AtomicUsize,
    pub lock_timeouts_by_key: DashMap<String, usize>,

    pub malformed_entries: AtomicUsize,
    pub idle_ticks: AtomicUsize,
}

impl FrontierStats {
    pub fn new() -> Self {
        FrontierStats {
            start_time: Instant::now(),
            requests_enqueued: AtomicUsize::new(0),
            requests_dequeued: AtomicUsize::new(0),
            duplicates_filtered: AtomicUsize::new(0),
            requests_salvaged: AtomicUsize::new(0),
            lock_timeouts: AtomicUsize::new(0),
            lock_timeouts_by_key: DashMap::new(),
            malformed_entries: AtomicUsize::new(0),
            idle_ticks: AtomicUsize::new(0),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let lock_timeouts_by_key = self
            .lock_timeouts_by_key
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        StatsSnapshot {
            requests_enqueued: self.requests_enqueued.load(Ordering::SeqCst),
            requests_dequeued: self.requests_dequeued.load(Ordering::SeqCst),
            duplicates_filtered: self.duplicates_filtered.load(Ordering::SeqCst),
            requests_salvaged: self.requests_salvaged.load(Ordering::SeqCst),
            lock_timeouts: self.lock_timeouts.load(Ordering::SeqCst),
            malformed_entries: self.malformed_entries.load(Ordering::SeqCst),
            idle_ticks: self.idle_ticks.load(Ordering::SeqCst),
            lock_timeouts_by_key,
            elapsed_duration: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_requests_enqueued(&self) {
        self.requests_enqueued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_dequeued(&self) {
        self.requests_dequeued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_duplicates_filtered(&self) {
        self.duplicates_filtered.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_salvaged(&self) {
        self.requests_salvaged.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a lock acquisition that ran out of attempts.
    pub(crate) fn record_lock_timeout(&self, key: &str) {
        self.lock_timeouts.fetch_add(1, Ordering::SeqCst);
        *self.lock_timeouts_by_key.entry(key.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn increment_malformed_entries(&self) {
        self.malformed_entries.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_idle_ticks(&self) {
        self.idle_ticks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates_filtered.load(Ordering::SeqCst)
    }

    pub fn enqueued(&self) -> usize {
        self.requests_enqueued.load(Ordering::SeqCst)
    }

    pub fn dequeued(&self) -> usize {
        self.requests_dequeued.load(Ordering::SeqCst)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Exports the current statistics to a Markdown formatted string.
    pub fn to_markdown_string(&self) -> String {
        let snapshot = self.snapshot();

        let locks_list: String = snapshot
            .lock_timeouts_by_key
            .iter()
            .map(|(key, count)| format!("- **{}**: {}", key, count))
            .collect::<Vec<String>>()
            .join("\n");
        let locks_output = if locks_list.is_empty() {
            "N/A".to_string()
        } else {
            locks_list
        };

        format!(
            r#"# Frontier Statistics Report

- **Duration**: {}
- **Average Speed**: {:.2} enq/s, {:.2} deq/s
- **Duplicate Ratio**: {:.2}%

## Requests
| Metric     | Count |
|------------|-------|
| Enqueued   | {}     |
| Dequeued   | {}     |
| Duplicates | {}     |
| Salvaged   | {}     |

## Health
| Metric        | Count |
|---------------|-------|
| Lock Timeouts | {}     |
| Malformed     | {}     |
| Idle Ticks    | {}     |

## Contended Locks
{}
"#,
            snapshot.formatted_duration(),
            snapshot.per_second(snapshot.requests_enqueued),
            snapshot.per_second(snapshot.requests_dequeued),
            snapshot.duplicate_ratio() * 100.0,
            snapshot.requests_enqueued,
            snapshot.requests_dequeued,
            snapshot.duplicates_filtered,
            snapshot.requests_salvaged,
            snapshot.lock_timeouts,
            snapshot.malformed_entries,
            snapshot.idle_ticks,
            locks_output
        )
    }
}

impl Default for FrontierStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FrontierStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nFrontier Statistics")?;
        writeln!(f, "-------------------")?;
        writeln!(f, "  duration : {}", snapshot.formatted_duration())?;
        writeln!(
            f,
            "  speed    : enq/s: {:.2}, deq/s: {:.2}",
            snapshot.per_second(snapshot.requests_enqueued),
            snapshot.per_second(snapshot.requests_dequeued)
        )?;
        writeln!(
            f,
            "  requests : enqueued: {}, dequeued: {}, duplicates: {}, salvaged: {}",
            snapshot.requests_enqueued,
            snapshot.requests_dequeued,
            snapshot.duplicates_filtered,
            snapshot.requests_salvaged
        )?;
        writeln!(
            f,
            "  health   : lock_timeouts: {}, malformed: {}, idle_ticks: {}",
            snapshot.lock_timeouts, snapshot.malformed_entries, snapshot.idle_ticks
        )?;

        let locks_string = if snapshot.lock_timeouts_by_key.is_empty() {
            "none".to_string()
        } else {
            snapshot
                .lock_timeouts_by_key
                .iter()
                .map(|(key, count)| format!("{}: {}", key, count))
                .collect::<Vec<String>>()
                .join(", ")
        };

        writeln!(f, "  locks    : {}\n", locks_string)
    }
}
