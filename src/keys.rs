//! Store key namespacing.
//!
//! Every key the frontier touches belongs to exactly one worker group. Keys are
//! built from the group identity and a fixed set of segments, so two crawl jobs
//! sharing a store never see each other's queue, filter or locks.

use serde::{Deserialize, Serialize};

/// Key segments appended to the worker-group name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyLayout {
    pub queue: String,
    pub dupefilter: String,
    pub secondary_dupefilter: String,
    pub lock: String,
    pub seeds: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        KeyLayout {
            queue: "requests".to_string(),
            dupefilter: "dupefilter".to_string(),
            secondary_dupefilter: "dupefilter_list".to_string(),
            lock: "dupefilter_lock".to_string(),
            seeds: "start_urls".to_string(),
        }
    }
}

/// The resolved key namespace of one worker group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    group: String,
    layout: KeyLayout,
}

impl KeySpace {
    pub fn new(group: impl Into<String>, layout: KeyLayout) -> Self {
        Self {
            group: group.into(),
            layout,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Key of the pending-request queue.
    pub fn queue(&self) -> String {
        self.join(&self.layout.queue)
    }

    /// Prefix of the primary filter's shard keys.
    pub fn dupefilter(&self) -> String {
        self.join(&self.layout.dupefilter)
    }

    /// Prefix of the secondary (unlocked) filter's shard keys.
    pub fn secondary_dupefilter(&self) -> String {
        self.join(&self.layout.secondary_dupefilter)
    }

    /// Prefix of the advisory lock keys.
    pub fn lock(&self) -> String {
        self.join(&self.layout.lock)
    }

    /// Key the engine feeds seed URLs into.
    pub fn seeds(&self) -> String {
        self.join(&self.layout.seeds)
    }

    fn join(&self, segment: &str) -> String {
        format!("{}:{}", self.group, segment)
    }
}

/// Key of one indexed member (shard or lock) below `prefix`.
pub fn indexed(prefix: &str, index: usize) -> String {
    format!("{}:{}", prefix, index)
}
