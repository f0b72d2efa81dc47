//! # Queue Module
//!
//! The shared pending-request queue of a worker group.
//!
//! ## Overview
//!
//! Three orderings implement [`RequestQueue`] over a single store key:
//!
//! - [`FifoQueue`]: push onto the head, pop from the tail.
//! - [`LifoQueue`]: push and pop at the head.
//! - [`PriorityQueue`]: a sorted set scored by request priority; the lowest
//!   score pops first and a pop is one atomic read-and-remove.
//!
//! Requests travel as [`codec::QueueEntry`] MessagePack maps. An entry that
//! cannot be decoded is removed by the pop that found it and reported as
//! `FrontierError::MalformedEntry`.

pub mod codec;
pub mod fifo;
pub mod lifo;
pub mod priority;

pub use codec::QueueEntry;
pub use fifo::FifoQueue;
pub use lifo::LifoQueue;
pub use priority::PriorityQueue;

use crate::config::QueueKind;
use crate::error::Result;
use crate::request::Request;
use crate::store::FrontierStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A shared request queue.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    async fn push(&self, request: &Request) -> Result<()>;

    /// Pops the next request. A non-zero `timeout` waits for one where the
    /// ordering supports blocking pops; `None` means the queue stayed empty.
    async fn pop(&self, timeout: Duration) -> Result<Option<Request>>;

    /// Whether `pop` waits out a non-zero timeout on an empty queue.
    fn blocks_on_pop(&self) -> bool {
        false
    }

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Deletes the underlying store structure.
    async fn clear(&self) -> Result<()>;

    fn key(&self) -> &str;
}

/// Creates the queue of `kind` stored at `key`.
pub fn build_queue(
    kind: QueueKind,
    store: Arc<dyn FrontierStore>,
    key: impl Into<String>,
) -> Box<dyn RequestQueue> {
    match kind {
        QueueKind::Fifo => Box::new(FifoQueue::new(store, key)),
        QueueKind::Lifo => Box::new(LifoQueue::new(store, key)),
        QueueKind::Priority => Box::new(PriorityQueue::new(store, key)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryStore;

    pub(crate) fn request(path: &str) -> Request {
        Request::get(&format!("https://example.com/{}", path)).unwrap()
    }

    pub(crate) async fn drain(queue: &dyn RequestQueue) -> Vec<String> {
        let mut paths = Vec::new();
        while let Some(request) = queue.pop(Duration::ZERO).await.unwrap() {
            paths.push(request.url.path().trim_start_matches('/').to_string());
        }
        paths
    }

    #[tokio::test]
    async fn build_queue_selects_the_ordering() {
        let store: Arc<dyn FrontierStore> = Arc::new(MemoryStore::new());
        for (kind, expected) in [
            (QueueKind::Fifo, vec!["a", "b", "c"]),
            (QueueKind::Lifo, vec!["c", "b", "a"]),
            (QueueKind::Priority, vec!["a", "b", "c"]),
        ] {
            let queue = build_queue(kind, store.clone(), "news:requests");
            assert_eq!(queue.blocks_on_pop(), kind != QueueKind::Priority);
            for path in ["a", "b", "c"] {
                queue.push(&request(path)).await.unwrap();
            }
            assert_eq!(queue.len().await.unwrap(), 3);
            assert_eq!(drain(queue.as_ref()).await, expected, "{:?}", kind);
            assert!(queue.is_empty().await.unwrap());
        }
    }
}
