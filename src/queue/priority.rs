use super::RequestQueue;
use super::codec::{decode_request, encode_request};
use crate::error::Result;
use crate::request::Request;
use crate::store::FrontierStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Sorted set scored by `Request::priority`; the lowest score pops first.
///
/// Pops never block: the timeout is ignored and an empty set answers `None`
/// immediately. Two entries that encode to identical bytes are stored once.
pub struct PriorityQueue {
    store: Arc<dyn FrontierStore>,
    key: String,
}

impl PriorityQueue {
    pub fn new(store: Arc<dyn FrontierStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl RequestQueue for PriorityQueue {
    async fn push(&self, request: &Request) -> Result<()> {
        let score = f64::from(request.priority);
        self.store
            .zadd(&self.key, score, encode_request(request)?)
            .await
    }

    async fn pop(&self, _timeout: Duration) -> Result<Option<Request>> {
        match self.store.zpop_min(&self.key).await? {
            Some(bytes) => decode_request(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize> {
        self.store.zcard(&self.key).await
    }

    async fn clear(&self) -> Result<()> {
        self.store.delete(std::slice::from_ref(&self.key)).await
    }

    fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::{drain, request};
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    #[tokio::test]
    async fn lowest_priority_value_pops_first() {
        let queue = PriorityQueue::new(Arc::new(MemoryStore::new()), "news:requests");
        for (path, priority) in [("five", 5), ("one", 1), ("three", 3)] {
            queue.push(&request(path).with_priority(priority)).await.unwrap();
        }
        assert_eq!(drain(&queue).await, vec!["one", "three", "five"]);
    }

    #[tokio::test]
    async fn empty_queue_answers_immediately() {
        let queue = PriorityQueue::new(Arc::new(MemoryStore::new()), "news:requests");
        let started = tokio::time::Instant::now();
        assert!(queue.pop(Duration::from_secs(5)).await.unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pollers_claim_each_entry_once() {
        let queue = Arc::new(PriorityQueue::new(Arc::new(MemoryStore::new()), "news:requests"));
        let total = 200;
        for i in 0..total {
            queue
                .push(&request(&format!("page/{}", i)).with_priority(i % 7))
                .await
                .unwrap();
        }

        let mut pollers = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            pollers.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(request) = queue.pop(Duration::ZERO).await.unwrap() {
                    claimed.push(request.url.to_string());
                    tokio::task::yield_now().await;
                }
                claimed
            }));
        }

        let mut all = Vec::new();
        for poller in pollers {
            all.extend(poller.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), total as usize);
        assert_eq!(unique.len(), total as usize);
    }
}
