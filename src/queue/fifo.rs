use super::RequestQueue;
use super::codec::{decode_request, encode_request};
use crate::error::Result;
use crate::request::Request;
use crate::store::FrontierStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// First in, first out: push onto the head, pop from the tail.
pub struct FifoQueue {
    store: Arc<dyn FrontierStore>,
    key: String,
}

impl FifoQueue {
    pub fn new(store: Arc<dyn FrontierStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl RequestQueue for FifoQueue {
    async fn push(&self, request: &Request) -> Result<()> {
        self.store.push_head(&self.key, encode_request(request)?).await
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Request>> {
        match self.store.pop_tail(&self.key, timeout).await? {
            Some(bytes) => decode_request(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn blocks_on_pop(&self) -> bool {
        true
    }

    async fn len(&self) -> Result<usize> {
        self.store.list_len(&self.key).await
    }

    async fn clear(&self) -> Result<()> {
        self.store.delete(std::slice::from_ref(&self.key)).await
    }

    fn key(&self) -> &str {
        &self.key
    }
}
