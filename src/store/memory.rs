//! In-process implementation of [`FrontierStore`].
//!
//! Mirrors the Redis semantics the frontier depends on: bit arrays grow on
//! demand, empty lists and sorted sets disappear, locks expire after their TTL
//! and blocking pops wait up to their timeout. Each operation touches a single
//! key and runs under that key's map shard lock, which makes every call atomic
//! with respect to concurrent callers in the same process.

use super::FrontierStore;
use crate::error::{FrontierError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const BLOCKING_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
enum Value {
    Bits(Vec<u8>),
    Counters(HashMap<u64, i64>),
    List(VecDeque<Vec<u8>>),
    SortedSet(Vec<(f64, Vec<u8>)>),
    Lock { token: String, expires_at: Instant },
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Bits(_) => "bits",
            Value::Counters(_) => "counters",
            Value::List(_) => "list",
            Value::SortedSet(_) => "sorted set",
            Value::Lock { .. } => "lock",
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Value::Lock { expires_at, .. } => *expires_at > Instant::now(),
            _ => true,
        }
    }
}

fn wrong_type(key: &str, value: &Value) -> FrontierError {
    FrontierError::Store(format!(
        "WRONGTYPE key '{}' holds a {} value",
        key,
        value.kind()
    ))
}

/// Shared in-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<DashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        self.data.iter().filter(|entry| entry.value().is_live()).count()
    }

    fn pop_list(&self, key: &str, from_head: bool) -> Result<Option<Vec<u8>>> {
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(None);
        };
        let popped = match entry.value_mut() {
            Value::List(list) => {
                if from_head {
                    list.pop_front()
                } else {
                    list.pop_back()
                }
            }
            other => return Err(wrong_type(key, other)),
        };
        let now_empty = matches!(entry.value(), Value::List(list) if list.is_empty());
        drop(entry);
        if now_empty {
            self.data
                .remove_if(key, |_, v| matches!(v, Value::List(list) if list.is_empty()));
        }
        Ok(popped)
    }

    async fn pop_list_blocking(
        &self,
        key: &str,
        from_head: bool,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.pop_list(key, from_head)? {
                return Ok(Some(value));
            }
            if timeout.is_zero() || Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(BLOCKING_POLL.min(deadline - Instant::now())).await;
        }
    }
}

fn bit_is_set(bytes: &[u8], offset: u64) -> bool {
    let byte = (offset / 8) as usize;
    let mask = 0x80u8 >> (offset % 8);
    bytes.get(byte).is_some_and(|b| b & mask != 0)
}

#[async_trait]
impl FrontierStore for MemoryStore {
    async fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>> {
        match self.data.get(key) {
            None => Ok(vec![false; offsets.len()]),
            Some(entry) => match entry.value() {
                Value::Bits(bytes) => Ok(offsets.iter().map(|&o| bit_is_set(bytes, o)).collect()),
                other => Err(wrong_type(key, other)),
            },
        }
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<()> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Bits(Vec::new()));
        match entry.value_mut() {
            Value::Bits(bytes) => {
                for &offset in offsets {
                    let byte = (offset / 8) as usize;
                    if bytes.len() <= byte {
                        bytes.resize(byte + 1, 0);
                    }
                    bytes[byte] |= 0x80u8 >> (offset % 8);
                }
                Ok(())
            }
            other => Err(wrong_type(key, other)),
        }
    }

    async fn get_counters(&self, key: &str, offsets: &[u64]) -> Result<Vec<i64>> {
        match self.data.get(key) {
            None => Ok(vec![0; offsets.len()]),
            Some(entry) => match entry.value() {
                Value::Counters(counters) => Ok(offsets
                    .iter()
                    .map(|o| counters.get(o).copied().unwrap_or(0))
                    .collect()),
                other => Err(wrong_type(key, other)),
            },
        }
    }

    async fn incr_counters(&self, key: &str, offsets: &[u64]) -> Result<()> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Counters(HashMap::new()));
        match entry.value_mut() {
            Value::Counters(counters) => {
                for &offset in offsets {
                    *counters.entry(offset).or_insert(0) += 1;
                }
                Ok(())
            }
            other => Err(wrong_type(key, other)),
        }
    }

    async fn decr_counters(&self, key: &str, offsets: &[u64]) -> Result<()> {
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(());
        };
        match entry.value_mut() {
            Value::Counters(counters) => {
                for offset in offsets {
                    if let Some(count) = counters.get_mut(offset) {
                        if *count > 0 {
                            *count -= 1;
                        }
                    }
                }
                Ok(())
            }
            other => Err(wrong_type(key, other)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.get(key).is_some_and(|entry| entry.value().is_live()))
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.data.remove(key);
        }
        Ok(())
    }

    async fn push_head(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()));
        match entry.value_mut() {
            Value::List(list) => {
                list.push_front(value);
                Ok(())
            }
            other => Err(wrong_type(key, other)),
        }
    }

    async fn pop_head(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.pop_list_blocking(key, true, timeout).await
    }

    async fn pop_tail(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.pop_list_blocking(key, false, timeout).await
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        match self.data.get(key) {
            None => Ok(0),
            Some(entry) => match entry.value() {
                Value::List(list) => Ok(list.len()),
                other => Err(wrong_type(key, other)),
            },
        }
    }

    async fn zadd(&self, key: &str, score: f64, member: Vec<u8>) -> Result<()> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::SortedSet(Vec::new()));
        match entry.value_mut() {
            Value::SortedSet(members) => {
                members.retain(|(_, m)| *m != member);
                // Same order as Redis: by score, then lexicographically by member.
                let position = members
                    .partition_point(|(s, m)| (*s, m.as_slice()) < (score, member.as_slice()));
                members.insert(position, (score, member));
                Ok(())
            }
            other => Err(wrong_type(key, other)),
        }
    }

    async fn zpop_min(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(None);
        };
        let popped = match entry.value_mut() {
            Value::SortedSet(members) if members.is_empty() => None,
            Value::SortedSet(members) => Some(members.remove(0).1),
            other => return Err(wrong_type(key, other)),
        };
        drop(entry);
        self.data
            .remove_if(key, |_, v| matches!(v, Value::SortedSet(m) if m.is_empty()));
        Ok(popped)
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        match self.data.get(key) {
            None => Ok(0),
            Some(entry) => match entry.value() {
                Value::SortedSet(members) => Ok(members.len()),
                other => Err(wrong_type(key, other)),
            },
        }
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let lock = Value::Lock {
            token: token.to_string(),
            expires_at: Instant::now() + ttl,
        };
        match self.data.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(lock);
                Ok(true)
            }
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live() {
                    Ok(false)
                } else {
                    occupied.insert(lock);
                    Ok(true)
                }
            }
        }
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<bool> {
        let removed = self.data.remove_if(key, |_, v| {
            matches!(v, Value::Lock { token: held, .. } if held == token) && v.is_live()
        });
        Ok(removed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bits_default_to_unset_and_stick_once_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get_bits("b", &[0, 9, 1000]).await.unwrap(), vec![false; 3]);

        store.set_bits("b", &[9, 1000]).await.unwrap();
        assert_eq!(
            store.get_bits("b", &[0, 9, 1000]).await.unwrap(),
            vec![false, true, true]
        );
    }

    #[tokio::test]
    async fn counters_never_go_negative() {
        let store = MemoryStore::new();
        store.decr_counters("c", &[1]).await.unwrap();
        store.incr_counters("c", &[1, 2]).await.unwrap();
        store.decr_counters("c", &[1, 1, 3]).await.unwrap();
        assert_eq!(store.get_counters("c", &[1, 2, 3]).await.unwrap(), vec![0, 1, 0]);
    }

    #[tokio::test]
    async fn lists_pop_from_both_ends_and_vanish_when_empty() {
        let store = MemoryStore::new();
        for value in [b"a", b"b", b"c"] {
            store.push_head("l", value.to_vec()).await.unwrap();
        }
        assert_eq!(store.list_len("l").await.unwrap(), 3);
        assert_eq!(store.pop_tail("l", Duration::ZERO).await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.pop_head("l", Duration::ZERO).await.unwrap(), Some(b"c".to_vec()));
        assert_eq!(store.pop_head("l", Duration::ZERO).await.unwrap(), Some(b"b".to_vec()));
        assert!(!store.exists("l").await.unwrap());
    }

    #[tokio::test]
    async fn blocking_pop_waits_for_a_push() {
        let store = MemoryStore::new();
        let producer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push_head("l", b"late".to_vec()).await.unwrap();
        });
        let popped = store.pop_tail("l", Duration::from_secs(2)).await.unwrap();
        assert_eq!(popped, Some(b"late".to_vec()));

        let empty = store.pop_tail("l", Duration::from_millis(20)).await.unwrap();
        assert_eq!(empty, None);
    }

    #[tokio::test]
    async fn sorted_set_pops_lowest_score_first() {
        let store = MemoryStore::new();
        store.zadd("z", 5.0, b"five".to_vec()).await.unwrap();
        store.zadd("z", 1.0, b"one".to_vec()).await.unwrap();
        store.zadd("z", 3.0, b"three".to_vec()).await.unwrap();
        assert_eq!(store.zcard("z").await.unwrap(), 3);
        assert_eq!(store.zpop_min("z").await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.zpop_min("z").await.unwrap(), Some(b"three".to_vec()));
        assert_eq!(store.zpop_min("z").await.unwrap(), Some(b"five".to_vec()));
        assert_eq!(store.zpop_min("z").await.unwrap(), None);
    }

    #[tokio::test]
    async fn locks_are_exclusive_token_bound_and_expire() {
        let store = MemoryStore::new();
        assert!(store.try_lock("k", "a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.try_lock("k", "b", Duration::from_secs(5)).await.unwrap());
        assert!(!store.unlock("k", "b").await.unwrap());
        assert!(store.unlock("k", "a").await.unwrap());

        assert!(store.try_lock("k", "a", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.try_lock("k", "b", Duration::from_secs(5)).await.unwrap());
        assert!(!store.unlock("k", "a").await.unwrap());
    }

    #[tokio::test]
    async fn type_mismatch_is_a_store_error() {
        let store = MemoryStore::new();
        store.set_bits("k", &[1]).await.unwrap();
        assert!(matches!(
            store.push_head("k", b"x".to_vec()).await,
            Err(FrontierError::Store(_))
        ));
    }
}
