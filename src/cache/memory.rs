// src/cache/memory.rs
//! In-process `CacheStore` on a `DashMap`.
//!
//! Expiry is lazy: nothing sweeps the map, reads notice stale entries and
//! evict them. Lists are stored as JSON arrays inside an ordinary entry, so a
//! list mutation is a parse/modify/serialize cycle under the entry's shard lock.

use super::{glob_matches, resolve_range, CacheResult, CacheStore, LIST_TTL_SECS};
use crate::utils::{Clock, SystemClock};
use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: String,
    pub expires_at_millis: i64,
}

impl CacheEntry {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at_millis <= now_millis
    }
}

pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ttl_deadline(&self, now_millis: i64, ttl_secs: u64) -> i64 {
        let ttl_millis = i64::try_from(ttl_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        now_millis.saturating_add(ttl_millis)
    }

    /// The live list stored at `key`, or `None` if absent, expired or corrupt.
    fn read_list(&self, key: &str, now_millis: i64) -> Option<Vec<Value>> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(now_millis) {
            return None;
        }
        match serde_json::from_str::<Vec<Value>>(&entry.value) {
            Ok(list) => Some(list),
            Err(e) => {
                debug!("Value at {} is not a list: {}", key, e);
                None
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = self.clock.now_millis();
        let found = self
            .entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.is_expired(now)));

        match found {
            Some((value, false)) => Ok(Some(value)),
            Some((_, true)) => {
                debug!("Evicting expired cache key: {}", key);
                self.entries.remove_if(key, |_, entry| entry.is_expired(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, ttl_secs: u64, value: &str) -> CacheResult<()> {
        let now = self.clock.now_millis();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at_millis: self.ttl_deadline(now, ttl_secs),
            },
        );
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|item| glob_matches(pattern, item.key()))
            .map(|item| item.key().clone())
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<Value>> {
        let now = self.clock.now_millis();
        let list = match self.read_list(key, now) {
            Some(list) => list,
            None => return Ok(Vec::new()),
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list[from..=to].to_vec(),
            None => Vec::new(),
        })
    }

    async fn list_append(&self, key: &str, value: Value) -> CacheResult<()> {
        let now = self.clock.now_millis();
        let expires_at_millis = self.ttl_deadline(now, LIST_TTL_SECS);

        let mut slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry {
                value: "[]".to_string(),
                expires_at_millis,
            });

        let mut list: Vec<Value> = if slot.is_expired(now) {
            Vec::new()
        } else {
            serde_json::from_str(&slot.value).unwrap_or_else(|e| {
                debug!("Replacing non-list value at {}: {}", key, e);
                Vec::new()
            })
        };
        list.push(value);

        slot.value = serde_json::to_string(&list)?;
        slot.expires_at_millis = expires_at_millis;
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> CacheResult<()> {
        let now = self.clock.now_millis();
        let mut slot = match self.entries.get_mut(key) {
            Some(slot) => slot,
            None => return Ok(()),
        };
        if slot.is_expired(now) {
            return Ok(());
        }
        let list: Vec<Value> = match serde_json::from_str(&slot.value) {
            Ok(list) => list,
            Err(_) => return Ok(()),
        };

        let kept = match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list[from..=to].to_vec(),
            None => Vec::new(),
        };
        slot.value = serde_json::to_string(&kept)?;
        slot.expires_at_millis = self.ttl_deadline(now, LIST_TTL_SECS);
        Ok(())
    }
}
