// src/cache/mod.rs
//! Key/value cache with TTL and JSON-list operations.
//!
//! One `CacheStore` backs three unrelated consumers that only share the key
//! space by prefix convention:
//!
//! - generation response caching (`generation:response:*`, see [`get_or_compute`])
//! - the cleanup audit log (`notifications:cleanup:history`, see [`CleanupHistory`])
//! - token revocation (`token:blacklist:*`, `user:signUpdate:*`)
//!
//! Every operation returns a [`CacheResult`]. The store never decides whether a
//! failure is fatal; callers do, and in this crate they always fail open.

mod error;
mod history;
mod memory;
mod redis_store;

pub use error::{CacheError, CacheResult};
pub use history::{CleanupHistory, CleanupRecord, CLEANUP_HISTORY_KEY, CLEANUP_HISTORY_LIMIT};
pub use memory::{CacheEntry, MemoryCache};
pub use redis_store::RedisCache;

use crate::error::NewsroomError;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;

/// TTL applied on every list append/trim.
pub const LIST_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Overwrites `key` unconditionally; it expires `ttl_secs` from now.
    async fn set_with_ttl(&self, key: &str, ttl_secs: u64, value: &str) -> CacheResult<()>;

    /// `*` matches any run of characters and every other character is
    /// literal, including `?`, `[`, `]` and `\`. Expired keys may still be
    /// listed.
    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Absent keys are ignored.
    async fn delete(&self, keys: &[String]) -> CacheResult<()>;

    /// Inclusive range with negative indices counted from the end. A missing or
    /// non-list value yields an empty vector.
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<Value>>;

    /// Pushes to the tail and refreshes the TTL to [`LIST_TTL_SECS`].
    async fn list_append(&self, key: &str, value: Value) -> CacheResult<()>;

    /// Keeps only `start..=stop`. No-op for missing or non-list values.
    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> CacheResult<()>;
}

/// Resolves a Redis-style inclusive range against a list of `len` elements.
///
/// Returns `None` when the range selects nothing.
pub fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Matches `key` against a glob where `*` is the only wildcard.
pub fn glob_matches(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if key.len() < first.len() + last.len() || !key.starts_with(first) || !key.ends_with(last) {
        return false;
    }
    let mut rest = &key[first.len()..key.len() - last.len()];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(idx) => rest = &rest[idx + middle.len()..],
            None => return false,
        }
    }
    true
}

/// Escapes everything Redis `KEYS` treats as glob syntax except `*`, so
/// Redis matches the same keys as [`glob_matches`].
pub fn escape_glob_literals(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Read-through caching that never lets the cache fail the caller.
///
/// A hit that decodes as `T` is returned. Anything else (miss, backend error,
/// undecodable entry) runs `compute`; its value is stored best-effort.
pub async fn get_or_compute<T, F, Fut>(
    cache: &dyn CacheStore,
    key: &str,
    ttl_secs: u64,
    compute: F,
) -> Result<T, NewsroomError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, NewsroomError>>,
{
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                debug!("Cache HIT for key: {}", key);
                return Ok(value);
            }
            Err(e) => warn!("Discarding undecodable cache entry {}: {}", key, e),
        },
        Ok(None) => debug!("Cache MISS for key: {}", key),
        Err(e) => warn!("Cache read failed for {}, computing directly: {}", key, e),
    }

    let value = compute().await?;
    match serde_json::to_string(&value) {
        Ok(raw) => {
            if let Err(e) = cache.set_with_ttl(key, ttl_secs, &raw).await {
                warn!("Cache write failed for {}: {}", key, e);
            }
        }
        Err(e) => warn!("Could not serialize value for cache key {}: {}", key, e),
    }
    Ok(value)
}


#[cfg(test)]
mod tests {
    use super::testing::UnavailableCache;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(150, -100, -1), Some((50, 149)));
        assert_eq!(resolve_range(50, -100, -1), Some((0, 49)));
        assert_eq!(resolve_range(5, 1, 2), Some((1, 2)));
        assert_eq!(resolve_range(5, 3, 100), Some((3, 4)));
        assert_eq!(resolve_range(5, 4, 2), None);
        assert_eq!(resolve_range(5, 7, -1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }

    #[test]
    fn test_glob_matches() {
        assert!(glob_matches("*", "anything"));
        assert!(glob_matches("token:blacklist:*", "token:blacklist:abc"));
        assert!(!glob_matches("token:blacklist:*", "user:signUpdate:1"));
        assert!(glob_matches("*:signUpdate:*", "user:signUpdate:42"));
        assert!(glob_matches("generation:*:v1", "generation:abc:v1"));
        assert!(!glob_matches("generation:*:v1", "generation:abc:v2"));
        assert!(glob_matches("exact", "exact"));
        assert!(!glob_matches("exact", "exactly"));
        assert!(!glob_matches("ab*ba", "aba"));
        assert!(glob_matches("q?[1]*", "q?[1]:x"));
        assert!(!glob_matches("q?[1]*", "qa1:x"));
    }

    #[test]
    fn test_escape_glob_literals_keeps_star() {
        assert_eq!(escape_glob_literals("token:blacklist:*"), "token:blacklist:*");
        assert_eq!(escape_glob_literals("q?[1]*"), r"q\?\[1\]*");
        assert_eq!(escape_glob_literals(r"a\b"), r"a\\b");
    }

    #[tokio::test]
    async fn test_get_or_compute_caches_value() {
        let cache = MemoryCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Vec<String> = get_or_compute(&cache, "generation:response:1", 60, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["computed".to_string()])
            })
            .await
            .unwrap();
            assert_eq!(value, vec!["computed".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_fails_open() {
        let cache = UnavailableCache;
        let value: u32 = get_or_compute(&cache, "k", 60, || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_get_or_compute_recomputes_undecodable_entry() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("k", 60, "not json").await.unwrap();
        let value: u32 = get_or_compute(&cache, "k", 60, || async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);
        assert_eq!(cache.get("k").await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_get_or_compute_propagates_compute_error() {
        let cache = MemoryCache::new();
        let result: Result<u32, _> = get_or_compute(&cache, "k", 60, || async {
            Err(NewsroomError::GenerationError("model offline".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
