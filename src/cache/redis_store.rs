// src/cache/redis_store.rs
//! Redis-backed `CacheStore` for deployments that share the cache between
//! processes.
//!
//! Lists use native Redis lists holding one JSON document per element, and
//! every mutation runs in a MULTI pipeline together with its EXPIRE, so
//! concurrent writers get the atomicity the in-memory store cannot offer.

use super::{escape_glob_literals, CacheError, CacheResult, CacheStore, LIST_TTL_SECS};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use redis::{aio::ConnectionManager, AsyncCommands, RedisError};
use serde_json::Value;
use std::fmt;

/// Uses a `ConnectionManager` for automatic reconnection.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
    redis_url: String,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("redis_url", &self.redis_url)
            .field("conn_manager", &"<ConnectionManager instance>")
            .finish()
    }
}

/// Server replied WRONGTYPE: the key holds a plain string, not a list.
fn is_wrong_type(err: &RedisError) -> bool {
    err.code() == Some("WRONGTYPE")
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> CacheResult<Self> {
        info!("Initializing Redis connection manager for URL: {}", redis_url);
        let client = redis::Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to create Redis ConnectionManager: {}", e);
            CacheError::Connection(format!("Failed to create Redis ConnectionManager: {}", e))
        })?;
        info!("Redis ConnectionManager initialized successfully.");
        Ok(Self {
            conn_manager,
            redis_url: redis_url.to_string(),
        })
    }

    async fn push_with_expiry(&self, key: &str, encoded: &str) -> Result<(), RedisError> {
        let mut conn = self.conn_manager.clone();
        redis::pipe()
            .atomic()
            .rpush(key, encoded)
            .ignore()
            .expire(key, LIST_TTL_SECS as i64)
            .ignore()
            .query_async(&mut conn)
            .await
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        debug!("Attempting to GET cache for key: {}", key);
        let mut conn = self.conn_manager.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(e) if is_wrong_type(&e) => Ok(None),
            Err(e) => {
                error!("Redis GET error for key {}: {}", key, e);
                Err(e.into())
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, ttl_secs: u64, value: &str) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        match conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
            Ok(()) => {
                debug!("Cache SETEX success for key: {} with TTL: {}s", key, ttl_secs);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to SETEX key '{}' in Redis: {}", key, e);
                Err(e.into())
            }
        }
    }

    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        Ok(conn
            .keys::<_, Vec<String>>(escape_glob_literals(pattern))
            .await?)
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(keys).await.map_err(|e| {
            error!("Redis DEL error for keys {:?}: {}", keys, e);
            CacheError::from(e)
        })
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<Value>> {
        let mut conn = self.conn_manager.clone();
        let raw = match conn
            .lrange::<_, Vec<String>>(key, start as isize, stop as isize)
            .await
        {
            Ok(raw) => raw,
            Err(e) if is_wrong_type(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(raw
            .iter()
            .filter_map(|item| match serde_json::from_str(item) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Skipping undecodable list element in {}: {}", key, e);
                    None
                }
            })
            .collect())
    }

    async fn list_append(&self, key: &str, value: Value) -> CacheResult<()> {
        let encoded = serde_json::to_string(&value)?;
        match self.push_with_expiry(key, &encoded).await {
            Ok(()) => Ok(()),
            Err(e) if is_wrong_type(&e) => {
                debug!("Replacing non-list value at {}", key);
                self.delete(&[key.to_string()]).await?;
                Ok(self.push_with_expiry(key, &encoded).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        let exists: bool = conn.exists(key).await?;
        if !exists {
            return Ok(());
        }
        let result: Result<(), RedisError> = redis::pipe()
            .atomic()
            .ltrim(key, start as isize, stop as isize)
            .ignore()
            .expire(key, LIST_TTL_SECS as i64)
            .ignore()
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if is_wrong_type(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
