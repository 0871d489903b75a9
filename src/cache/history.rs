//! Bounded audit log of retention sweeps.

use super::{CacheResult, CacheStore};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const CLEANUP_HISTORY_KEY: &str = "notifications:cleanup:history";
pub const CLEANUP_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRecord {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub deleted_count: u64,
}

#[derive(Clone)]
pub struct CleanupHistory {
    cache: Arc<dyn CacheStore>,
}

impl CleanupHistory {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Appends a record, then trims the log to the newest
    /// [`CLEANUP_HISTORY_LIMIT`] entries.
    pub async fn record(&self, record: CleanupRecord) -> CacheResult<()> {
        let value = serde_json::to_value(&record)?;
        self.cache.list_append(CLEANUP_HISTORY_KEY, value).await?;
        self.cache
            .list_trim(CLEANUP_HISTORY_KEY, -CLEANUP_HISTORY_LIMIT, -1)
            .await
    }

    /// Oldest first. Malformed elements are skipped.
    pub async fn recent(&self) -> CacheResult<Vec<CleanupRecord>> {
        let values = self.cache.list_range(CLEANUP_HISTORY_KEY, 0, -1).await?;
        Ok(values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping malformed cleanup record: {}", e);
                    None
                }
            })
            .collect())
    }
}
