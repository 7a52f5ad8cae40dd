//! Read-through cache for download statistics
//!
//! Entries expire after a fixed TTL and are never invalidated by writes, so a
//! freshly logged download may not show up until the entry expires. Expired
//! entries are dropped whenever a new one is stored, and periodically by
//! [`StatsCache::run_purge_loop`].

use crate::store::DatasetStore;
use crate::types::{DatasetId, DownloadStats};
use crate::Result;
use chrono::{DateTime, Datelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

struct CacheEntry {
    stats: DownloadStats,
    expires_at: DateTime<Utc>,
}

/// TTL cache in front of the usage store's aggregate view
pub struct StatsCache {
    store: Arc<dyn DatasetStore>,
    ttl: chrono::Duration,
    start_year: i32,
    entries: RwLock<HashMap<DatasetId, CacheEntry>>,
}

impl StatsCache {
    /// Create a cache reading years `start_year..=current year` from `store`
    pub fn new(store: Arc<dyn DatasetStore>, ttl: Duration, start_year: i32) -> Self {
        Self {
            store,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1)),
            start_year,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Statistics of a dataset as of `now`
    ///
    /// Serves a cached copy until it expires; otherwise reads the store and
    /// caches the result. Months without downloads are absent from the log.
    pub async fn get_stats(&self, dataset_id: DatasetId, now: DateTime<Utc>) -> Result<DownloadStats> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&dataset_id)
                && now < entry.expires_at
            {
                return Ok(entry.stats.clone());
            }
        }

        let stats = self.load(dataset_id, now.year()).await?;
        tracing::debug!(dataset_id = %dataset_id, total = stats.total, "Download stats cache refreshed");

        let expires_at = now
            .checked_add_signed(self.ttl)
            .or_else(|| now.checked_add_signed(chrono::Duration::days(1)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(
            dataset_id,
            CacheEntry {
                stats: stats.clone(),
                expires_at,
            },
        );

        Ok(stats)
    }

    /// Statistics read straight from the store, bypassing and not filling the cache
    pub async fn fresh_stats(&self, dataset_id: DatasetId, now: DateTime<Utc>) -> Result<DownloadStats> {
        self.load(dataset_id, now.year()).await
    }

    /// Drop entries that expired before `now`
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    /// Number of cached entries, expired or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if nothing is cached
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop expired entries every `every` until `cancel` fires
    pub async fn run_purge_loop(self: Arc<Self>, every: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = self.purge_expired(Utc::now()).await;
                    if removed > 0 {
                        tracing::debug!(removed, "Purged expired download stats");
                    }
                }
            }
        }
    }

    async fn load(&self, dataset_id: DatasetId, current_year: i32) -> Result<DownloadStats> {
        let total = self.store.total_downloads(dataset_id).await?.unwrap_or(0);

        let mut stats = DownloadStats {
            total,
            ..Default::default()
        };
        for year in self.start_year..=current_year {
            let log = self.store.monthly_log(dataset_id, year).await?;
            stats.log.insert(year, log);
        }

        Ok(stats)
    }
}
