//! Usage store seam
//!
//! [`DatasetStore`] is everything the resolver, the usage logger and the stats
//! cache need from persistence. [`Database`] is the production implementation;
//! tests substitute in-memory stores with injected failures.

use crate::db::Database;
use crate::types::{Dataset, DatasetId, MonthlyLog};
use crate::Result;
use async_trait::async_trait;

/// Persistent per-dataset counters, per-user history and dataset lookups
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Look up a dataset
    async fn dataset(&self, id: DatasetId) -> Result<Option<Dataset>>;

    /// URL of a live local asset
    ///
    /// `None` if the asset does not exist or its backing file is gone.
    async fn asset_url(&self, asset_id: i64) -> Result<Option<String>>;

    /// Total downloads, `None` if never written
    async fn total_downloads(&self, id: DatasetId) -> Result<Option<i64>>;

    /// Overwrite the total download counter
    async fn set_total_downloads(&self, id: DatasetId, total: i64) -> Result<()>;

    /// Sparse month map of one year
    async fn monthly_log(&self, id: DatasetId, year: i32) -> Result<MonthlyLog>;

    /// Persist the month map of one year
    async fn set_monthly_log(&self, id: DatasetId, year: i32, log: &MonthlyLog) -> Result<()>;

    /// Raw history document of a user
    async fn user_history(&self, user_id: &str) -> Result<Option<serde_json::Value>>;

    /// Replace the history document of a user
    async fn set_user_history(&self, user_id: &str, history: &serde_json::Value) -> Result<()>;
}

#[async_trait]
impl DatasetStore for Database {
    async fn dataset(&self, id: DatasetId) -> Result<Option<Dataset>> {
        self.get_dataset(id).await
    }

    async fn asset_url(&self, asset_id: i64) -> Result<Option<String>> {
        let Some(asset) = self.get_asset(asset_id).await? else {
            return Ok(None);
        };

        // Assets without a managed file (external URLs) are always live
        if let Some(path) = asset.file_path()
            && !tokio::fs::try_exists(&path).await.unwrap_or(false)
        {
            tracing::warn!(
                asset_id,
                path = %path.display(),
                "Local asset file is missing"
            );
            return Ok(None);
        }

        Ok(Some(asset.url))
    }

    async fn total_downloads(&self, id: DatasetId) -> Result<Option<i64>> {
        self.get_total_downloads(id).await
    }

    async fn set_total_downloads(&self, id: DatasetId, total: i64) -> Result<()> {
        Database::set_total_downloads(self, id, total).await
    }

    async fn monthly_log(&self, id: DatasetId, year: i32) -> Result<MonthlyLog> {
        self.get_monthly_log(id, year).await
    }

    async fn set_monthly_log(&self, id: DatasetId, year: i32, log: &MonthlyLog) -> Result<()> {
        Database::set_monthly_log(self, id, year, log).await
    }

    async fn user_history(&self, user_id: &str) -> Result<Option<serde_json::Value>> {
        self.get_user_history(user_id).await
    }

    async fn set_user_history(&self, user_id: &str, history: &serde_json::Value) -> Result<()> {
        Database::set_user_history(self, user_id, history).await
    }
}
