//! Dataset catalog and local asset operations.

use crate::types::{Dataset, DatasetId};
use crate::{Error, Result};
use std::path::Path;

use super::{Asset, Database, DatasetRow, NewDataset};

impl Database {
    /// Insert a dataset record
    ///
    /// Returns the dataset ID (the explicit one if given, otherwise the assigned rowid).
    pub async fn insert_dataset(&self, dataset: &NewDataset) -> Result<DatasetId> {
        let (site_id, post_id) = match dataset.legacy_origin {
            Some(origin) => (Some(origin.origin_site_id), Some(origin.origin_post_id)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO datasets (
                id, title, permalink, local_file_ref, legacy_file_url,
                origin_site_id, origin_post_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(dataset.id)
        .bind(&dataset.title)
        .bind(&dataset.permalink)
        .bind(dataset.local_file_ref)
        .bind(&dataset.legacy_file_url)
        .bind(site_id)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(dataset
            .id
            .unwrap_or_else(|| DatasetId(result.last_insert_rowid())))
    }

    /// Get a dataset by ID
    pub async fn get_dataset(&self, id: DatasetId) -> Result<Option<Dataset>> {
        let row = sqlx::query_as::<_, DatasetRow>(
            r#"
            SELECT id, title, permalink, local_file_ref, legacy_file_url,
                   origin_site_id, origin_post_id
            FROM datasets
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.map(Dataset::from))
    }

    /// Point a dataset at a locally stored asset
    pub async fn set_local_file_ref(&self, id: DatasetId, asset_id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE datasets SET local_file_ref = ? WHERE id = ?")
            .bind(asset_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("dataset {}", id)));
        }
        Ok(())
    }

    /// Set or clear the cached legacy URL of a dataset
    pub async fn set_legacy_file_url(&self, id: DatasetId, url: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE datasets SET legacy_file_url = ? WHERE id = ?")
            .bind(url)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Register a local asset and return its ID
    pub async fn insert_asset(&self, url: &str, path: Option<&Path>) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query("INSERT INTO assets (url, path, created_at) VALUES (?, ?, ?)")
            .bind(url)
            .bind(path.and_then(|p| p.to_str().map(String::from)))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Get an asset by ID
    pub async fn get_asset(&self, id: i64) -> Result<Option<Asset>> {
        let asset = sqlx::query_as::<_, Asset>(
            "SELECT id, url, path, created_at FROM assets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(asset)
    }
}
