//! Database layer for dataset-dl
//!
//! Handles SQLite persistence for datasets, local assets, usage counters,
//! per-user download history and recovery jobs.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`datasets`] - Dataset records and local assets
//! - [`usage`] - Total and monthly download counters
//! - [`history`] - Per-user download history documents
//! - [`recovery`] - Recovery job queue

use crate::types::{Dataset, DatasetId, LegacyOrigin, RecoveryJob, RecoveryStatus};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod datasets;
mod history;
mod migrations;
mod recovery;
mod usage;

/// New dataset to be inserted into the database
#[derive(Debug, Clone, Default)]
pub struct NewDataset {
    /// Explicit ID (datasets are owned by an external catalog); `None` lets SQLite assign one
    pub id: Option<DatasetId>,
    /// Display title
    pub title: String,
    /// Public permalink
    pub permalink: String,
    /// Asset ID of the locally stored file
    pub local_file_ref: Option<i64>,
    /// Cached legacy URL
    pub legacy_file_url: Option<String>,
    /// Legacy origin for archive lookups
    pub legacy_origin: Option<LegacyOrigin>,
}

/// Dataset record from database
#[derive(Debug, Clone, FromRow)]
pub struct DatasetRow {
    /// Dataset ID
    pub id: i64,
    /// Display title
    pub title: String,
    /// Public permalink
    pub permalink: String,
    /// Asset ID of the locally stored file
    pub local_file_ref: Option<i64>,
    /// Cached legacy URL
    pub legacy_file_url: Option<String>,
    /// Legacy site ID
    pub origin_site_id: Option<i64>,
    /// Legacy post ID
    pub origin_post_id: Option<i64>,
}

impl From<DatasetRow> for Dataset {
    fn from(row: DatasetRow) -> Self {
        // Both halves are needed to build a lookup path
        let legacy_origin = match (row.origin_site_id, row.origin_post_id) {
            (Some(origin_site_id), Some(origin_post_id)) => Some(LegacyOrigin {
                origin_site_id,
                origin_post_id,
            }),
            _ => None,
        };

        Dataset {
            id: DatasetId(row.id),
            title: row.title,
            permalink: row.permalink,
            local_file_ref: row.local_file_ref,
            legacy_file_url: row.legacy_file_url.filter(|url| !url.is_empty()),
            legacy_origin,
        }
    }
}

/// Locally stored binary asset
#[derive(Debug, Clone, FromRow)]
pub struct Asset {
    /// Unique database ID
    pub id: i64,
    /// Public URL the asset is served from
    pub url: String,
    /// File on disk backing the asset, if managed by this service
    pub path: Option<String>,
    /// Unix timestamp when the asset was created
    pub created_at: i64,
}

impl Asset {
    /// Path on disk, if any
    pub fn file_path(&self) -> Option<PathBuf> {
        self.path.as_ref().map(PathBuf::from)
    }
}

/// Recovery job record from database
#[derive(Debug, Clone, FromRow)]
pub struct RecoveryJobRow {
    /// Dataset ID (job key)
    pub dataset_id: i64,
    /// Legacy file URL
    pub source_url: String,
    /// Status code (see [`RecoveryStatus`])
    pub status: i32,
    /// Number of times the job was claimed
    pub attempts: i64,
    /// Last failure message
    pub last_error: Option<String>,
    /// Unix timestamp when the job was (re)submitted
    pub scheduled_at: i64,
    /// Unix timestamp of the last state change
    pub updated_at: i64,
}

impl RecoveryJobRow {
    /// Decoded status
    pub fn status(&self) -> RecoveryStatus {
        RecoveryStatus::from_i32(self.status)
    }

    /// Job payload
    pub fn job(&self) -> RecoveryJob {
        RecoveryJob {
            dataset_id: DatasetId(self.dataset_id),
            source_url: self.source_url.clone(),
            scheduled_at: chrono::DateTime::from_timestamp(self.scheduled_at, 0)
                .unwrap_or_else(chrono::Utc::now),
        }
    }
}

/// Database handle for dataset-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
