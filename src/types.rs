//! Core types for dataset-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Unique identifier for a dataset
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct DatasetId(pub i64);

impl DatasetId {
    /// Create a new DatasetId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for DatasetId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<DatasetId> for i64 {
    fn from(id: DatasetId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for DatasetId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DatasetId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for DatasetId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for DatasetId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for DatasetId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Where a dataset was originally published on the legacy multisite
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LegacyOrigin {
    /// Site ID on the legacy network (selects the remote base path)
    pub origin_site_id: i64,
    /// Post ID of the dataset on the legacy site
    pub origin_post_id: i64,
}

/// A downloadable dataset as seen by the resolver and the usage logger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Dataset {
    /// Dataset ID
    pub id: DatasetId,
    /// Display title (snapshotted into user history)
    pub title: String,
    /// Public permalink (snapshotted into user history)
    pub permalink: String,
    /// Asset ID of the locally stored file, if any
    pub local_file_ref: Option<i64>,
    /// Legacy URL cached on the dataset record
    pub legacy_file_url: Option<String>,
    /// Legacy origin used to build the archive lookup path
    pub legacy_origin: Option<LegacyOrigin>,
}

/// Which branch of the resolver produced a file location
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    /// A live asset in local storage
    Local,
    /// The original file on the legacy archive
    LegacyArchive,
}

/// A resolved, deliverable file location
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileLocation {
    /// URL the client should download from
    pub url: String,
    /// Branch that produced the URL
    pub source: FileSource,
}

/// Sparse month (1..=12) to download count map for one year
pub type MonthlyLog = BTreeMap<u32, i64>;

/// Aggregate download statistics for a dataset
///
/// `log` holds one entry per year in the configured range. Months without
/// downloads are absent; callers needing a dense view fill gaps with 0.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DownloadStats {
    /// Total downloads across all time
    pub total: i64,
    /// Year -> month -> count
    #[schema(value_type = Object)]
    pub log: BTreeMap<i32, MonthlyLog>,
}

/// Payload of a recovery job: copy `source_url` into local storage for `dataset_id`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecoveryJob {
    /// Dataset the recovered file belongs to (also the job key)
    pub dataset_id: DatasetId,
    /// Remote URL of the legacy file
    pub source_url: String,
    /// When the job was submitted
    pub scheduled_at: DateTime<Utc>,
}

/// Lifecycle state of a persisted recovery job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStatus {
    /// Waiting for the worker
    Pending,
    /// Claimed by the worker
    Running,
    /// File copied and attached to the dataset
    Done,
    /// Gave up after a permanent error or exhausted retries
    Failed,
}

impl RecoveryStatus {
    /// Convert integer status code to RecoveryStatus enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => RecoveryStatus::Pending,
            1 => RecoveryStatus::Running,
            2 => RecoveryStatus::Done,
            _ => RecoveryStatus::Failed,
        }
    }

    /// Convert RecoveryStatus enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            RecoveryStatus::Pending => 0,
            RecoveryStatus::Running => 1,
            RecoveryStatus::Done => 2,
            RecoveryStatus::Failed => 3,
        }
    }
}

/// Event emitted by the dataset service
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A download request was resolved to a URL
    DownloadResolved {
        /// Dataset ID
        dataset_id: DatasetId,
        /// Branch that produced the URL
        source: FileSource,
    },

    /// A download was logged (each flag reports one step's outcome)
    DownloadLogged {
        /// Dataset ID
        dataset_id: DatasetId,
        /// User the download was attributed to
        user_id: String,
        /// Total counter step succeeded
        total_ok: bool,
        /// Monthly bucket step succeeded
        monthly_ok: bool,
        /// User history step succeeded
        user_ok: bool,
    },

    /// A recovery job was accepted by the scheduler
    RecoveryScheduled {
        /// Dataset ID
        dataset_id: DatasetId,
        /// Legacy file being recovered
        source_url: String,
    },

    /// A recovery job copied the legacy file into local storage
    RecoveryCompleted {
        /// Dataset ID
        dataset_id: DatasetId,
        /// Asset ID now referenced by the dataset
        asset_id: i64,
        /// Public URL of the recovered asset
        url: String,
    },

    /// A recovery job gave up
    RecoveryFailed {
        /// Dataset ID
        dataset_id: DatasetId,
        /// Error message
        error: String,
    },

    /// Service is shutting down
    Shutdown,
}
