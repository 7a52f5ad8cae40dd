//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] - get-download and log-download
//! - [`atp`] - ATP acceptance relay
//! - [`stats`] - Download statistics and dataset records
//! - [`system`] - Health, events, OpenAPI

use crate::types::DatasetId;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

mod atp;
mod downloads;
mod stats;
mod system;

pub use atp::*;
pub use downloads::*;
pub use stats::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// `dataset_id` query parameter
#[derive(Debug, Default, Deserialize, Serialize, IntoParams)]
pub struct DatasetIdQuery {
    /// Dataset ID (legacy clients send it in the query string)
    #[param(value_type = Option<i64>)]
    pub dataset_id: Option<DatasetId>,
}

/// Body of POST /datasets/get-download
///
/// Accepts the legacy field names `NONCE` and `uid`.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct DownloadRequest {
    /// Action token for the download action
    #[serde(default, alias = "NONCE")]
    pub token: Option<String>,
    /// Requesting user
    #[serde(default, alias = "uid")]
    pub user_id: Option<String>,
    /// Dataset ID; the query string value is used when absent
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub dataset_id: Option<DatasetId>,
}

/// Response of POST /datasets/get-download
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DownloadResponse {
    /// URL to download the dataset file from
    pub file_url: String,
}

/// Body of POST /datasets/log-download (the token travels in a header)
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct LogDownloadRequest {
    /// User the download is attributed to
    #[serde(default, alias = "uid")]
    pub user_id: Option<String>,
    /// Dataset ID; the query string value is used when absent
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub dataset_id: Option<DatasetId>,
}

/// Body of the ATP endpoints
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct AtpRequest {
    /// Action token for the download action
    #[serde(default, alias = "NONCE")]
    pub token: Option<String>,
    /// User whose acceptance is checked or recorded
    #[serde(default, alias = "uid")]
    pub user_id: Option<String>,
}

/// A dataset with its current (uncached) download counts
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DatasetResource {
    /// The dataset record
    #[serde(flatten)]
    pub dataset: crate::types::Dataset,
    /// Download counts read at request time
    #[serde(rename = "_downloads")]
    pub downloads: crate::types::DownloadStats,
}
