//! Legacy archive client
//!
//! Looks up the original download URL of a dataset on the legacy multisite's
//! REST API. One GET per lookup, no retries.

use crate::config::ArchiveConfig;
use crate::error::ResolveError;
use crate::types::{DatasetId, LegacyOrigin};
use crate::{Error, Result};
use async_trait::async_trait;

/// Source of original dataset files
#[async_trait]
pub trait LegacyArchive: Send + Sync {
    /// Find the original file URL of `dataset_id`, published as `origin` on the legacy network
    async fn fetch_original(&self, dataset_id: DatasetId, origin: LegacyOrigin) -> Result<String>;
}

/// HTTP client for the legacy archive's REST API
#[derive(Clone)]
pub struct LegacyArchiveClient {
    client: reqwest::Client,
    config: ArchiveConfig,
}

impl LegacyArchiveClient {
    /// Create a client; requests time out after `config.timeout`
    pub fn new(config: ArchiveConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Build the lookup URL for a dataset
    ///
    /// The dataset's route is rewritten by replacing every occurrence of the
    /// dataset ID with the original post ID, anywhere in the route. Unknown
    /// site IDs get an empty site path.
    pub fn lookup_url(&self, dataset_id: DatasetId, origin: LegacyOrigin) -> String {
        let site_path = self
            .config
            .site_paths
            .get(&origin.origin_site_id)
            .map(String::as_str)
            .unwrap_or("");

        let route = format!("{}/{}", self.config.route_base, dataset_id)
            .replace(&dataset_id.to_string(), &origin.origin_post_id.to_string());

        format!(
            "{}{}{}{}",
            self.config.base_url.trim_end_matches('/'),
            site_path,
            self.config.rest_prefix,
            route
        )
    }
}

#[async_trait]
impl LegacyArchive for LegacyArchiveClient {
    async fn fetch_original(&self, dataset_id: DatasetId, origin: LegacyOrigin) -> Result<String> {
        let url = self.lookup_url(dataset_id, origin);
        let unavailable = |reason: String| {
            Error::Resolve(ResolveError::ArchiveUnavailable { dataset_id, reason })
        };

        tracing::debug!(dataset_id = %dataset_id, url = %url, "Querying legacy archive");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {} from {}", status.as_u16(), url)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid JSON: {}", e)))?;

        match body.get(&self.config.media_field).and_then(|v| v.as_str()) {
            Some(media_url) if !media_url.is_empty() => Ok(media_url.to_string()),
            _ => Err(Error::Resolve(ResolveError::ArchiveMediaMissing { dataset_id })),
        }
    }
}
