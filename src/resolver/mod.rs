//! Download resolution
//!
//! Turns a download request into a URL: a live local asset if the dataset has
//! one, otherwise the original file on the legacy archive (which also queues
//! a recovery job so the next request is served locally).

use crate::error::{ResolveError, ValidationError};
use crate::recovery::RecoveryScheduler;
use crate::store::DatasetStore;
use crate::token::{TokenVerifier, require_token};
use crate::types::{DatasetId, FileLocation, FileSource, RecoveryJob};
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

mod archive;

pub use archive::{LegacyArchive, LegacyArchiveClient};

/// A download request as received from a client
#[derive(Clone, Debug, Default)]
pub struct ResolveRequest {
    /// Requested dataset
    pub dataset_id: Option<DatasetId>,
    /// Action token for the download action
    pub token: Option<String>,
    /// Requesting user
    pub user_id: Option<String>,
}

/// A successfully resolved download
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Dataset that was resolved
    pub dataset_id: DatasetId,
    /// User the download is attributed to
    pub user_id: String,
    /// Where to download the file
    pub location: FileLocation,
}

/// Resolves datasets to file locations
#[derive(Clone)]
pub struct DownloadResolver {
    store: Arc<dyn DatasetStore>,
    archive: Arc<dyn LegacyArchive>,
    scheduler: Arc<dyn RecoveryScheduler>,
    verifier: Arc<dyn TokenVerifier>,
    action: String,
}

impl DownloadResolver {
    /// Create a resolver; tokens are verified against `action`
    pub fn new(
        store: Arc<dyn DatasetStore>,
        archive: Arc<dyn LegacyArchive>,
        scheduler: Arc<dyn RecoveryScheduler>,
        verifier: Arc<dyn TokenVerifier>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            store,
            archive,
            scheduler,
            verifier,
            action: action.into(),
        }
    }

    /// Resolve a download request
    ///
    /// Checks run in order: token, user, dataset ID. Nothing is retried; the
    /// caller may resubmit the whole request.
    pub async fn resolve(&self, request: ResolveRequest, now: DateTime<Utc>) -> Result<Resolved> {
        require_token(self.verifier.as_ref(), request.token.as_deref(), &self.action)?;

        let user_id = request
            .user_id
            .filter(|u| !u.is_empty())
            .ok_or(ValidationError::MissingUser)?;
        let dataset_id = request
            .dataset_id
            .ok_or(ValidationError::MissingField("dataset_id"))?;

        let location = self.locate(dataset_id, now).await?;

        Ok(Resolved {
            dataset_id,
            user_id,
            location,
        })
    }

    /// Find a deliverable file for a dataset, without any request checks
    pub async fn locate(&self, dataset_id: DatasetId, now: DateTime<Utc>) -> Result<FileLocation> {
        let dataset = self
            .store
            .dataset(dataset_id)
            .await?
            .ok_or(ResolveError::DatasetNotFound { dataset_id })?;

        if let Some(asset_id) = dataset.local_file_ref {
            if let Some(url) = self.store.asset_url(asset_id).await? {
                tracing::info!(dataset_id = %dataset_id, url = %url, "Resolved dataset to local file");
                return Ok(FileLocation {
                    url,
                    source: FileSource::Local,
                });
            }
            tracing::warn!(dataset_id = %dataset_id, asset_id, "Local file reference is dead");
        }

        // A cached legacy URL is kept for display only and is never served
        if let Some(cached) = &dataset.legacy_file_url {
            tracing::warn!(
                dataset_id = %dataset_id,
                url = %cached,
                "Dataset has only a cached legacy URL"
            );
            return Err(ResolveError::FailedToResolve { dataset_id }.into());
        }

        let origin = dataset
            .legacy_origin
            .ok_or(ResolveError::NoLegacyOrigin { dataset_id })?;

        let url = match self.archive.fetch_original(dataset_id, origin).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(dataset_id = %dataset_id, error = %e, "Legacy archive lookup failed");
                return Err(e);
            }
        };

        self.scheduler
            .schedule(
                dataset_id,
                RecoveryJob {
                    dataset_id,
                    source_url: url.clone(),
                    scheduled_at: now,
                },
            )
            .await;

        tracing::info!(dataset_id = %dataset_id, url = %url, "Resolved dataset from legacy archive");
        Ok(FileLocation {
            url,
            source: FileSource::LegacyArchive,
        })
    }
}
