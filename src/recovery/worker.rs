//! Background executor for recovery jobs.

use crate::config::RecoveryConfig;
use crate::db::{Database, RecoveryJobRow};
use crate::retry::fetch_with_retry;
use crate::types::{DatasetId, Event};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Copies legacy files into local storage, one job at a time
///
/// Jobs interrupted by shutdown stay `running` in the database and are put
/// back in the queue when the next worker starts, so every job runs at
/// least once.
pub struct RecoveryWorker {
    db: Arc<Database>,
    client: reqwest::Client,
    config: RecoveryConfig,
    wake: Arc<Notify>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl RecoveryWorker {
    /// Create a worker; `wake` is shared with the scheduler
    pub fn new(
        db: Arc<Database>,
        config: RecoveryConfig,
        wake: Arc<Notify>,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;

        Ok(Self {
            db,
            client,
            config,
            wake,
            event_tx,
            cancel,
        })
    }

    /// Run the worker loop on a tokio task until the cancellation token fires
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        match self.db.requeue_running_recovery_jobs().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "Requeued interrupted recovery jobs"),
            Err(e) => tracing::error!(error = %e, "Failed to requeue interrupted recovery jobs"),
        }

        tracing::info!("Recovery worker started");

        loop {
            self.drain().await;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!("Recovery worker stopped");
    }

    /// Process pending jobs until the queue is empty or shutdown is requested
    async fn drain(&self) {
        while !self.cancel.is_cancelled() {
            let row = match self.db.claim_next_recovery_job().await {
                Ok(Some(row)) => row,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim recovery job");
                    return;
                }
            };

            let dataset_id = DatasetId(row.dataset_id);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(dataset_id = %dataset_id, "Recovery job interrupted by shutdown");
                    return;
                }
                result = self.run_job(&row) => self.finish(dataset_id, result).await,
            }
        }
    }

    async fn finish(&self, dataset_id: DatasetId, result: Result<(i64, String)>) {
        match result {
            Ok((asset_id, url)) => {
                if let Err(e) = self.db.complete_recovery_job(dataset_id).await {
                    tracing::error!(dataset_id = %dataset_id, error = %e, "Failed to mark recovery job done");
                }
                tracing::info!(dataset_id = %dataset_id, asset_id, url = %url, "Dataset file recovered");
                self.event_tx
                    .send(Event::RecoveryCompleted {
                        dataset_id,
                        asset_id,
                        url,
                    })
                    .ok();
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(db_err) = self.db.fail_recovery_job(dataset_id, &message).await {
                    tracing::error!(dataset_id = %dataset_id, error = %db_err, "Failed to mark recovery job failed");
                }
                tracing::error!(dataset_id = %dataset_id, error = %message, "Dataset recovery failed");
                self.event_tx
                    .send(Event::RecoveryFailed {
                        dataset_id,
                        error: message,
                    })
                    .ok();
            }
        }
    }

    /// Fetch the file, register it as an asset and attach it to the dataset
    async fn run_job(&self, row: &RecoveryJobRow) -> Result<(i64, String)> {
        let job = row.job();
        let dataset_id = job.dataset_id;
        let file_name = file_name_for(&job.source_url, dataset_id);

        tracing::info!(
            dataset_id = %dataset_id,
            url = %job.source_url,
            attempt = row.attempts,
            "Recovering dataset file"
        );

        let dir = self.config.storage_dir.join(dataset_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let target = dir.join(&file_name);

        fetch_with_retry(&self.config.retry, || self.download(&job.source_url, &target)).await?;

        let public_url = format!(
            "{}/{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            dataset_id,
            urlencoding::encode(&file_name)
        );
        let asset_id = self.db.insert_asset(&public_url, Some(&target)).await?;
        self.db.set_local_file_ref(dataset_id, asset_id).await?;

        Ok((asset_id, public_url))
    }

    /// Stream `url` into `target` via a sibling `.part` file
    ///
    /// The `.part` file is removed when the transfer fails.
    async fn download(&self, url: &str, target: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let partial = partial_path(target);
        match write_body(response, &partial, target).await {
            Ok(written) => {
                tracing::debug!(url, bytes = written, path = %target.display(), "Downloaded legacy file");
                Ok(written)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&partial).await
                    && rm.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(path = %partial.display(), error = %rm, "Failed to remove partial file");
                }
                Err(e)
            }
        }
    }
}

async fn write_body(mut response: reqwest::Response, partial: &Path, target: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(partial, target).await?;
    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

/// Local file name for a recovered URL: its last path segment, decoded and
/// stripped of anything that could escape the dataset directory
fn file_name_for(source_url: &str, dataset_id: DatasetId) -> String {
    let segment = url::Url::parse(source_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    let decoded = urlencoding::decode(&segment)
        .map(|s| s.into_owned())
        .unwrap_or(segment);

    let cleaned: String = decoded
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();

    if cleaned.is_empty() {
        format!("dataset-{}", dataset_id)
    } else {
        cleaned.to_string()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_for("https://legacy.example/files/2019/ATP%20W1.zip", DatasetId(1)),
            "ATP W1.zip"
        );
        assert_eq!(
            file_name_for("https://legacy.example/files/data.sav?ver=2", DatasetId(1)),
            "data.sav"
        );
    }

    #[test]
    fn test_file_name_fallbacks() {
        assert_eq!(file_name_for("https://legacy.example/", DatasetId(7)), "dataset-7");
        assert_eq!(file_name_for("not a url", DatasetId(7)), "dataset-7");
        assert_eq!(
            file_name_for("https://legacy.example/..%2F..%2Fetc", DatasetId(7)),
            "etc"
        );
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/srv/datasets/1/data.zip")),
            PathBuf::from("/srv/datasets/1/data.zip.part")
        );
    }
}
