//! Recovery of legacy files into local storage
//!
//! After a dataset is served from the legacy archive, a recovery job copies
//! the file into local storage and points the dataset at it, so later
//! requests are served locally. Jobs are keyed by dataset ID: resubmitting
//! while a job is pending or running is a no-op.

use crate::db::Database;
use crate::types::{DatasetId, Event, RecoveryJob};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Notify, broadcast};

mod worker;

pub use worker::RecoveryWorker;

/// Accepts recovery jobs; submission never fails from the caller's point of view
#[async_trait]
pub trait RecoveryScheduler: Send + Sync {
    /// Submit `job` under `job_key`, collapsing duplicates of a queued key
    async fn schedule(&self, job_key: DatasetId, job: RecoveryJob);
}

/// Scheduler backed by the `recovery_jobs` table and drained by [`RecoveryWorker`]
#[derive(Clone)]
pub struct QueuedRecoveryScheduler {
    db: Arc<Database>,
    wake: Arc<Notify>,
    event_tx: broadcast::Sender<Event>,
}

impl QueuedRecoveryScheduler {
    /// Create a scheduler; `wake` is shared with the worker
    pub fn new(db: Arc<Database>, wake: Arc<Notify>, event_tx: broadcast::Sender<Event>) -> Self {
        Self { db, wake, event_tx }
    }
}

#[async_trait]
impl RecoveryScheduler for QueuedRecoveryScheduler {
    async fn schedule(&self, job_key: DatasetId, job: RecoveryJob) {
        let job = RecoveryJob {
            dataset_id: job_key,
            ..job
        };

        match self.db.enqueue_recovery_job(&job).await {
            Ok(true) => {
                tracing::info!(
                    dataset_id = %job_key,
                    url = %job.source_url,
                    "Recovery job scheduled"
                );
                self.event_tx
                    .send(Event::RecoveryScheduled {
                        dataset_id: job_key,
                        source_url: job.source_url,
                    })
                    .ok();
                self.wake.notify_one();
            }
            Ok(false) => {
                tracing::debug!(dataset_id = %job_key, "Recovery job already queued");
            }
            Err(e) => {
                tracing::error!(dataset_id = %job_key, error = %e, "Failed to schedule recovery job");
            }
        }
    }
}

/// Scheduler that drops every job (recovery disabled)
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledRecoveryScheduler;

#[async_trait]
impl RecoveryScheduler for DisabledRecoveryScheduler {
    async fn schedule(&self, job_key: DatasetId, _job: RecoveryJob) {
        tracing::debug!(dataset_id = %job_key, "Recovery disabled, job dropped");
    }
}
