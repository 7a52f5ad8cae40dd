//! Best-effort download logging
//!
//! A download touches three records in a fixed order: the dataset total,
//! the current month's bucket, then the user's history. Every step runs even
//! when an earlier one failed, and each reports its own outcome.

use crate::error::{ErrorDetail, PersistenceError, ResolveError};
use crate::store::DatasetStore;
use crate::types::DatasetId;
use crate::usage::history::DownloadHistory;
use crate::{Error, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Outcome of each logging step
#[derive(Debug)]
pub struct LogDownloadOutcome {
    /// New total, or why it was not recorded
    pub total: Result<i64>,
    /// New count of the current month, or why it was not recorded
    pub monthly: Result<i64>,
    /// Whether the user's history was updated
    pub user: Result<()>,
}

impl LogDownloadOutcome {
    /// True if every step succeeded
    pub fn is_complete(&self) -> bool {
        self.total.is_ok() && self.monthly.is_ok() && self.user.is_ok()
    }

    /// Serializable per-step view of the outcome
    pub fn report(&self) -> LogDownloadReport {
        LogDownloadReport {
            total: StepReport::from_result(&self.total, |total| Some(*total)),
            monthly: StepReport::from_result(&self.monthly, |count| Some(*count)),
            user: StepReport::from_result(&self.user, |_| None),
        }
    }
}

/// Per-step logging results as returned to API clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LogDownloadReport {
    /// Total counter step
    pub total: StepReport,
    /// Monthly bucket step
    pub monthly: StepReport,
    /// User history step
    pub user: StepReport,
}

/// Result of a single logging step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StepReport {
    /// Whether the step succeeded
    pub ok: bool,
    /// Counter value after the step, for counter steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl StepReport {
    fn from_result<T>(result: &Result<T>, value: impl Fn(&T) -> Option<i64>) -> Self {
        match result {
            Ok(v) => Self {
                ok: true,
                value: value(v),
                error: None,
            },
            Err(e) => Self {
                ok: false,
                value: None,
                error: Some(ErrorDetail::from(e)),
            },
        }
    }
}

/// Records downloads into a [`DatasetStore`]
///
/// Counters are read-modify-write without locking: concurrent downloads of
/// the same dataset may undercount.
#[derive(Clone)]
pub struct UsageLogger {
    store: Arc<dyn DatasetStore>,
}

impl UsageLogger {
    /// Create a logger writing to `store`
    pub fn new(store: Arc<dyn DatasetStore>) -> Self {
        Self { store }
    }

    /// Log one download of `dataset_id` by `user_id` at `now`
    pub async fn log_download(
        &self,
        dataset_id: DatasetId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> LogDownloadOutcome {
        let total = self.increment_total(dataset_id).await;
        if let Err(e) = &total {
            tracing::warn!(dataset_id = %dataset_id, error = %e, "Failed to update total downloads");
        }

        let monthly = self.increment_month(dataset_id, now).await;
        if let Err(e) = &monthly {
            tracing::warn!(dataset_id = %dataset_id, error = %e, "Failed to update monthly downloads");
        }

        let user = self.record_history(dataset_id, user_id, now).await;
        if let Err(e) = &user {
            tracing::warn!(
                dataset_id = %dataset_id,
                user_id,
                error = %e,
                "Failed to update user download history"
            );
        }

        tracing::debug!(
            dataset_id = %dataset_id,
            user_id,
            total_ok = total.is_ok(),
            monthly_ok = monthly.is_ok(),
            user_ok = user.is_ok(),
            "Download logged"
        );

        LogDownloadOutcome {
            total,
            monthly,
            user,
        }
    }

    async fn increment_total(&self, dataset_id: DatasetId) -> Result<i64> {
        let total = self.store.total_downloads(dataset_id).await?.unwrap_or(0) + 1;

        self.store
            .set_total_downloads(dataset_id, total)
            .await
            .map_err(|e| counter_error(dataset_id, "total", e))?;

        Ok(total)
    }

    async fn increment_month(&self, dataset_id: DatasetId, now: DateTime<Utc>) -> Result<i64> {
        let year = now.year();
        let month = now.month();

        let mut log = self.store.monthly_log(dataset_id, year).await?;
        let count = log.entry(month).and_modify(|c| *c += 1).or_insert(1);
        let count = *count;

        self.store
            .set_monthly_log(dataset_id, year, &log)
            .await
            .map_err(|e| counter_error(dataset_id, "monthly", e))?;

        Ok(count)
    }

    async fn record_history(
        &self,
        dataset_id: DatasetId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let stored = self.store.user_history(user_id).await?;
        let (mut history, migrated) = DownloadHistory::from_stored(stored);
        if migrated {
            tracing::info!(user_id, "Migrated download history to v2");
        }

        let dataset = self
            .store
            .dataset(dataset_id)
            .await?
            .ok_or(ResolveError::DatasetNotFound { dataset_id })?;
        history.record(dataset_id, dataset.permalink, dataset.title, now);

        let value = history.to_value()?;
        self.store
            .set_user_history(user_id, &value)
            .await
            .map_err(|e| {
                Error::Persistence(PersistenceError::HistoryPersist {
                    user_id: user_id.to_string(),
                    reason: e.to_string(),
                })
            })
    }
}

fn counter_error(dataset_id: DatasetId, counter: &'static str, source: Error) -> Error {
    Error::Persistence(PersistenceError::CounterPersist {
        dataset_id,
        counter,
        reason: source.to_string(),
    })
}
