//! Recovery job queue.
//!
//! One row per dataset. A job may only be (re)submitted while no pending or
//! running job exists for the same dataset, and claiming is an atomic
//! `pending -> running` transition, so one dataset never has two executions.

use crate::types::{DatasetId, RecoveryJob, RecoveryStatus};
use crate::{Error, Result};

use super::{Database, RecoveryJobRow};

impl Database {
    /// Submit a recovery job
    ///
    /// Returns `true` if the job was accepted, `false` if one is already
    /// pending or running for the dataset.
    pub async fn enqueue_recovery_job(&self, job: &RecoveryJob) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO recovery_jobs (
                dataset_id, source_url, status, attempts, last_error, scheduled_at, updated_at
            )
            VALUES (?, ?, ?, 0, NULL, ?, ?)
            ON CONFLICT(dataset_id) DO UPDATE SET
                source_url = excluded.source_url,
                status = excluded.status,
                attempts = 0,
                last_error = NULL,
                scheduled_at = excluded.scheduled_at,
                updated_at = excluded.updated_at
            WHERE recovery_jobs.status IN (?, ?)
            "#,
        )
        .bind(job.dataset_id)
        .bind(&job.source_url)
        .bind(RecoveryStatus::Pending.to_i32())
        .bind(job.scheduled_at.timestamp())
        .bind(now)
        .bind(RecoveryStatus::Done.to_i32())
        .bind(RecoveryStatus::Failed.to_i32())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Claim the oldest pending job, marking it running
    pub async fn claim_next_recovery_job(&self) -> Result<Option<RecoveryJobRow>> {
        let now = chrono::Utc::now().timestamp();

        let row = sqlx::query_as::<_, RecoveryJobRow>(
            r#"
            UPDATE recovery_jobs
            SET status = ?, attempts = attempts + 1, updated_at = ?
            WHERE dataset_id = (
                SELECT dataset_id FROM recovery_jobs
                WHERE status = ?
                ORDER BY scheduled_at ASC, dataset_id ASC
                LIMIT 1
            )
            AND status = ?
            RETURNING dataset_id, source_url, status, attempts, last_error, scheduled_at, updated_at
            "#,
        )
        .bind(RecoveryStatus::Running.to_i32())
        .bind(now)
        .bind(RecoveryStatus::Pending.to_i32())
        .bind(RecoveryStatus::Pending.to_i32())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row)
    }

    /// Mark a job done
    pub async fn complete_recovery_job(&self, id: DatasetId) -> Result<()> {
        self.finish_recovery_job(id, RecoveryStatus::Done, None)
            .await
    }

    /// Mark a job failed with the given error
    pub async fn fail_recovery_job(&self, id: DatasetId, error: &str) -> Result<()> {
        self.finish_recovery_job(id, RecoveryStatus::Failed, Some(error))
            .await
    }

    async fn finish_recovery_job(
        &self,
        id: DatasetId,
        status: RecoveryStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "UPDATE recovery_jobs SET status = ?, last_error = ?, updated_at = ? WHERE dataset_id = ?",
        )
        .bind(status.to_i32())
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Put jobs left running by a previous process back in the queue
    ///
    /// Returns the number of jobs requeued.
    pub async fn requeue_running_recovery_jobs(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();

        let result =
            sqlx::query("UPDATE recovery_jobs SET status = ?, updated_at = ? WHERE status = ?")
                .bind(RecoveryStatus::Pending.to_i32())
                .bind(now)
                .bind(RecoveryStatus::Running.to_i32())
                .execute(&self.pool)
                .await
                .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }

    /// Get the job stored for a dataset
    pub async fn get_recovery_job(&self, id: DatasetId) -> Result<Option<RecoveryJobRow>> {
        let row = sqlx::query_as::<_, RecoveryJobRow>(
            r#"
            SELECT dataset_id, source_url, status, attempts, last_error, scheduled_at, updated_at
            FROM recovery_jobs
            WHERE dataset_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row)
    }

    /// Count jobs in a given state
    pub async fn count_recovery_jobs(&self, status: RecoveryStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recovery_jobs WHERE status = ?")
            .bind(status.to_i32())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(count)
    }
}
