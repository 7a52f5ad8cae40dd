//! Download counter operations.
//!
//! Counters are plain read/write values: callers do read-modify-write
//! without locking, so concurrent increments may undercount.

use crate::types::{DatasetId, MonthlyLog};
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Get the total download counter, `None` if never written
    pub async fn get_total_downloads(&self, id: DatasetId) -> Result<Option<i64>> {
        let total: Option<i64> =
            sqlx::query_scalar("SELECT total FROM download_totals WHERE dataset_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Sqlx)?;

        Ok(total)
    }

    /// Overwrite the total download counter
    pub async fn set_total_downloads(&self, id: DatasetId, total: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO download_totals (dataset_id, total) VALUES (?, ?)
            ON CONFLICT(dataset_id) DO UPDATE SET total = excluded.total
            "#,
        )
        .bind(id)
        .bind(total)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Get the sparse month map of one year (empty if no downloads that year)
    pub async fn get_monthly_log(&self, id: DatasetId, year: i32) -> Result<MonthlyLog> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT month, count FROM monthly_downloads
            WHERE dataset_id = ? AND year = ?
            ORDER BY month
            "#,
        )
        .bind(id)
        .bind(year)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows
            .into_iter()
            .filter_map(|(month, count)| u32::try_from(month).ok().map(|m| (m, count)))
            .collect())
    }

    /// Persist the month map of one year
    ///
    /// Every month present in `log` is written; months absent from `log` are left untouched.
    pub async fn set_monthly_log(&self, id: DatasetId, year: i32, log: &MonthlyLog) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Sqlx)?;

        for (month, count) in log {
            sqlx::query(
                r#"
                INSERT INTO monthly_downloads (dataset_id, year, month, count)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(dataset_id, year, month) DO UPDATE SET count = excluded.count
                "#,
            )
            .bind(id)
            .bind(year)
            .bind(*month as i64)
            .bind(*count)
            .execute(&mut *tx)
            .await
            .map_err(Error::Sqlx)?;
        }

        tx.commit().await.map_err(Error::Sqlx)?;
        Ok(())
    }
}
