//! Per-user download history documents.

use crate::{Error, Result};

use super::Database;

impl Database {
    /// Get the raw history document stored for a user
    pub async fn get_user_history(&self, user_id: &str) -> Result<Option<serde_json::Value>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM user_history WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Sqlx)?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Replace the history document of a user
    pub async fn set_user_history(&self, user_id: &str, history: &serde_json::Value) -> Result<()> {
        let payload = serde_json::to_string(history)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO user_history (user_id, payload, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(())
    }
}
