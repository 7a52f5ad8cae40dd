//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // Connect with foreign key enforcement and WAL mode
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Each pending migration runs in its own transaction; a failure rolls it back
    /// and leaves earlier versions in place.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?;

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            tracing::info!("Applying database migration v1");
            let mut tx = self.begin_migration().await?;
            Self::migrate_v1(&mut tx).await?;
            Self::record_migration(&mut tx, 1).await?;
            Self::commit_migration(tx, 1).await?;
        }
        if current_version < 2 {
            tracing::info!("Applying database migration v2");
            let mut tx = self.begin_migration().await?;
            Self::migrate_v2(&mut tx).await?;
            Self::record_migration(&mut tx, 2).await?;
            Self::commit_migration(tx, 2).await?;
        }

        Ok(())
    }

    async fn begin_migration(&self) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })
    }

    async fn commit_migration(
        tx: sqlx::Transaction<'static, sqlx::Sqlite>,
        version: i32,
    ) -> Result<()> {
        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to commit migration v{}: {}",
                version, e
            )))
        })?;
        tracing::info!(version, "Database migration complete");
        Ok(())
    }

    /// Migration v1: datasets, assets, usage counters and user history
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            "datasets table",
            r#"
            CREATE TABLE datasets (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                permalink TEXT NOT NULL DEFAULT '',
                local_file_ref INTEGER,
                legacy_file_url TEXT,
                origin_site_id INTEGER,
                origin_post_id INTEGER
            )
            "#,
        )
        .await?;

        Self::execute_ddl(
            conn,
            "assets table",
            r#"
            CREATE TABLE assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                path TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .await?;

        Self::execute_ddl(
            conn,
            "download_totals table",
            r#"
            CREATE TABLE download_totals (
                dataset_id INTEGER PRIMARY KEY,
                total INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .await?;

        Self::execute_ddl(
            conn,
            "monthly_downloads table",
            r#"
            CREATE TABLE monthly_downloads (
                dataset_id INTEGER NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (dataset_id, year, month)
            )
            "#,
        )
        .await?;

        Self::execute_ddl(
            conn,
            "user_history table",
            r#"
            CREATE TABLE user_history (
                user_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .await?;

        Ok(())
    }

    /// Migration v2: recovery job queue
    async fn migrate_v2(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            "recovery_jobs table",
            r#"
            CREATE TABLE recovery_jobs (
                dataset_id INTEGER PRIMARY KEY,
                source_url TEXT NOT NULL,
                status INTEGER NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                scheduled_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .await?;

        Self::execute_ddl(
            conn,
            "recovery_jobs index",
            "CREATE INDEX idx_recovery_jobs_status ON recovery_jobs(status, scheduled_at)",
        )
        .await
    }

    async fn execute_ddl(conn: &mut SqliteConnection, what: &str, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create {}: {}",
                what, e
            )))
        })?;
        Ok(())
    }

    /// Record a migration version
    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
