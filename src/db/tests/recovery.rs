use crate::db::*;
use crate::types::{DatasetId, RecoveryJob, RecoveryStatus};
use tempfile::NamedTempFile;

fn job(id: i64, url: &str) -> RecoveryJob {
    RecoveryJob {
        dataset_id: DatasetId(id),
        source_url: url.to_string(),
        scheduled_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_enqueue_deduplicates_pending_job() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(db.enqueue_recovery_job(&job(42, "https://x/a.zip")).await.unwrap());
    assert!(!db.enqueue_recovery_job(&job(42, "https://x/b.zip")).await.unwrap());

    let row = db.get_recovery_job(DatasetId(42)).await.unwrap().unwrap();
    assert_eq!(row.status(), RecoveryStatus::Pending);
    assert_eq!(row.source_url, "https://x/a.zip");
    assert_eq!(db.count_recovery_jobs(RecoveryStatus::Pending).await.unwrap(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_running_job_blocks_resubmission() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue_recovery_job(&job(42, "https://x/a.zip")).await.unwrap();
    let claimed = db.claim_next_recovery_job().await.unwrap().unwrap();
    assert_eq!(claimed.dataset_id, 42);
    assert_eq!(claimed.status(), RecoveryStatus::Running);
    assert_eq!(claimed.attempts, 1);

    assert!(!db.enqueue_recovery_job(&job(42, "https://x/a.zip")).await.unwrap());
    assert!(db.claim_next_recovery_job().await.unwrap().is_none());

    db.close().await;
}

#[tokio::test]
async fn test_finished_jobs_can_be_resubmitted() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue_recovery_job(&job(1, "https://x/1.zip")).await.unwrap();
    db.enqueue_recovery_job(&job(2, "https://x/2.zip")).await.unwrap();
    db.claim_next_recovery_job().await.unwrap().unwrap();
    db.claim_next_recovery_job().await.unwrap().unwrap();

    db.complete_recovery_job(DatasetId(1)).await.unwrap();
    db.fail_recovery_job(DatasetId(2), "HTTP 404").await.unwrap();

    let failed = db.get_recovery_job(DatasetId(2)).await.unwrap().unwrap();
    assert_eq!(failed.status(), RecoveryStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("HTTP 404"));

    assert!(db.enqueue_recovery_job(&job(1, "https://x/1b.zip")).await.unwrap());
    assert!(db.enqueue_recovery_job(&job(2, "https://x/2b.zip")).await.unwrap());

    let requeued = db.get_recovery_job(DatasetId(2)).await.unwrap().unwrap();
    assert_eq!(requeued.status(), RecoveryStatus::Pending);
    assert_eq!(requeued.attempts, 0);
    assert_eq!(requeued.last_error, None);
    assert_eq!(requeued.source_url, "https://x/2b.zip");

    db.close().await;
}

#[tokio::test]
async fn test_claim_order_is_oldest_first() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut newer = job(1, "https://x/1.zip");
    newer.scheduled_at = chrono::Utc::now();
    let mut older = job(2, "https://x/2.zip");
    older.scheduled_at = newer.scheduled_at - chrono::Duration::minutes(5);

    db.enqueue_recovery_job(&newer).await.unwrap();
    db.enqueue_recovery_job(&older).await.unwrap();

    let first = db.claim_next_recovery_job().await.unwrap().unwrap();
    assert_eq!(first.dataset_id, 2);
    assert_eq!(first.job().source_url, "https://x/2.zip");

    db.close().await;
}

#[tokio::test]
async fn test_requeue_running_jobs() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue_recovery_job(&job(42, "https://x/a.zip")).await.unwrap();
    db.claim_next_recovery_job().await.unwrap().unwrap();

    assert_eq!(db.requeue_running_recovery_jobs().await.unwrap(), 1);
    let row = db.get_recovery_job(DatasetId(42)).await.unwrap().unwrap();
    assert_eq!(row.status(), RecoveryStatus::Pending);

    let reclaimed = db.claim_next_recovery_job().await.unwrap().unwrap();
    assert_eq!(reclaimed.attempts, 2);

    db.close().await;
}
