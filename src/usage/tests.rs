use super::*;
use crate::error::{ErrorKind, PersistenceError};
use crate::test_helpers::{MemoryStore, dataset};
use crate::types::DatasetId;
use crate::Error;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).unwrap()
}

fn store_with_42() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::default().with_dataset(dataset(42)))
}

// -----------------------------------------------------------------------
// UsageLogger
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_first_download_creates_everything() {
    let store = store_with_42();
    let logger = UsageLogger::new(store.clone());
    let now = at(2025, 3, 14);

    let outcome = logger.log_download(DatasetId(42), "u1", now).await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.total.unwrap(), 1);
    assert_eq!(outcome.monthly.unwrap(), 1);
    assert_eq!(store.total(42), Some(1));
    assert_eq!(store.month(42, 2025), [(3, 1)].into_iter().collect());
    assert_eq!(
        store.history("u1").unwrap(),
        json!({
            "v2": {
                "42": {
                    "date": "2025-03-14T09:30:00Z",
                    "url": "https://example.org/dataset/42/",
                    "title": "Dataset 42"
                }
            }
        })
    );
}

#[tokio::test]
async fn test_repeat_downloads_increment_counters() {
    let store = store_with_42();
    let logger = UsageLogger::new(store.clone());

    logger.log_download(DatasetId(42), "u1", at(2025, 3, 1)).await;
    logger.log_download(DatasetId(42), "u2", at(2025, 3, 2)).await;
    let outcome = logger.log_download(DatasetId(42), "u1", at(2025, 4, 1)).await;

    assert_eq!(outcome.total.unwrap(), 3);
    assert_eq!(outcome.monthly.unwrap(), 1);
    assert_eq!(store.month(42, 2025), [(3, 2), (4, 1)].into_iter().collect());

    let history = store.history("u1").unwrap();
    assert_eq!(history["v2"].as_object().unwrap().len(), 1);
    assert_eq!(history["v2"]["42"]["date"], "2025-04-01T09:30:00Z");
}

#[tokio::test]
async fn test_year_rollover_uses_new_bucket() {
    let store = store_with_42();
    let logger = UsageLogger::new(store.clone());

    logger.log_download(DatasetId(42), "u1", at(2024, 12, 31)).await;
    logger.log_download(DatasetId(42), "u1", at(2025, 1, 1)).await;

    assert_eq!(store.month(42, 2024), [(12, 1)].into_iter().collect());
    assert_eq!(store.month(42, 2025), [(1, 1)].into_iter().collect());
}

#[tokio::test]
async fn test_total_failure_does_not_stop_later_steps() {
    let store = store_with_42();
    store.fail_total_write.store(true, Ordering::SeqCst);
    let logger = UsageLogger::new(store.clone());

    let outcome = logger.log_download(DatasetId(42), "u1", at(2025, 3, 14)).await;

    assert!(matches!(
        outcome.total,
        Err(Error::Persistence(PersistenceError::CounterPersist { counter: "total", .. }))
    ));
    assert_eq!(outcome.monthly.as_ref().unwrap(), &1);
    assert!(outcome.user.is_ok());
    assert!(!outcome.is_complete());

    assert_eq!(store.total(42), None);
    assert_eq!(store.month(42, 2025).get(&3), Some(&1));
    assert!(store.history("u1").is_some());
}

#[tokio::test]
async fn test_monthly_failure_is_reported_independently() {
    let store = store_with_42();
    store.fail_monthly_write.store(true, Ordering::SeqCst);
    let logger = UsageLogger::new(store.clone());

    let outcome = logger.log_download(DatasetId(42), "u1", at(2025, 3, 14)).await;

    assert_eq!(outcome.total.as_ref().unwrap(), &1);
    assert!(matches!(
        outcome.monthly,
        Err(Error::Persistence(PersistenceError::CounterPersist { counter: "monthly", .. }))
    ));
    assert!(outcome.user.is_ok());
}

#[tokio::test]
async fn test_history_read_failure_is_returned_as_is() {
    let store = store_with_42();
    store.fail_history_read.store(true, Ordering::SeqCst);
    let logger = UsageLogger::new(store.clone());

    let outcome = logger.log_download(DatasetId(42), "u1", at(2025, 3, 14)).await;

    assert!(outcome.total.is_ok());
    assert!(outcome.monthly.is_ok());
    assert!(matches!(outcome.user, Err(Error::Other(_))));
}

#[tokio::test]
async fn test_history_write_failure() {
    let store = store_with_42();
    store.fail_history_write.store(true, Ordering::SeqCst);
    let logger = UsageLogger::new(store.clone());

    let outcome = logger.log_download(DatasetId(42), "u1", at(2025, 3, 14)).await;

    let err = outcome.user.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(matches!(
        err,
        Error::Persistence(PersistenceError::HistoryPersist { ref user_id, .. }) if user_id == "u1"
    ));
}

#[tokio::test]
async fn test_legacy_history_is_migrated_and_preserved() {
    let store = store_with_42();
    let legacy = json!([17, 23]);
    store
        .histories
        .lock()
        .unwrap()
        .insert("u1".to_string(), legacy.clone());
    let logger = UsageLogger::new(store.clone());

    logger.log_download(DatasetId(42), "u1", at(2025, 3, 14)).await;

    let history = store.history("u1").unwrap();
    assert_eq!(history["v1"], legacy);
    assert!(history["v2"]["42"].is_object());
}

#[tokio::test]
async fn test_logging_into_history_written_by_legacy_site() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(crate::db::Database::new(&dir.path().join("usage.db")).await.unwrap());
    db.insert_dataset(&crate::db::NewDataset {
        id: Some(DatasetId(42)),
        title: "Dataset 42".into(),
        permalink: "https://example.org/dataset/42/".into(),
        ..Default::default()
    })
    .await
    .unwrap();
    let stored = json!({
        "v1": [17],
        "v2": {
            "17": {"date": "2023-11-05 08:15:00", "url": "https://example.org/dataset/17/", "title": "Old"},
            "18": {"date": "", "url": "https://example.org/dataset/18/", "title": "Broken"}
        }
    });
    db.set_user_history("u1", &stored).await.unwrap();
    let logger = UsageLogger::new(db.clone());

    let outcome = logger.log_download(DatasetId(42), "u1", at(2025, 3, 14)).await;

    assert!(outcome.is_complete(), "{:?}", outcome);
    let history = db.get_user_history("u1").await.unwrap().unwrap();
    assert_eq!(history["v1"], json!([17]));
    assert_eq!(history["v2"]["17"]["date"], "2023-11-05T08:15:00Z");
    assert_eq!(history["v2"]["17"]["title"], "Old");
    assert_eq!(history["v2"]["18"], stored["v2"]["18"]);
    assert_eq!(history["v2"]["42"]["date"], "2025-03-14T09:30:00Z");
}

#[tokio::test]
async fn test_unknown_dataset_fails_history_step_only() {
    let store = Arc::new(MemoryStore::default());
    let logger = UsageLogger::new(store.clone());

    let outcome = logger.log_download(DatasetId(404), "u1", at(2025, 3, 14)).await;

    assert!(outcome.total.is_ok());
    assert!(outcome.monthly.is_ok());
    assert_eq!(outcome.user.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(store.history("u1").is_none());
}

#[tokio::test]
async fn test_report_shape() {
    let store = store_with_42();
    store.fail_monthly_write.store(true, Ordering::SeqCst);
    let logger = UsageLogger::new(store.clone());

    let report = logger
        .log_download(DatasetId(42), "u1", at(2025, 3, 14))
        .await
        .report();

    assert!(report.total.ok);
    assert_eq!(report.total.value, Some(1));
    assert!(!report.monthly.ok);
    assert_eq!(
        report.monthly.error.as_ref().unwrap().code,
        "counter_persist_error"
    );
    assert!(report.user.ok);
    assert_eq!(report.user.value, None);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total"], json!({"ok": true, "value": 1}));
    assert_eq!(json["user"], json!({"ok": true}));
}

// -----------------------------------------------------------------------
// StatsCache
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_stats_cover_start_year_through_current_year() {
    let store = store_with_42();
    store.totals.lock().unwrap().insert(DatasetId(42), 5);
    store
        .monthly
        .lock()
        .unwrap()
        .insert((DatasetId(42), 2021), [(6, 5)].into_iter().collect());

    let cache = StatsCache::new(store.clone(), Duration::from_secs(86400), 2020);
    let stats = cache.get_stats(DatasetId(42), at(2023, 7, 1)).await.unwrap();

    assert_eq!(stats.total, 5);
    assert_eq!(stats.log.keys().copied().collect::<Vec<_>>(), vec![2020, 2021, 2022, 2023]);
    assert!(stats.log[&2020].is_empty());
    assert_eq!(stats.log[&2021].get(&6), Some(&5));
    // No zero-fill
    assert_eq!(stats.log[&2021].len(), 1);
}

#[tokio::test]
async fn test_stats_for_unlogged_dataset() {
    let store = Arc::new(MemoryStore::default());
    let cache = StatsCache::new(store, Duration::from_secs(60), 2020);

    let stats = cache.get_stats(DatasetId(1), at(2020, 1, 1)).await.unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.log.len(), 1);
}

#[tokio::test]
async fn test_stats_are_stale_within_ttl_and_fresh_after() {
    let store = store_with_42();
    let logger = UsageLogger::new(store.clone());
    let cache = StatsCache::new(store.clone(), Duration::from_secs(86400), 2020);
    let t0 = at(2025, 3, 14);

    logger.log_download(DatasetId(42), "u1", t0).await;
    let first = cache.get_stats(DatasetId(42), t0).await.unwrap();
    assert_eq!(first.total, 1);

    logger.log_download(DatasetId(42), "u1", t0).await;
    let within = cache
        .get_stats(DatasetId(42), t0 + chrono::Duration::hours(23))
        .await
        .unwrap();
    assert_eq!(within, first);

    let after = cache
        .get_stats(DatasetId(42), t0 + chrono::Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(after.total, 2);
    assert_eq!(after.log[&2025].get(&3), Some(&2));
}

#[tokio::test]
async fn test_cache_hit_skips_store() {
    let store = store_with_42();
    let cache = StatsCache::new(store.clone(), Duration::from_secs(60), 2024);
    let now = at(2025, 1, 1);

    cache.get_stats(DatasetId(42), now).await.unwrap();
    cache.get_stats(DatasetId(42), now).await.unwrap();
    cache.get_stats(DatasetId(42), now).await.unwrap();

    assert_eq!(store.total_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_purge_expired() {
    let store = store_with_42();
    let cache = StatsCache::new(store, Duration::from_secs(60), 2025);
    let now = at(2025, 1, 1);

    cache.get_stats(DatasetId(42), now).await.unwrap();
    cache.get_stats(DatasetId(43), now + chrono::Duration::seconds(30)).await.unwrap();

    assert_eq!(cache.purge_expired(now + chrono::Duration::seconds(60)).await, 1);
    assert_eq!(cache.purge_expired(now + chrono::Duration::seconds(90)).await, 1);
}

#[tokio::test]
async fn test_expired_entries_do_not_accumulate() {
    let store = store_with_42();
    let cache = StatsCache::new(store, Duration::from_secs(60), 2025);
    let now = at(2025, 1, 1);

    for id in 0..1000 {
        cache.get_stats(DatasetId(id), now).await.unwrap();
    }
    assert_eq!(cache.len().await, 1000);

    cache
        .get_stats(DatasetId(42), now + chrono::Duration::days(30))
        .await
        .unwrap();
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_purge_loop_runs_until_cancelled() {
    let store = store_with_42();
    let cache = Arc::new(StatsCache::new(store, Duration::from_secs(60), 2020));
    let long_ago = Utc::now() - chrono::Duration::days(1);
    cache.get_stats(DatasetId(42), long_ago).await.unwrap();
    cache.get_stats(DatasetId(43), long_ago).await.unwrap();

    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(
        cache
            .clone()
            .run_purge_loop(Duration::from_millis(10), cancel.clone()),
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while !cache.is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("expired entries were not purged");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("purge loop did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_huge_ttl_does_not_overflow() {
    let store = store_with_42();
    let cache = StatsCache::new(store.clone(), Duration::from_secs(100_000_000_000_000), 2025);
    let now = at(2025, 3, 14);

    // Falls back to a one-day lifetime
    assert_eq!(cache.get_stats(DatasetId(42), now).await.unwrap().total, 0);
    cache
        .get_stats(DatasetId(42), now + chrono::Duration::hours(12))
        .await
        .unwrap();
    assert_eq!(store.total_reads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.purge_expired(now + chrono::Duration::days(2)).await, 1);
}

#[tokio::test]
async fn test_fresh_stats_bypass_cache() {
    let store = store_with_42();
    let logger = UsageLogger::new(store.clone());
    let cache = StatsCache::new(store.clone(), Duration::from_secs(86400), 2025);
    let now = at(2025, 3, 14);

    assert_eq!(cache.get_stats(DatasetId(42), now).await.unwrap().total, 0);
    logger.log_download(DatasetId(42), "u1", now).await;

    assert_eq!(cache.fresh_stats(DatasetId(42), now).await.unwrap().total, 1);
    assert_eq!(cache.get_stats(DatasetId(42), now).await.unwrap().total, 0);
}
