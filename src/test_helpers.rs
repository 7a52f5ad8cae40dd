//! Shared fakes for unit tests.

use crate::config::Config;
use crate::recovery::RecoveryScheduler;
use crate::resolver::LegacyArchive;
use crate::store::DatasetStore;
use crate::token::TokenVerifier;
use crate::service::Collaborators;
use crate::types::{Dataset, DatasetId, Event, LegacyOrigin, MonthlyLog, RecoveryJob};
use crate::{DatasetService, Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Token accepted by [`StaticVerifier`] for any action
pub(crate) const GOOD_TOKEN: &str = "good-token";

/// Build a dataset with the given file references
pub(crate) fn dataset(id: i64) -> Dataset {
    Dataset {
        id: DatasetId(id),
        title: format!("Dataset {}", id),
        permalink: format!("https://example.org/dataset/{}/", id),
        local_file_ref: None,
        legacy_file_url: None,
        legacy_origin: None,
    }
}

/// Dataset 42 from the legacy politics site, post 99
pub(crate) fn legacy_dataset() -> Dataset {
    Dataset {
        legacy_origin: Some(LegacyOrigin {
            origin_site_id: 4,
            origin_post_id: 99,
        }),
        ..dataset(42)
    }
}

fn injected(what: &str) -> Error {
    Error::Other(format!("injected {} failure", what))
}

/// In-memory usage store with switchable failures
#[derive(Default)]
pub(crate) struct MemoryStore {
    pub datasets: Mutex<HashMap<DatasetId, Dataset>>,
    pub assets: Mutex<HashMap<i64, String>>,
    pub totals: Mutex<HashMap<DatasetId, i64>>,
    pub monthly: Mutex<HashMap<(DatasetId, i32), MonthlyLog>>,
    pub histories: Mutex<HashMap<String, serde_json::Value>>,
    pub fail_total_write: AtomicBool,
    pub fail_monthly_write: AtomicBool,
    pub fail_history_read: AtomicBool,
    pub fail_history_write: AtomicBool,
    pub total_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn with_dataset(self, dataset: Dataset) -> Self {
        self.datasets.lock().unwrap().insert(dataset.id, dataset);
        self
    }

    pub fn with_asset(self, asset_id: i64, url: &str) -> Self {
        self.assets.lock().unwrap().insert(asset_id, url.to_string());
        self
    }

    pub fn total(&self, id: i64) -> Option<i64> {
        self.totals.lock().unwrap().get(&DatasetId(id)).copied()
    }

    pub fn month(&self, id: i64, year: i32) -> MonthlyLog {
        self.monthly
            .lock()
            .unwrap()
            .get(&(DatasetId(id), year))
            .cloned()
            .unwrap_or_default()
    }

    pub fn history(&self, user_id: &str) -> Option<serde_json::Value> {
        self.histories.lock().unwrap().get(user_id).cloned()
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn dataset(&self, id: DatasetId) -> Result<Option<Dataset>> {
        Ok(self.datasets.lock().unwrap().get(&id).cloned())
    }

    async fn asset_url(&self, asset_id: i64) -> Result<Option<String>> {
        Ok(self.assets.lock().unwrap().get(&asset_id).cloned())
    }

    async fn total_downloads(&self, id: DatasetId) -> Result<Option<i64>> {
        self.total_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.totals.lock().unwrap().get(&id).copied())
    }

    async fn set_total_downloads(&self, id: DatasetId, total: i64) -> Result<()> {
        if self.fail_total_write.load(Ordering::SeqCst) {
            return Err(injected("total write"));
        }
        self.totals.lock().unwrap().insert(id, total);
        Ok(())
    }

    async fn monthly_log(&self, id: DatasetId, year: i32) -> Result<MonthlyLog> {
        Ok(self
            .monthly
            .lock()
            .unwrap()
            .get(&(id, year))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_monthly_log(&self, id: DatasetId, year: i32, log: &MonthlyLog) -> Result<()> {
        if self.fail_monthly_write.load(Ordering::SeqCst) {
            return Err(injected("monthly write"));
        }
        self.monthly.lock().unwrap().insert((id, year), log.clone());
        Ok(())
    }

    async fn user_history(&self, user_id: &str) -> Result<Option<serde_json::Value>> {
        if self.fail_history_read.load(Ordering::SeqCst) {
            return Err(injected("history read"));
        }
        Ok(self.histories.lock().unwrap().get(user_id).cloned())
    }

    async fn set_user_history(&self, user_id: &str, history: &serde_json::Value) -> Result<()> {
        if self.fail_history_write.load(Ordering::SeqCst) {
            return Err(injected("history write"));
        }
        self.histories
            .lock()
            .unwrap()
            .insert(user_id.to_string(), history.clone());
        Ok(())
    }
}

/// Archive answering every lookup with a fixed result
pub(crate) struct FakeArchive {
    response: std::result::Result<String, fn(DatasetId) -> Error>,
    pub calls: AtomicUsize,
}

impl FakeArchive {
    pub fn returning(url: &str) -> Self {
        Self {
            response: Ok(url.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: fn(DatasetId) -> Error) -> Self {
        Self {
            response: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LegacyArchive for FakeArchive {
    async fn fetch_original(&self, dataset_id: DatasetId, _origin: LegacyOrigin) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok(url) => Ok(url.clone()),
            Err(make) => Err(make(dataset_id)),
        }
    }
}

/// Scheduler that records submissions instead of running them
#[derive(Default)]
pub(crate) struct RecordingScheduler {
    pub jobs: Mutex<Vec<(DatasetId, RecoveryJob)>>,
}

impl RecordingScheduler {
    pub fn submitted(&self) -> Vec<(DatasetId, RecoveryJob)> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecoveryScheduler for RecordingScheduler {
    async fn schedule(&self, job_key: DatasetId, job: RecoveryJob) {
        self.jobs.lock().unwrap().push((job_key, job));
    }
}

/// Verifier accepting only [`GOOD_TOKEN`]
pub(crate) struct StaticVerifier;

impl TokenVerifier for StaticVerifier {
    fn verify(&self, token: &str, _action: &str) -> bool {
        token == GOOD_TOKEN
    }
}

/// Config rooted in a temp dir, with recovery off and a token secret set
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.recovery.storage_dir = dir.join("datasets");
    config.recovery.enabled = false;
    config.auth.token_secret = Some("test-secret".to_string());
    config
}

/// Service backed by a fresh database in a temp dir (keep the dir alive)
pub(crate) async fn create_test_service() -> (DatasetService, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let service = DatasetService::new(test_config(dir.path())).await.unwrap();
    (service, dir)
}

/// Service over a fresh database whose legacy archive is `archive`
pub(crate) async fn create_test_service_with_archive(
    archive: FakeArchive,
) -> (DatasetService, Arc<FakeArchive>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let archive = Arc::new(archive);
    let mut collaborators = Collaborators::from_config(&config).unwrap();
    collaborators.archive = archive.clone();
    let service = DatasetService::with_collaborators(config, collaborators)
        .await
        .unwrap();
    (service, archive, dir)
}

/// Wait (up to 5 seconds) for the first event matching `pred`
pub(crate) async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Token the [`test_config`] service accepts for `action`
pub(crate) fn token_for(action: &str) -> String {
    crate::token::DigestTokenVerifier::new(Some("test-secret".to_string()))
        .issue(action)
        .unwrap()
}
