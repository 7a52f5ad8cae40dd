//! The dataset service facade.
//!
//! `DatasetService` wires the store, resolver, usage logger, stats cache and
//! recovery worker together and is what the REST API and embedders talk to.
//! Its operations are split by concern:
//! - this file: construction, events and the request-facing operations
//! - [`lifecycle`] - graceful shutdown

mod lifecycle;


use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, ResolveError, ValidationError};
use crate::identity::{self, IdentityService};
use crate::recovery::{
    DisabledRecoveryScheduler, QueuedRecoveryScheduler, RecoveryScheduler, RecoveryWorker,
};
use crate::resolver::{DownloadResolver, LegacyArchive, LegacyArchiveClient, ResolveRequest, Resolved};
use crate::store::DatasetStore;
use crate::token::{DigestTokenVerifier, TokenVerifier, require_token};
use crate::types::{Dataset, DatasetId, DownloadStats, Event};
use crate::usage::{DownloadHistory, LogDownloadOutcome, LogDownloadReport, StatsCache, UsageLogger};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify, broadcast};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How often expired download stats are dropped from the cache
const STATS_PURGE_INTERVAL: Duration = Duration::from_secs(600);

/// A log-download request as received from a client
#[derive(Clone, Debug, Default)]
pub struct LogRequest {
    /// Session token, verified against `auth.session_action`
    pub session_token: Option<String>,
    /// Downloaded dataset
    pub dataset_id: Option<DatasetId>,
    /// User the download is attributed to
    pub user_id: Option<String>,
}

/// External collaborators of the service
///
/// [`Collaborators::from_config`] builds the HTTP-backed defaults; embedders
/// and tests can substitute their own.
#[derive(Clone)]
pub struct Collaborators {
    /// Legacy archive the resolver falls back to
    pub archive: Arc<dyn LegacyArchive>,
    /// Identity service holding ATP acceptance state
    pub identity: Arc<dyn IdentityService>,
    /// Verifier for action and session tokens
    pub verifier: Arc<dyn TokenVerifier>,
}

impl Collaborators {
    /// Default collaborators for `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            archive: Arc::new(LegacyArchiveClient::new(config.archive.clone())?),
            identity: identity::from_config(&config.identity)?,
            verifier: Arc::new(DigestTokenVerifier::new(config.auth.token_secret.clone())),
        })
    }
}

/// Main service instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DatasetService {
    /// Database instance for persistence
    /// Public for integration tests and embedders that manage the catalog
    pub db: Arc<Database>,
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    resolver: DownloadResolver,
    logger: UsageLogger,
    stats: Arc<StatsCache>,
    identity: Arc<dyn IdentityService>,
    verifier: Arc<dyn TokenVerifier>,
    /// Stops the recovery worker and the stats purge loop
    cancel: CancellationToken,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Background logging and housekeeping tasks, awaited on shutdown
    tasks: TaskTracker,
    /// Set to false during shutdown
    accepting_new: Arc<AtomicBool>,
}

impl DatasetService {
    /// Create a service with the default collaborators for `config`
    ///
    /// Opens (or creates) the database, runs migrations and, when recovery is
    /// enabled, starts the recovery worker.
    pub async fn new(config: Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::with_collaborators(config, collaborators).await
    }

    /// Create a service with caller-supplied collaborators
    pub async fn with_collaborators(config: Config, collaborators: Collaborators) -> Result<Self> {
        if config.recovery.enabled {
            tokio::fs::create_dir_all(&config.recovery.storage_dir)
                .await
                .map_err(|e| {
                    Error::Io(std::io::Error::new(
                        e.kind(),
                        format!(
                            "Failed to create storage directory '{}': {}",
                            config.recovery.storage_dir.display(),
                            e
                        ),
                    ))
                })?;
        }

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let store: Arc<dyn DatasetStore> = db.clone();

        // Buffer of 1000 events per subscriber before it starts lagging
        let (event_tx, _rx) = broadcast::channel(1000);

        let cancel = CancellationToken::new();
        let wake = Arc::new(Notify::new());

        let (scheduler, worker): (Arc<dyn RecoveryScheduler>, Option<JoinHandle<()>>) =
            if config.recovery.enabled {
                let worker = RecoveryWorker::new(
                    db.clone(),
                    config.recovery.clone(),
                    wake.clone(),
                    event_tx.clone(),
                    cancel.child_token(),
                )?;
                let scheduler = QueuedRecoveryScheduler::new(db.clone(), wake, event_tx.clone());
                (Arc::new(scheduler), Some(worker.spawn()))
            } else {
                tracing::info!("Recovery disabled, legacy files will not be copied locally");
                (Arc::new(DisabledRecoveryScheduler), None)
            };

        let resolver = DownloadResolver::new(
            store.clone(),
            collaborators.archive,
            scheduler,
            collaborators.verifier.clone(),
            config.auth.download_action.clone(),
        );
        let logger = UsageLogger::new(store.clone());
        let stats = Arc::new(StatsCache::new(
            store,
            config.stats.ttl,
            config.stats.start_year,
        ));

        let tasks = TaskTracker::new();
        tasks.spawn(
            stats
                .clone()
                .run_purge_loop(STATS_PURGE_INTERVAL, cancel.child_token()),
        );

        if config.auth.token_secret.is_none() {
            tracing::warn!("No token secret configured, every token will be rejected");
        }
        if config.api.editor_key.is_none() {
            tracing::warn!("No editor key configured, download-stats is open to anyone");
        }

        tracing::info!(
            database = %config.persistence.database_path.display(),
            recovery = config.recovery.enabled,
            log_on_resolve = config.logging.log_on_resolve,
            "Dataset service started"
        );

        Ok(Self {
            db,
            config: Arc::new(config),
            event_tx,
            resolver,
            logger,
            stats,
            identity: collaborators.identity,
            verifier: collaborators.verifier,
            cancel,
            worker: Arc::new(Mutex::new(worker)),
            tasks,
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to service events
    ///
    /// Each subscriber receives every event independently. A subscriber more
    /// than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration the service was built with
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No receivers is fine
        self.event_tx.send(event).ok();
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    /// Resolve a download request to a file URL
    ///
    /// With `logging.log_on_resolve` set, the download is logged on a
    /// background task; the URL is returned without waiting for it.
    /// [`DatasetService::shutdown`] waits for pending logging tasks.
    pub async fn resolve(&self, request: ResolveRequest) -> Result<Resolved> {
        self.ensure_accepting()?;

        let resolved = self.resolver.resolve(request, Utc::now()).await?;
        self.emit_event(Event::DownloadResolved {
            dataset_id: resolved.dataset_id,
            source: resolved.location.source,
        });

        if self.config.logging.log_on_resolve {
            let service = self.clone();
            let dataset_id = resolved.dataset_id;
            let user_id = resolved.user_id.clone();
            self.tasks.spawn(async move {
                service.record_download(dataset_id, &user_id).await;
            });
        }

        Ok(resolved)
    }

    /// Log a download on behalf of a client holding a session token
    ///
    /// Checks run in order: session token, user, dataset ID. Once they pass,
    /// the returned report carries one result per logging step; a failed step
    /// does not make the call fail.
    pub async fn log_download(&self, request: LogRequest) -> Result<LogDownloadReport> {
        self.ensure_accepting()?;

        require_token(
            self.verifier.as_ref(),
            request.session_token.as_deref(),
            &self.config.auth.session_action,
        )?;
        let user_id = request
            .user_id
            .filter(|u| !u.is_empty())
            .ok_or(ValidationError::MissingUser)?;
        let dataset_id = request
            .dataset_id
            .ok_or(ValidationError::MissingField("dataset_id"))?;

        Ok(self.record_download(dataset_id, &user_id).await.report())
    }

    /// Log a download without any request checks
    pub async fn record_download(&self, dataset_id: DatasetId, user_id: &str) -> LogDownloadOutcome {
        let outcome = self.logger.log_download(dataset_id, user_id, Utc::now()).await;

        self.emit_event(Event::DownloadLogged {
            dataset_id,
            user_id: user_id.to_string(),
            total_ok: outcome.total.is_ok(),
            monthly_ok: outcome.monthly.is_ok(),
            user_ok: outcome.user.is_ok(),
        });

        outcome
    }

    /// Cached download statistics of a dataset
    pub async fn get_stats(&self, dataset_id: DatasetId) -> Result<DownloadStats> {
        self.stats.get_stats(dataset_id, Utc::now()).await
    }

    /// Uncached download statistics of a dataset
    pub async fn download_log(&self, dataset_id: DatasetId) -> Result<DownloadStats> {
        self.stats.fresh_stats(dataset_id, Utc::now()).await
    }

    /// Drop expired stats cache entries, returning how many were removed
    pub async fn purge_stats_cache(&self) -> usize {
        self.stats.purge_expired(Utc::now()).await
    }

    /// A dataset record
    pub async fn dataset(&self, dataset_id: DatasetId) -> Result<Dataset> {
        self.db
            .get_dataset(dataset_id)
            .await?
            .ok_or_else(|| ResolveError::DatasetNotFound { dataset_id }.into())
    }

    /// A user's download history, migrated to v2 in memory if needed
    pub async fn user_history(&self, user_id: &str) -> Result<DownloadHistory> {
        let stored = self.db.get_user_history(user_id).await?;
        let (history, _) = DownloadHistory::from_stored(stored);
        Ok(history)
    }

    /// Current ATP acceptance state of a user
    pub async fn check_atp(&self, token: Option<&str>, user_id: Option<&str>) -> Result<serde_json::Value> {
        let user_id = self.authorize_atp(token, user_id)?;
        self.identity.check_atp(user_id).await
    }

    /// Record a user's ATP acceptance
    pub async fn accept_atp(&self, token: Option<&str>, user_id: Option<&str>) -> Result<serde_json::Value> {
        let user_id = self.authorize_atp(token, user_id)?;
        tracing::info!(user_id, "ATP accepted");
        self.identity.accept_atp(user_id).await
    }

    // ATP calls use the download action token, like get-download
    fn authorize_atp<'a>(&self, token: Option<&str>, user_id: Option<&'a str>) -> Result<&'a str> {
        require_token(self.verifier.as_ref(), token, &self.config.auth.download_action)?;
        Ok(user_id
            .filter(|u| !u.is_empty())
            .ok_or(ValidationError::MissingUser)?)
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server listens on `api.bind_address` until the task is aborted or
    /// the listener fails.
    pub fn spawn_api_server(&self) -> JoinHandle<Result<()>> {
        let service = Arc::new(self.clone());
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(service, config).await })
    }
}
