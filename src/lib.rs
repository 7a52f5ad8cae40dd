//! # dataset-dl
//!
//! Backend library for dataset download services.
//!
//! A download request is resolved to a file URL: a live local copy when the
//! dataset has one, otherwise the original on a legacy archive. Files served
//! from the archive are copied into local storage in the background so the
//! next request is served locally. Every download is counted (total and per
//! month) and recorded in the requesting user's history.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dataset_dl::{Config, DatasetService, ResolveRequest, DatasetId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.auth.token_secret = Some("change-me".to_string());
//!
//!     let service = DatasetService::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let resolved = service
//!         .resolve(ResolveRequest {
//!             dataset_id: Some(DatasetId(42)),
//!             token: Some("token-from-client".to_string()),
//!             user_id: Some("user-1".to_string()),
//!         })
//!         .await?;
//!     println!("Download from {}", resolved.location.url);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// External identity service (ATP acceptance)
pub mod identity;
/// Background recovery of legacy files
pub mod recovery;
/// Download resolution and the legacy archive client
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Dataset service facade
pub mod service;
/// Usage store seam
pub mod store;
/// Action token verification
pub mod token;
/// Core types and events
pub mod types;
/// Usage logging, user history and download statistics
pub mod usage;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{
    ApiError, AuthError, DatabaseError, Error, ErrorDetail, ErrorKind, PersistenceError,
    ResolveError, Result, ToHttpStatus, ValidationError,
};
pub use resolver::{ResolveRequest, Resolved};
pub use service::{Collaborators, DatasetService, LogRequest};
pub use types::{
    Dataset, DatasetId, DownloadStats, Event, FileLocation, FileSource, LegacyOrigin, RecoveryJob,
    RecoveryStatus,
};
pub use usage::{DownloadHistory, HistoryEntry, LogDownloadReport, StepReport};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use dataset_dl::{Config, DatasetService, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = DatasetService::new(Config::default()).await?;
///     let _api = service.spawn_api_server();
///
///     run_with_shutdown(service).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: DatasetService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
