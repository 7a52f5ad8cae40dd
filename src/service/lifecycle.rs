//! Shutdown coordination.

use crate::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;

use super::DatasetService;

/// How long shutdown waits for the recovery worker to stop
const WORKER_STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// How long shutdown waits for background logging tasks to finish
const TASKS_STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

impl DatasetService {
    /// Gracefully shut down the service
    ///
    /// 1. Stops accepting new resolve and log requests
    /// 2. Cancels the recovery worker and waits for it (30 second timeout)
    /// 3. Waits for in-flight download logging to finish (30 second timeout)
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// A recovery job interrupted here stays `running` in the database and is
    /// requeued when the next worker starts. Calling this twice is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new requests");

        self.cancel.cancel();
        // No new tasks are spawned once requests are refused
        self.tasks.close();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(WORKER_STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => tracing::info!("Recovery worker stopped"),
                Ok(Err(e)) => tracing::error!(error = %e, "Recovery worker task failed"),
                Err(_) => tracing::warn!("Timeout waiting for recovery worker, proceeding with shutdown"),
            }
        }

        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for background tasks");
        }
        match tokio::time::timeout(TASKS_STOP_TIMEOUT, self.tasks.wait()).await {
            Ok(()) => tracing::info!("Background tasks finished"),
            Err(_) => tracing::warn!(
                remaining = self.tasks.len(),
                "Timeout waiting for background tasks, proceeding with shutdown"
            ),
        }

        self.emit_event(Event::Shutdown);

        // The pool closes when the last Arc<Database> is dropped
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether the service still accepts new requests
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}
