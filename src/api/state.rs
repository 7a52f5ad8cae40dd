//! Application state for the API server

use crate::{Config, DatasetService};
use std::sync::Arc;

/// Shared state handed to every route handler (cheap Arc clone per request)
#[derive(Clone)]
pub struct AppState {
    /// The dataset service
    pub service: Arc<DatasetService>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(service: Arc<DatasetService>, config: Arc<Config>) -> Self {
        Self { service, config }
    }
}
