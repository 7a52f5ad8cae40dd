//! REST API server module
//!
//! Exposes download resolution, usage logging, download statistics and ATP
//! acceptance over HTTP, plus an OpenAPI document and an event stream.

use crate::{Config, DatasetService, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Datasets
/// - `POST /datasets/get-download` - Resolve a dataset to a file URL
/// - `POST /datasets/log-download` - Log a download (session token header)
/// - `GET /datasets/download-stats` - Cached download counts (editor key when configured)
/// - `GET /datasets/:id` - Dataset record with fresh download counts
///
/// ## ATP
/// - `POST /datasets/check-atp` - Acceptance state from the identity service
/// - `POST /datasets/accept-atp` - Record acceptance with the identity service
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(service: Arc<DatasetService>, config: Arc<Config>) -> Router {
    let state = AppState::new(service, config.clone());

    // Only download-stats is gated by the editor key
    let editor_routes = Router::new()
        .route("/datasets/download-stats", get(routes::download_stats))
        .route_layer(middleware::from_fn_with_state(
            config.api.editor_key.clone(),
            auth::require_api_key,
        ));

    let router = Router::new()
        // Datasets
        .route("/datasets/get-download", post(routes::get_download))
        .route("/datasets/log-download", post(routes::log_download))
        .route("/datasets/:id", get(routes::get_dataset))
        // ATP
        .route("/datasets/check-atp", post(routes::check_atp))
        .route("/datasets/accept-atp", post(routes::accept_atp))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream))
        .merge(editor_routes);

    // SwaggerUi serves its own copy of the document at the given URL
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/swagger-ui/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` anywhere in the list, or an empty list, allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops.
///
/// # Example
///
/// ```no_run
/// use dataset_dl::{Config, DatasetService};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let service = Arc::new(DatasetService::new((*config).clone()).await?);
///
/// dataset_dl::api::start_api_server(service, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(service: Arc<DatasetService>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(service, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(bind_address),
        "API server listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}
