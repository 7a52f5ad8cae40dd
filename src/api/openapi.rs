//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the dataset-dl REST API
///
/// Served at `/openapi.json` and, when enabled, through Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "dataset-dl REST API",
        version = "0.1.0",
        description = "Dataset download resolution, usage logging and download statistics",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Datasets
        crate::api::routes::get_download,
        crate::api::routes::log_download,
        crate::api::routes::download_stats,
        crate::api::routes::get_dataset,

        // ATP
        crate::api::routes::check_atp,
        crate::api::routes::accept_atp,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::Dataset,
        crate::types::LegacyOrigin,
        crate::types::DownloadStats,
        crate::types::FileSource,
        crate::types::Event,

        // Usage logging
        crate::usage::LogDownloadReport,
        crate::usage::StepReport,

        // API request/response types
        crate::api::routes::DownloadRequest,
        crate::api::routes::DownloadResponse,
        crate::api::routes::LogDownloadRequest,
        crate::api::routes::AtpRequest,
        crate::api::routes::DatasetResource,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
        crate::error::ErrorKind,
    )),
    tags(
        (name = "datasets", description = "Dataset downloads - Resolve file URLs, log downloads, read statistics"),
        (name = "atp", description = "ATP legal acceptance - Relayed to the identity service"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the editor key scheme used by download-stats
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
