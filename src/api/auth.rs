//! Editor capability check for the REST API
//!
//! Routes that expose aggregate usage data (download stats) require the
//! editor key in the `X-Api-Key` header when `ApiConfig::editor_key` is set.
//! Other routes authenticate per request with action tokens instead.

use crate::error::ApiError;
use crate::token::constant_time_eq;
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Middleware requiring the editor key in the X-Api-Key header
///
/// With no key configured every request passes. Otherwise a missing or
/// wrong key is answered with 401 and the handler never runs.
///
/// ```no_run
/// use axum::{Router, middleware};
/// use dataset_dl::api::auth::require_api_key;
///
/// let editor_key = Some("secret-key-123".to_string());
/// let router: Router = Router::new()
///     .route("/datasets/download-stats", axum::routing::get(|| async { "{}" }))
///     .route_layer(middleware::from_fn_with_state(editor_key, require_api_key));
/// ```
pub async fn require_api_key(
    State(expected_api_key): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected_key) = expected_api_key else {
        return next.run(request).await;
    };

    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    match api_key_header {
        Some(provided_key)
            if constant_time_eq(provided_key.as_bytes(), expected_key.as_bytes()) =>
        {
            next.run(request).await
        }
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with invalid editor key");
            unauthorized_response("Invalid API key")
        }
        None => unauthorized_response("Missing X-Api-Key header"),
    }
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}
