//! ATP acceptance handlers, relayed to the identity service.

use super::AtpRequest;
use crate::Result;
use crate::api::AppState;
use axum::{Json, extract::State};

/// POST /datasets/check-atp - Current ATP acceptance state of a user
#[utoipa::path(
    post,
    path = "/datasets/check-atp",
    tag = "atp",
    request_body = AtpRequest,
    responses(
        (status = 200, description = "Acceptance state as returned by the identity service"),
        (status = 400, description = "Missing user", body = crate::error::ApiError),
        (status = 401, description = "Missing token", body = crate::error::ApiError),
        (status = 403, description = "Invalid token", body = crate::error::ApiError),
        (status = 503, description = "Identity service unavailable", body = crate::error::ApiError)
    )
)]
pub async fn check_atp(
    State(state): State<AppState>,
    Json(body): Json<AtpRequest>,
) -> Result<Json<serde_json::Value>> {
    let result = state
        .service
        .check_atp(body.token.as_deref(), body.user_id.as_deref())
        .await?;
    Ok(Json(result))
}

/// POST /datasets/accept-atp - Record a user's ATP acceptance
#[utoipa::path(
    post,
    path = "/datasets/accept-atp",
    tag = "atp",
    request_body = AtpRequest,
    responses(
        (status = 200, description = "Result as returned by the identity service"),
        (status = 400, description = "Missing user", body = crate::error::ApiError),
        (status = 401, description = "Missing token", body = crate::error::ApiError),
        (status = 403, description = "Invalid token", body = crate::error::ApiError),
        (status = 503, description = "Identity service unavailable", body = crate::error::ApiError)
    )
)]
pub async fn accept_atp(
    State(state): State<AppState>,
    Json(body): Json<AtpRequest>,
) -> Result<Json<serde_json::Value>> {
    let result = state
        .service
        .accept_atp(body.token.as_deref(), body.user_id.as_deref())
        .await?;
    Ok(Json(result))
}
