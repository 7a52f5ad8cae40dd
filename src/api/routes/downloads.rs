//! Download resolution and logging handlers.

use super::{DatasetIdQuery, DownloadRequest, DownloadResponse, LogDownloadRequest};
use crate::Result;
use crate::api::AppState;
use crate::resolver::ResolveRequest;
use crate::service::LogRequest;
use crate::usage::LogDownloadReport;
use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};

/// Header carrying the session token of log-download
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Header name legacy clients use for the session token
const LEGACY_SESSION_TOKEN_HEADER: &str = "x-wp-nonce";

/// POST /datasets/get-download - Resolve a dataset to a file URL
#[utoipa::path(
    post,
    path = "/datasets/get-download",
    tag = "datasets",
    params(DatasetIdQuery),
    request_body = DownloadRequest,
    responses(
        (status = 200, description = "File URL to download from", body = DownloadResponse),
        (status = 400, description = "Missing user or dataset ID", body = crate::error::ApiError),
        (status = 401, description = "Missing token", body = crate::error::ApiError),
        (status = 403, description = "Invalid token", body = crate::error::ApiError),
        (status = 404, description = "Dataset unknown or has no file anywhere", body = crate::error::ApiError),
        (status = 500, description = "Dataset only has a cached legacy URL", body = crate::error::ApiError),
        (status = 502, description = "Legacy archive unreachable or malformed", body = crate::error::ApiError)
    )
)]
pub async fn get_download(
    State(state): State<AppState>,
    Query(query): Query<DatasetIdQuery>,
    Json(body): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>> {
    let resolved = state
        .service
        .resolve(ResolveRequest {
            dataset_id: body.dataset_id.or(query.dataset_id),
            token: body.token,
            user_id: body.user_id,
        })
        .await?;

    Ok(Json(DownloadResponse {
        file_url: resolved.location.url,
    }))
}

/// POST /datasets/log-download - Log a download
///
/// Once the token, user and dataset checks pass the response is 200 even
/// when some logging steps failed; each step reports its own outcome.
#[utoipa::path(
    post,
    path = "/datasets/log-download",
    tag = "datasets",
    params(
        DatasetIdQuery,
        ("X-Session-Token" = String, Header, description = "Session token")
    ),
    request_body = LogDownloadRequest,
    responses(
        (status = 200, description = "Per-step logging results", body = LogDownloadReport),
        (status = 400, description = "Missing user or dataset ID", body = crate::error::ApiError),
        (status = 401, description = "Missing session token", body = crate::error::ApiError),
        (status = 403, description = "Invalid session token", body = crate::error::ApiError)
    )
)]
pub async fn log_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DatasetIdQuery>,
    Json(body): Json<LogDownloadRequest>,
) -> Result<Json<LogDownloadReport>> {
    let session_token = headers
        .get(SESSION_TOKEN_HEADER)
        .or_else(|| headers.get(LEGACY_SESSION_TOKEN_HEADER))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let report = state
        .service
        .log_download(LogRequest {
            session_token,
            dataset_id: body.dataset_id.or(query.dataset_id),
            user_id: body.user_id,
        })
        .await?;

    Ok(Json(report))
}
