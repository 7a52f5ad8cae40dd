//! Download statistics and dataset record handlers.

use super::{DatasetIdQuery, DatasetResource};
use crate::api::AppState;
use crate::error::ValidationError;
use crate::types::{DatasetId, DownloadStats};
use crate::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
};

/// GET /datasets/download-stats - Cached download statistics
///
/// Values may be up to `stats.ttl` old.
#[utoipa::path(
    get,
    path = "/datasets/download-stats",
    tag = "datasets",
    params(DatasetIdQuery),
    responses(
        (status = 200, description = "Total and per-month download counts", body = DownloadStats),
        (status = 400, description = "Missing dataset ID", body = crate::error::ApiError),
        (status = 401, description = "Missing or invalid editor key", body = crate::error::ApiError)
    ),
    security(("api_key" = []))
)]
pub async fn download_stats(
    State(state): State<AppState>,
    Query(query): Query<DatasetIdQuery>,
) -> Result<Json<DownloadStats>> {
    let dataset_id = query
        .dataset_id
        .ok_or(ValidationError::MissingField("dataset_id"))?;

    Ok(Json(state.service.get_stats(dataset_id).await?))
}

/// GET /datasets/:id - Dataset record with uncached download counts
#[utoipa::path(
    get,
    path = "/datasets/{id}",
    tag = "datasets",
    params(
        ("id" = i64, Path, description = "Dataset ID")
    ),
    responses(
        (status = 200, description = "Dataset record", body = DatasetResource),
        (status = 404, description = "Dataset not found", body = crate::error::ApiError)
    )
)]
pub async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DatasetResource>> {
    let dataset_id = DatasetId(id);
    let dataset = state.service.dataset(dataset_id).await?;
    let downloads = state.service.download_log(dataset_id).await?;

    Ok(Json(DatasetResource { dataset, downloads }))
}
