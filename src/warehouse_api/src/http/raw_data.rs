//! `/api/raw-data` handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::json;

use crate::dto::RawDataPayload;
use crate::http::AppState;
use crate::http::response::{ApiError, blocking, sourced};
use crate::service::DownloadResult;

/// `GET /api/raw-data/categories`
pub async fn categories(State(state): State<AppState>) -> Result<Response, ApiError> {
    let svc = Arc::clone(&state.raw);
    let categories = blocking(move || svc.list_categories()).await?;
    Ok(sourced(state.raw.backend(), json!({ "success": true, "data": categories })))
}

/// `GET /api/raw-data/funds/{catalog}`
pub async fn funds(State(state): State<AppState>, Path(catalog): Path<String>) -> Result<Response, ApiError> {
    let svc = Arc::clone(&state.raw);
    let listing = blocking(move || svc.list_funds(&catalog)).await?;
    Ok(sourced(
        state.raw.backend(),
        json!({
            "success": true,
            "data": listing.funds,
            "fund_filtering_available": listing.fund_filtering_available,
        }),
    ))
}

/// `POST /api/raw-data/download`
pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<RawDataPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let svc = Arc::clone(&state.raw);
    let body = match blocking(move || svc.handle_download(payload)).await? {
        DownloadResult::Full(records) => json!({
            "success": true,
            "count": records.len(),
            "data": records,
        }),
        DownloadResult::Batch(batch) => json!({
            "success": true,
            "batch_id": batch.batch_id,
            "total_batches": batch.total_batches,
            "has_more": batch.has_more,
            "data": batch.records,
        }),
    };
    Ok(sourced(state.raw.backend(), body))
}
