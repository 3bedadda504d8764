//! `/api/market-data` handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::json;

use crate::dto::MarketDataPayload;
use crate::http::AppState;
use crate::http::response::{ApiError, blocking, sourced};
use crate::service::DownloadResult;

/// `GET /api/market-data/securities`
pub async fn securities(State(state): State<AppState>) -> Result<Response, ApiError> {
    let svc = Arc::clone(&state.market);
    let securities = blocking(move || svc.list_securities()).await?;
    Ok(sourced(state.market.backend(), json!({ "success": true, "data": securities })))
}

/// `GET /api/market-data/fields/{security}`
pub async fn fields(State(state): State<AppState>, Path(security): Path<String>) -> Result<Response, ApiError> {
    let svc = Arc::clone(&state.market);
    let fields = blocking(move || svc.list_fields(&security)).await?;
    Ok(sourced(state.market.backend(), json!({ "success": true, "data": fields })))
}

/// `POST /api/market-data/download`
///
/// Unbatched responses also carry `columns`, the key order of the first record.
pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<MarketDataPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let svc = Arc::clone(&state.market);
    let body = match blocking(move || svc.handle_download(payload)).await? {
        DownloadResult::Full(records) => {
            let columns: Vec<&str> = records
                .first()
                .map(|r| r.keys().map(String::as_str).collect())
                .unwrap_or_default();
            json!({
                "success": true,
                "count": records.len(),
                "columns": columns,
                "data": records,
            })
        }
        DownloadResult::Batch(batch) => json!({
            "success": true,
            "batch_id": batch.batch_id,
            "total_batches": batch.total_batches,
            "has_more": batch.has_more,
            "data": batch.records,
        }),
    };
    Ok(sourced(state.market.backend(), body))
}
