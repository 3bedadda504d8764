//! `/api/data-upload` handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Value, json};

use crate::http::AppState;
use crate::http::response::ApiError;
use crate::upload::{ForwardError, UPLOAD_TYPES, UploadPayload, build_envelope};

impl From<ForwardError> for ApiError {
    fn from(e: ForwardError) -> Self {
        match e {
            ForwardError::NotConfigured { .. } => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Upload endpoint is not configured")
            }
            ForwardError::Tls { source, .. } => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "SSL certificate verification failed when connecting to the ingestion endpoint",
            )
            .with_details(source.to_string()),
            ForwardError::Timeout { .. } => ApiError::new(
                StatusCode::GATEWAY_TIMEOUT,
                "Upload timeout - ingestion endpoint did not respond in time",
            ),
            ForwardError::Connect { .. } => {
                ApiError::new(StatusCode::BAD_GATEWAY, "Unable to connect to ingestion endpoint")
            }
            ForwardError::Upstream { status, body, .. } => {
                let err = ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    format!("Ingestion processing failed with status {status}"),
                );
                if body.is_empty() { err } else { err.with_details(body) }
            }
            ForwardError::Request { source, .. } => {
                ApiError::new(StatusCode::BAD_GATEWAY, format!("Request failed: {source}"))
            }
        }
    }
}

/// `POST /api/data-upload/upload`
pub async fn upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let envelope = build_envelope(payload, Utc::now()).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let ack = state.uploads.forward(&envelope).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully uploaded {} records", envelope.record_count),
        "record_count": envelope.record_count,
        "data_type": envelope.data_type,
        "upstream_status": ack.status,
    })))
}

/// `GET /api/data-upload/types`
pub async fn types() -> Json<Value> {
    Json(json!({ "success": true, "upload_types": UPLOAD_TYPES }))
}
