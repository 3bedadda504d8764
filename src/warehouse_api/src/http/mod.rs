//! HTTP surface.
//!
//! Routes:
//! - `GET  /api/raw-data/categories`
//! - `GET  /api/raw-data/funds/{catalog}`
//! - `POST /api/raw-data/download`
//! - `GET  /api/market-data/securities`
//! - `GET  /api/market-data/fields/{security}`
//! - `POST /api/market-data/download`
//! - `POST /api/data-upload/upload`
//! - `GET  /api/data-upload/types`
//! - `GET  /api/health`, `GET /`
//!
//! Data responses carry an `X-Data-Source: live|synthetic` header. Errors are
//! `{success: false, error}`; unknown paths get a JSON 404.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::environment::EnvironmentTag;
use crate::service::{MarketDataService, RawDataService};
use crate::upload::UploadForwarder;

pub mod market_data;
pub mod raw_data;
pub mod response;
pub mod upload;

/// Shared, read-only request state.
#[derive(Clone)]
pub struct AppState {
    /// Raw-data service.
    pub raw: Arc<RawDataService>,
    /// Market-data service.
    pub market: Arc<MarketDataService>,
    /// Upload forwarder.
    pub uploads: Arc<UploadForwarder>,
    /// Environment resolved at startup.
    pub environment: EnvironmentTag,
}

const ENDPOINTS: &[&str] = &[
    "/api/health",
    "/api/raw-data/categories",
    "/api/raw-data/funds/{catalog}",
    "/api/raw-data/download",
    "/api/market-data/securities",
    "/api/market-data/fields/{security}",
    "/api/market-data/download",
    "/api/data-upload/upload",
    "/api/data-upload/types",
];

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "Warehouse API is running",
        "environment": state.environment,
        "data_sources": {
            "raw_data": state.raw.backend(),
            "market_data": state.market.backend(),
        },
    }))
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Warehouse API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ENDPOINTS,
    }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Endpoint not found" })),
    )
}

/// CORS for `origins`; an empty list allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

/// Full application router.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    let raw = Router::new()
        .route("/categories", get(raw_data::categories))
        .route("/funds/{catalog}", get(raw_data::funds))
        .route("/download", post(raw_data::download));

    let market = Router::new()
        .route("/securities", get(market_data::securities))
        .route("/fields/{security}", get(market_data::fields))
        .route("/download", post(market_data::download));

    let uploads = Router::new()
        .route("/upload", post(upload::upload))
        .route("/types", get(upload::types));

    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .nest("/api/raw-data", raw)
        .nest("/api/market-data", market)
        .nest("/api/data-upload", uploads)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
