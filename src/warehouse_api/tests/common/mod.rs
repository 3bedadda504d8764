#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use warehouse_api::config::UploadConfig;
use warehouse_api::environment::EnvironmentTag;
use warehouse_api::fund_mapping::FundColumnMapping;
use warehouse_api::http::{self, AppState};
use warehouse_api::query::WarehouseLayout;
use warehouse_api::repo::{ConnectivityError, RepositoryResolver};
use warehouse_api::service::{MarketDataService, RawDataService};
use warehouse_api::upload::UploadForwarder;

/// Resolver whose connector always fails, so both domains end up synthetic.
pub fn offline_resolver(mapping: Arc<FundColumnMapping>) -> RepositoryResolver {
    RepositoryResolver::new(
        || Err(ConnectivityError::NoTarget(EnvironmentTag::Development)),
        Arc::new(WarehouseLayout::default()),
        mapping,
    )
}

/// App state served entirely from synthetic repositories.
pub fn synthetic_state(upload: UploadConfig) -> AppState {
    let mapping = Arc::new(FundColumnMapping::builtin());
    let resolver = offline_resolver(Arc::clone(&mapping));
    AppState {
        raw: Arc::new(RawDataService::new(resolver.resolve_raw(), mapping)),
        market: Arc::new(MarketDataService::new(resolver.resolve_market())),
        uploads: Arc::new(UploadForwarder::from_config(&upload).expect("forwarder")),
        environment: EnvironmentTag::Development,
    }
}

pub fn app() -> Router {
    http::router(synthetic_state(UploadConfig::default()), http::cors_layer(&[]))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: Router, req: Request<Body>) -> TestResponse {
    let resp = app.oneshot(req).await.expect("router is infallible");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse { status, headers, body }
}

pub async fn get(app: Router, uri: &str) -> TestResponse {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: Router, uri: &str, body: &Value) -> TestResponse {
    let req = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

pub struct TempConfig {
    _dir: TempDir, // keep alive for the life of the test
    pub path: PathBuf,
}

pub fn write_config(contents: &str) -> TempConfig {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("warehouse.toml");
    std::fs::write(&path, contents).expect("write config");
    TempConfig { _dir: dir, path }
}
