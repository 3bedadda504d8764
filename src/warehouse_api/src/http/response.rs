//! Response envelopes, error mapping and the blocking-call bridge.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::repo::{Backend, RepoError};
use crate::service::ServiceError;

/// Header telling the client whether data came from the warehouse or was generated.
pub const DATA_SOURCE_HEADER: HeaderName = HeaderName::from_static("x-data-source");

/// A `{success: false, error}` response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Message shown to the client.
    pub message: String,
    /// Extra context, when the client can act on it.
    pub details: Option<String>,
}

impl ApiError {
    /// Error with `status` and `message`.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    /// 400 with `message`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 500 with a message that reveals nothing about the failure.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    /// Adds `details`.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "success": false, "error": self.message });
        if let Some(details) = self.details {
            body["details"] = Value::String(details);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(v) => Self::bad_request(v.to_string()),
            ServiceError::Repository(RepoError::UnknownCatalog(c)) => {
                Self::bad_request(format!("Unknown catalog: {c}"))
            }
            // already logged with the query; keep internals out of the response
            ServiceError::Repository(RepoError::Query(_)) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve data")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "rejected request body");
        Self::bad_request(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

/// `body` as a 200 JSON response tagged with the backend that produced it.
pub fn sourced(backend: Backend, body: Value) -> Response {
    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .insert(DATA_SOURCE_HEADER, HeaderValue::from_static(backend.as_str()));
    response
}

/// Runs a synchronous service call on the blocking pool.
pub async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!(error = %e, "blocking task failed");
            Err(ApiError::internal())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::StoreError;

    #[test]
    fn unknown_catalog_is_the_clients_mistake() {
        let e = ApiError::from(ServiceError::Repository(RepoError::UnknownCatalog("NOPE".into())));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.message, "Unknown catalog: NOPE");
    }

    #[test]
    fn query_failures_hide_internals() {
        let store = StoreError::Database(diesel::result::Error::NotFound);
        let e = ApiError::from(ServiceError::Repository(RepoError::Query(store)));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.message, "Failed to retrieve data");
        assert!(e.details.is_none());
    }
}
