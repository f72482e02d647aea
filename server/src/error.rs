//! API errors mapped to HTTP status codes with a `{"error": "..."}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quill_core::StoreError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    /// 404
    NotFound(String),
    /// 400
    BadRequest(String),
    /// 401
    Unauthorized(String),
    /// 503, the store or its index cannot be reached.
    ServiceUnavailable(String),
    /// 500
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::Validation(msg) => ApiError::BadRequest(msg),
            StoreError::IndexUnavailable(_) => {
                tracing::error!(error = %err, "store unavailable");
                ApiError::ServiceUnavailable(err.to_string())
            }
            StoreError::Codec(_) | StoreError::Schema(_) => {
                tracing::error!(error = %err, "store failure");
                ApiError::Internal(err.to_string())
            }
        }
    }
}
