//! Uniform JSON error envelope for the HTTP interface.
//!
//! Every failure leaves the server as `{"error": "..."}` with a matching
//! status code. Backend failures are logged in full and reported to the
//! client only as `internal error`.

use crate::storage::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The key is absent or expired.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// The request cannot be served as sent.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No route matches the request.
    #[error("no such route")]
    NoRoute,

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::NotFound { key } => (
                StatusCode::NOT_FOUND,
                json!({"error": "not found", "key": key}),
            ),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({"error": message})),
            AppError::NoRoute => (StatusCode::NOT_FOUND, json!({"error": "not found"})),
            AppError::Store(StoreError::InvalidName(_)) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "invalid store name"}),
            ),
            AppError::Store(StoreError::TooManyStores(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "too many stores"}),
            ),
            AppError::Store(e) => {
                error!(error = %e, "Store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal error"}),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
