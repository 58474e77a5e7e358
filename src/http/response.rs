//! Mapping service errors to HTTP responses.
//!
//! # Design Decisions
//! - Errors are JSON bodies of the form `{"error": "..."}`
//! - Unsupported features answer 501 so clients can tell "not here" from
//!   "broken"
//! - Backend failures are logged and reported as 500 without details

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::backend::StoreError;
use crate::services::ServiceError;

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ServiceError::Store(e) => {
                tracing::error!(error = %e, "Storage failure while handling request");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
            }
        };
        error_response(status, self.to_string())
    }
}
