//! Error responses.
//!
//! Every error leaves the router as `{"error":{"message","type"}}` with a
//! status code that tells the client whether retrying can help.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::lifecycle::models::ResolveError;

/// An error rendered as a JSON response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request_error", message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        let (status, kind) = match &err {
            ResolveError::UnknownModel(_) | ResolveError::NotConfigured(_) => {
                (StatusCode::NOT_FOUND, "not_found_error")
            }
            ResolveError::InvalidSpec { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_model_error")
            }
            ResolveError::NotLoaded(_) => (StatusCode::CONFLICT, "model_not_loaded"),
            ResolveError::LoadFailed { .. } => (StatusCode::SERVICE_UNAVAILABLE, "load_error"),
            ResolveError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout_error"),
        };
        Self::new(status, kind, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "message": self.message,
                "type": self.kind,
            }
        });
        (self.status, Json(body)).into_response()
    }
}
