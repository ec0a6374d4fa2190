//! HTTP error mapping
//!
//! Only the API key check and payload validation have dedicated status codes.
//! Everything else becomes a generic 500; the detail goes to the log, not to
//! the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::pipeline::PipelineError;
use crate::secrets::SecretError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or wrong `X-API-Key` (401)
    #[error("Unauthorized")]
    Unauthorized,

    /// Body is not a valid webhook payload (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Secret lookup for the API key check failed (500)
    #[error("Secret store error: {0}")]
    Secret(#[from] SecretError),

    /// Processing failed (500)
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" })),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": { "code": "BAD_REQUEST", "message": msg } }),
            ),
            ApiError::Secret(ref err) => {
                error!("Secret store error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, internal_body("INTERNAL_ERROR"))
            }
            ApiError::Pipeline(ref err) => {
                error!(code = err.code(), "Processing failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, internal_body(err.code()))
            }
        };

        (status, Json(body)).into_response()
    }
}

fn internal_body(code: &str) -> serde_json::Value {
    json!({ "error": { "code": code, "message": "Internal server error" } })
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
