//! Webhook endpoint
//!
//! The key check runs before the body is looked at, so an unauthenticated
//! caller always gets 401 regardless of what it sent.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use sudoku_common::WebhookPayload;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::secrets::{names, SecretProvider};
use crate::AppState;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Compare the request's `X-API-Key` with the stored key.
pub async fn verify_api_key(secrets: &dyn SecretProvider, headers: &HeaderMap) -> ApiResult<()> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let Some(provided) = provided else {
        warn!("Webhook call without {} header", API_KEY_HEADER);
        return Err(ApiError::Unauthorized);
    };

    let expected = secrets.get(names::WEBHOOK_API_KEY).await?;
    if provided != expected {
        warn!("Webhook call with wrong API key");
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}

/// POST / and POST /webhook
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    verify_api_key(state.secrets.as_ref(), &headers).await?;

    let payload =
        WebhookPayload::from_json(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    debug!(file_id = %payload.file_id, "Accepted webhook payload");

    state.pipeline.process(&payload).await?;

    Ok(Json(json!({ "message": "Success" })))
}

/// Build webhook routes
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(receive_webhook))
        .route("/webhook", post(receive_webhook))
}
