//! sudoku-webhook library
//!
//! Receives a Drive file id, reads the finished-puzzle screenshot with a
//! vision model and records difficulty and solve time in Postgres.

pub mod api;
pub mod credentials;
pub mod db;
pub mod drive;
pub mod error;
pub mod inference;
pub mod normalize;
pub mod pipeline;
pub mod secrets;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::pipeline::Pipeline;
use crate::secrets::SecretProvider;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Secret store (webhook API key lookup)
    pub secrets: Arc<dyn SecretProvider>,
    /// Processing sequence run for each accepted webhook
    pub pipeline: Arc<Pipeline>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(secrets: Arc<dyn SecretProvider>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            secrets,
            pipeline,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::webhook_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
