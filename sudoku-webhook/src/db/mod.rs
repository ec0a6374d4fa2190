//! Database access layer
//!
//! One table, `puzzle_solutions`, written once per processed screenshot.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use sudoku_common::{ParsedPuzzleResult, ScreenshotMetadata};
use thiserror::Error;
use tracing::info;

use crate::secrets::{names, SecretError, SecretProvider};

mod solutions;
pub use solutions::PgResultStore;

/// Development connection string; takes priority over the secret store
pub const DEV_DATABASE_URL_ENV: &str = "DATABASE_URL_DEV";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Persists extraction results
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert one solution record and return its id
    async fn insert(
        &self,
        result: &ParsedPuzzleResult,
        metadata: &ScreenshotMetadata,
    ) -> Result<i64, StoreError>;
}

/// Resolve the connection string.
///
/// Priority:
/// 1. `DATABASE_URL_DEV` environment variable (local development)
/// 2. Secret store (`neon-database-connection-string`)
pub async fn resolve_database_url(secrets: &dyn SecretProvider) -> Result<String, StoreError> {
    if let Ok(url) = std::env::var(DEV_DATABASE_URL_ENV) {
        if !url.trim().is_empty() {
            info!("Using development database connection");
            return Ok(url);
        }
    }

    info!(
        "Using database URL from secret store: {}",
        names::DATABASE_URL
    );
    Ok(secrets.get(names::DATABASE_URL).await?)
}

/// Build a lazily connecting pool; connection failures surface on first use,
/// after at most `acquire_timeout`.
pub fn connect(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(url)?;
    Ok(pool)
}

/// Create `puzzle_solutions` if it does not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS puzzle_solutions (
            id SERIAL PRIMARY KEY,
            solved_at TIMESTAMPTZ NOT NULL,
            time_to_solve INTERVAL NOT NULL,
            difficulty VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("✓ puzzle_solutions table ready");
    Ok(())
}
