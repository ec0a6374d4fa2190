//! `puzzle_solutions` inserts

use async_trait::async_trait;
use chrono::Duration;
use sqlx::postgres::PgPool;
use sudoku_common::time::naive_as_utc;
use sudoku_common::{ParsedPuzzleResult, ScreenshotMetadata};
use tracing::{error, info};

use super::{ResultStore, StoreError};

pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn insert(
        &self,
        result: &ParsedPuzzleResult,
        metadata: &ScreenshotMetadata,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Database error: {}", e);
            e
        })?;

        let solved_at = naive_as_utc(metadata.time);
        let time_to_solve = Duration::seconds(i64::from(result.time_to_solve_secs));

        let inserted = sqlx::query_scalar::<_, i32>(
            "INSERT INTO puzzle_solutions (solved_at, time_to_solve, difficulty)
             VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(solved_at)
        .bind(time_to_solve)
        .bind(result.difficulty.as_str())
        .fetch_one(&mut *tx)
        .await;

        let id = match inserted {
            Ok(id) => id,
            Err(e) => {
                error!("Database error: {}", e);
                if let Err(rollback) = tx.rollback().await {
                    error!("Rollback failed: {}", rollback);
                }
                return Err(e.into());
            }
        };

        tx.commit().await.map_err(|e| {
            error!("Database error: {}", e);
            e
        })?;

        info!("Inserted puzzle solution with ID: {}", id);
        Ok(i64::from(id))
    }
}
