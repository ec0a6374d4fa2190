//! Screenshot processing sequence
//!
//! download → normalise → extract → metadata → insert, strictly in order.
//! Any failure aborts the run; nothing is persisted unless every earlier step
//! succeeded, and nothing is compensated or retried.

use std::sync::Arc;
use sudoku_common::WebhookPayload;
use thiserror::Error;
use tracing::info;

use crate::db::{ResultStore, StoreError};
use crate::drive::{DriveError, ScreenshotSource};
use crate::inference::{InferenceError, PuzzleExtractor};
use crate::normalize::{normalize_image, ImageError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Drive(#[from] DriveError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Short machine-readable kind for logs and error bodies
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Drive(DriveError::Credentials(_)) => "AUTH_ERROR",
            PipelineError::Drive(DriveError::Metadata { .. } | DriveError::Validation(_)) => {
                "METADATA_ERROR"
            }
            PipelineError::Drive(_) => "DOWNLOAD_ERROR",
            PipelineError::Image(_) => "IMAGE_FORMAT_ERROR",
            PipelineError::Inference(_) => "INFERENCE_ERROR",
            PipelineError::Store(_) => "STORAGE_ERROR",
        }
    }
}


pub struct Pipeline {
    source: Arc<dyn ScreenshotSource>,
    extractor: Arc<dyn PuzzleExtractor>,
    store: Arc<dyn ResultStore>,
    jpeg_quality: u8,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ScreenshotSource>,
        extractor: Arc<dyn PuzzleExtractor>,
        store: Arc<dyn ResultStore>,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            source,
            extractor,
            store,
            jpeg_quality,
        }
    }

    /// Process one webhook notification; returns the new record id.
    pub async fn process(&self, payload: &WebhookPayload) -> Result<i64, PipelineError> {
        let file_id = payload.file_id.as_str();
        info!(file_id, "Processing screenshot");

        let raw = self.source.download(file_id).await?;
        let jpeg = normalize_image(&raw, self.jpeg_quality)?;
        let result = self.extractor.extract(&jpeg).await?;
        let metadata = self.source.get_metadata(file_id).await?;
        let id = self.store.insert(&result, &metadata).await?;

        info!(file_id, id, "Screenshot processed");
        Ok(id)
    }
}
