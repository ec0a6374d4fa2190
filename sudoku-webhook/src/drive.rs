//! Google Drive object fetcher (Drive v3 REST)

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use sudoku_common::{ScreenshotMetadata, ValidationError};
use thiserror::Error;
use tracing::{debug, info};

use crate::credentials::{CredentialError, CredentialManager};

/// Upper bound for the initial buffer reservation
const MAX_PREALLOCATION: usize = 32 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("An error occurred downloading file {file_id}: {reason}")]
    Download { file_id: String, reason: String },

    #[error("metadata request for {file_id} failed: {reason}")]
    Metadata { file_id: String, reason: String },

    #[error("invalid metadata: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid Drive URL: {0}")]
    Url(String),
}

/// Where screenshots and their metadata come from
#[async_trait]
pub trait ScreenshotSource: Send + Sync {
    /// Raw file bytes; never partial
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveError>;

    /// Capture time of the screenshot
    async fn get_metadata(&self, file_id: &str) -> Result<ScreenshotMetadata, DriveError>;
}

pub struct DriveClient {
    http: reqwest::Client,
    credentials: Arc<CredentialManager>,
    base_url: Url,
}

impl DriveClient {
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<CredentialManager>,
        base_url: &str,
    ) -> Result<Self, DriveError> {
        let base_url = Url::parse(base_url).map_err(|e| DriveError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(DriveError::Url(format!("{} cannot be a base URL", base_url)));
        }
        Ok(Self {
            http,
            credentials,
            base_url,
        })
    }

    /// `{base}/drive/v3/files/{file_id}` with the id percent-encoded as one segment
    fn file_url(&self, file_id: &str) -> Result<Url, DriveError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DriveError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["drive", "v3", "files", file_id]);
        Ok(url)
    }

    async fn bearer_token(&self) -> Result<String, DriveError> {
        let credential = self.credentials.get_credentials().await?;
        Ok(credential.access_token()?.to_string())
    }
}

#[async_trait]
impl ScreenshotSource for DriveClient {
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveError> {
        let download_error = |reason: String| DriveError::Download {
            file_id: file_id.to_string(),
            reason,
        };

        let token = self.bearer_token().await?;
        let url = self.file_url(file_id)?;

        let response = self
            .http
            .get(url)
            .query(&[("alt", "media")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(download_error(format!("HTTP {}: {}", status, body)));
        }

        let total = response.content_length().filter(|len| *len > 0);
        let mut buffer =
            Vec::with_capacity(total.map_or(0, |len| (len as usize).min(MAX_PREALLOCATION)));
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_error(e.to_string()))?;
            buffer.extend_from_slice(&chunk);

            if let Some(total) = total {
                let progress = (buffer.len() as u64 * 100 / total).min(100);
                debug!(file_id, progress, "Download {}%.", progress);
            }
        }

        info!(file_id, bytes = buffer.len(), "Downloaded screenshot");
        Ok(buffer)
    }

    async fn get_metadata(&self, file_id: &str) -> Result<ScreenshotMetadata, DriveError> {
        let metadata_error = |reason: String| DriveError::Metadata {
            file_id: file_id.to_string(),
            reason,
        };

        let token = self.bearer_token().await?;
        let url = self.file_url(file_id)?;

        let response = self
            .http
            .get(url)
            .query(&[("fields", "*")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| metadata_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(metadata_error(format!("HTTP {}: {}", status, body)));
        }

        let file: Value = response
            .json()
            .await
            .map_err(|e| metadata_error(e.to_string()))?;

        let metadata = ScreenshotMetadata::from_drive_json(&file)?;
        debug!(file_id, time = %metadata.time, "Fetched screenshot metadata");
        Ok(metadata)
    }
}
