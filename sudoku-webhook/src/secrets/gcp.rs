//! Google Secret Manager backend (REST v1)
//!
//! Authenticates with the runtime service account: an access token is read
//! from the compute metadata server on every call.

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{SecretError, SecretProvider};

const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/project-id";
const PROJECT_ID_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Serialize, Deserialize)]
struct SecretPayload {
    data: String,
}

#[derive(Serialize)]
struct AddSecretVersionRequest {
    payload: SecretPayload,
}

pub struct GcpSecretManager {
    http: reqwest::Client,
    base_url: String,
    metadata_url: String,
    project_id: String,
}

impl GcpSecretManager {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        metadata_url: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            metadata_url: metadata_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// `projects/{project}/secrets/{name}`
    fn secret_path(&self, name: &str) -> String {
        format!("projects/{}/secrets/{}", self.project_id, name)
    }

    async fn access_token(&self) -> Result<String, SecretError> {
        let response = self
            .http
            .get(format!("{}{}", self.metadata_url, TOKEN_PATH))
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .send()
            .await
            .map_err(|e| SecretError::Auth(format!("metadata token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SecretError::Auth(format!(
                "metadata server returned HTTP {} for service account token",
                status
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| SecretError::Auth(format!("invalid metadata token response: {}", e)))?;
        Ok(token.access_token)
    }
}

/// Map a non-success Secret Manager response onto the error taxonomy.
fn status_error(status: StatusCode, name: &str, body: String) -> SecretError {
    match status {
        StatusCode::NOT_FOUND => SecretError::NotFound(name.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SecretError::Auth(format!("HTTP {} for {}: {}", status, name, body))
        }
        _ => SecretError::Transport(format!("HTTP {} for {}: {}", status, name, body)),
    }
}

#[async_trait]
impl SecretProvider for GcpSecretManager {
    async fn get(&self, name: &str) -> Result<String, SecretError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v1/{}/versions/latest:access",
            self.base_url,
            self.secret_path(name)
        );

        debug!(secret = name, "Accessing secret version");
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SecretError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, name, body));
        }

        let version: AccessSecretVersionResponse = response
            .json()
            .await
            .map_err(|e| SecretError::Malformed(format!("{}: {}", name, e)))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(version.payload.data.as_bytes())
            .map_err(|e| SecretError::Malformed(format!("{}: {}", name, e)))?;

        String::from_utf8(bytes).map_err(|e| SecretError::Malformed(format!("{}: {}", name, e)))
    }

    async fn put(&self, name: &str, payload: &str) -> Result<(), SecretError> {
        let token = self.access_token().await?;
        let url = format!("{}/v1/{}:addVersion", self.base_url, self.secret_path(name));
        let body = AddSecretVersionRequest {
            payload: SecretPayload {
                data: base64::engine::general_purpose::STANDARD.encode(payload.as_bytes()),
            },
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SecretError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, name, body));
        }

        info!(secret = name, "Added new secret version");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "gcp-secret-manager"
    }
}

/// Ask the metadata server which project this instance runs in.
///
/// Returns `None` when the server is unreachable or answers with anything but
/// 200, e.g. when running outside Google Cloud.
pub async fn discover_project_id(http: &reqwest::Client, metadata_url: &str) -> Option<String> {
    let url = format!("{}{}", metadata_url.trim_end_matches('/'), PROJECT_ID_PATH);

    let response = match http
        .get(url)
        .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
        .timeout(PROJECT_ID_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!("Failed to get project ID from metadata service: {}", e);
            return None;
        }
    };

    if response.status() != StatusCode::OK {
        info!(
            "Failed to get project ID from metadata service, HTTP {}",
            response.status()
        );
        return None;
    }

    match response.text().await {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to read project ID response: {}", e);
            None
        }
    }
}
