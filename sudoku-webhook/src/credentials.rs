//! Google Drive OAuth credential management
//!
//! The credential lives in the secret store as the JSON document Google's
//! `authorized_user` serialisation produces. Reading it may refresh it: an
//! expired credential with a refresh token is exchanged at `token_uri` and the
//! result written back as a new secret version. Nothing is cached between
//! calls, so concurrent refreshes race and the last write wins.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::secrets::{names, SecretError, SecretProvider};

/// Refresh this long before the recorded expiry
const EXPIRY_SKEW_SECS: i64 = 300;
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("credential refresh failed: {0}")]
    Auth(String),

    #[error("credential has no access token")]
    MissingAccessToken,
}

/// OAuth user credential for Drive access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthCredential {
    /// Access token
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default, deserialize_with = "scopes_from_list_or_string")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Keys we do not interpret (`universe_domain`, `account`, ...), kept on write-back
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn scopes_from_list_or_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        List(Vec<String>),
        Joined(String),
        Null(()),
    }

    Ok(match Scopes::deserialize(deserializer)? {
        Scopes::List(list) => list,
        Scopes::Joined(joined) => joined.split_whitespace().map(str::to_string).collect(),
        Scopes::Null(()) => Vec::new(),
    })
}

impl OAuthCredential {
    /// Expired when past `expiry` minus the skew. Without a recorded expiry the
    /// credential counts as expired only if it has no access token at all.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry - Duration::seconds(EXPIRY_SKEW_SECS),
            None => self.token.is_none(),
        }
    }

    pub fn access_token(&self) -> Result<&str, CredentialError> {
        self.token.as_deref().ok_or(CredentialError::MissingAccessToken)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Loads, refreshes and persists the Drive credential
pub struct CredentialManager {
    secrets: Arc<dyn SecretProvider>,
    http: reqwest::Client,
}

impl CredentialManager {
    pub fn new(secrets: Arc<dyn SecretProvider>, http: reqwest::Client) -> Self {
        Self { secrets, http }
    }

    /// Current credential, refreshed and written back if it had expired.
    pub async fn get_credentials(&self) -> Result<OAuthCredential, CredentialError> {
        let raw = self.secrets.get(names::GOOGLE_DRIVE_TOKEN).await?;
        let mut credential: OAuthCredential =
            serde_json::from_str(&raw).map_err(|e| CredentialError::Malformed(e.to_string()))?;

        let now = Utc::now();
        if !credential.is_expired(now) {
            debug!("Drive credential still valid");
            return Ok(credential);
        }

        if credential.refresh_token.is_none() {
            warn!("Drive credential expired and has no refresh token");
            return Ok(credential);
        }

        self.refresh(&mut credential, now).await?;

        let serialized = serde_json::to_string(&credential)
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        self.secrets
            .put(names::GOOGLE_DRIVE_TOKEN, &serialized)
            .await?;

        info!(
            expiry = ?credential.expiry,
            "Refreshed Drive credential and stored new version"
        );
        Ok(credential)
    }

    async fn refresh(
        &self,
        credential: &mut OAuthCredential,
        now: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or_else(|| CredentialError::Auth("no refresh token".to_string()))?;
        let client_id = credential
            .client_id
            .clone()
            .ok_or_else(|| CredentialError::Auth("credential has no client_id".to_string()))?;
        let client_secret = credential
            .client_secret
            .clone()
            .ok_or_else(|| CredentialError::Auth("credential has no client_secret".to_string()))?;

        let params = [
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        let response = self
            .http
            .post(&credential.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| CredentialError::Auth(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::Auth(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(CredentialError::Auth(format!(
                "Token refresh failed (HTTP {}): {}",
                status, body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| CredentialError::Auth(format!("Failed to parse token response: {}", e)))?;

        if let Some(error) = token.error {
            let desc = token.error_description.unwrap_or_default();
            return Err(CredentialError::Auth(format!("OAuth error: {} - {}", error, desc)));
        }

        let access_token = token
            .access_token
            .ok_or_else(|| CredentialError::Auth("No access_token in response".to_string()))?;

        credential.token = Some(access_token);
        credential.expiry = token.expires_in.map(|secs| now + Duration::seconds(secs));
        if let Some(refresh_token) = token.refresh_token {
            credential.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = token.scope {
            credential.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
        Ok(())
    }
}
