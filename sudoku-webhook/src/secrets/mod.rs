//! Secret storage
//!
//! Every component that needs a credential receives the same
//! `Arc<dyn SecretProvider>`, built once in `main`.

use async_trait::async_trait;
use thiserror::Error;

mod file;
mod gcp;
mod memory;

pub use file::FileSecretProvider;
pub use gcp::{discover_project_id, GcpSecretManager};
pub use memory::MemorySecretProvider;

/// Secret names consumed by the service
pub mod names {
    /// Anthropic API key
    pub const CLAUDE_API_KEY: &str = "claude-api-key";
    /// Postgres connection string
    pub const DATABASE_URL: &str = "neon-database-connection-string";
    /// Google Drive OAuth credential (JSON)
    pub const GOOGLE_DRIVE_TOKEN: &str = "google-drive-token";
    /// Shared secret expected in the webhook's `X-API-Key` header
    pub const WEBHOOK_API_KEY: &str = "make-api-key";
}

/// Secret store errors
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret store denied access: {0}")]
    Auth(String),

    #[error("secret store request failed: {0}")]
    Transport(String),

    #[error("malformed secret payload: {0}")]
    Malformed(String),

    #[error("secret file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Named-secret store with write-through versioning
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Latest value of the named secret
    async fn get(&self, name: &str) -> Result<String, SecretError>;

    /// Store `payload` as the new latest version of the named secret
    async fn put(&self, name: &str, payload: &str) -> Result<(), SecretError>;

    /// Backend identifier for startup logging
    fn backend_name(&self) -> &'static str;
}
