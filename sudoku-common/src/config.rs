//! Configuration loading
//!
//! Resolution follows the usual priority order:
//! 1. Command-line argument (highest priority, applied by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: the service starts with defaults
//! and reports that it did so.

use crate::{Error, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SUDOKU_CONFIG";
/// Environment variable overriding the Google Cloud project id
pub const PROJECT_ID_ENV: &str = "GOOGLE_CLOUD_PROJECT";

const CONFIG_DIR_NAME: &str = "sudoku-webhook";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub google: GoogleConfig,
    pub secrets: SecretsConfig,
    pub inference: InferenceConfig,
    pub image: ImageConfig,
    pub database: DatabaseConfig,
    /// File this configuration was read from; `None` means built-in defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Listen address; `host` must be an IPv4 or IPv6 literal.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.trim().parse().map_err(|e| {
            Error::Config(format!("server.host {:?} is not an IP address: {}", self.host, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Google endpoints and project
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// Project id; falls back to `GOOGLE_CLOUD_PROJECT`, then the metadata server
    pub project_id: Option<String>,
    pub secret_manager_url: String,
    pub drive_url: String,
    pub metadata_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            secret_manager_url: "https://secretmanager.googleapis.com".to_string(),
            drive_url: "https://www.googleapis.com".to_string(),
            metadata_url: "http://metadata.google.internal".to_string(),
        }
    }
}

/// Where secrets come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    /// Google Secret Manager
    #[default]
    Gcp,
    /// Local TOML file of `name = "value"` pairs (development only)
    File,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub backend: SecretBackend,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com".to_string(),
            // cheapest model that reads the completion screen reliably
            model: "claude-3-5-haiku-latest".to_string(),
            max_tokens: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { jpeg_quality: 85 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// How long an insert waits for a connection before failing
    pub acquire_timeout_secs: u64,
    /// Run `CREATE TABLE IF NOT EXISTS` at startup
    pub ensure_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 2,
            acquire_timeout_secs: 5,
            ensure_schema: true,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl TomlConfig {
    /// Parse a config file's contents and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path. The file must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration.
    ///
    /// An explicit path (CLI or `SUDOKU_CONFIG`) must exist. Otherwise the
    /// platform locations are tried and defaults are used when none exist.
    /// Runs before logging is initialised, so the chosen file is recorded in
    /// `source` for the caller to report.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        let path = cli_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) => {
                let mut config = Self::load(&path)?;
                config.source = Some(path);
                config
            }
            None => TomlConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables take priority over the TOML file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(project) = std::env::var(PROJECT_ID_ENV) {
            if !project.trim().is_empty() {
                self.google.project_id = Some(project);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(Error::Config(format!(
                "image.jpeg_quality must be between 1 and 100, got {}",
                self.image.jpeg_quality
            )));
        }
        if self.inference.max_tokens == 0 {
            return Err(Error::Config("inference.max_tokens must be positive".to_string()));
        }
        if self.inference.model.trim().is_empty() {
            return Err(Error::Config("inference.model must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be positive".to_string(),
            ));
        }
        if self.database.acquire_timeout_secs == 0 {
            return Err(Error::Config(
                "database.acquire_timeout_secs must be positive".to_string(),
            ));
        }
        if self.secrets.backend == SecretBackend::File && self.secrets.file.is_none() {
            return Err(Error::Config(
                "secrets.file is required when secrets.backend = \"file\"".to_string(),
            ));
        }
        Ok(())
    }
}

/// First existing config file among the platform locations
///
/// Linux: `~/.config/sudoku-webhook/config.toml`, then
/// `/etc/sudoku-webhook/config.toml`.
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc").join(CONFIG_DIR_NAME).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
