//! TOML file secret store for local development
//!
//! The file holds flat `name = "value"` pairs. Writes replace the value and
//! rewrite the file atomically (temp file + rename, 0600 on Unix).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use super::{SecretError, SecretProvider};

pub struct FileSecretProvider {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSecretProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_table(&self) -> Result<toml::Table, SecretError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(toml::Table::new()),
            Err(e) => return Err(SecretError::Io(e)),
        };

        toml::from_str::<toml::Table>(&content)
            .map_err(|e| SecretError::Malformed(format!("{}: {}", self.path.display(), e)))
    }

    async fn write_table(&self, table: &toml::Table) -> Result<(), SecretError> {
        let content = toml::to_string(table)
            .map_err(|e| SecretError::Malformed(format!("serialize secrets: {}", e)))?;

        let tmp = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SecretProvider for FileSecretProvider {
    async fn get(&self, name: &str) -> Result<String, SecretError> {
        let table = self.read_table().await?;
        match table.get(name) {
            Some(toml::Value::String(value)) => Ok(value.clone()),
            Some(_) => Err(SecretError::Malformed(format!("{} is not a string", name))),
            None => Err(SecretError::NotFound(name.to_string())),
        }
    }

    async fn put(&self, name: &str, payload: &str) -> Result<(), SecretError> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.read_table().await?;
        table.insert(name.to_string(), toml::Value::String(payload.to_string()));
        self.write_table(&table).await?;
        info!(secret = name, "Wrote secret to {}", self.path.display());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
