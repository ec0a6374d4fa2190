//! In-process secret store
//!
//! Keeps every written version so callers can inspect write-backs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{SecretError, SecretProvider};

#[derive(Default)]
pub struct MemorySecretProvider {
    versions: Mutex<HashMap<String, Vec<String>>>,
}

impl MemorySecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a secret (builder style)
    pub fn with_secret(self, name: &str, value: &str) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&self, name: &str, value: &str) {
        let mut versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        versions
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// All versions of a secret, oldest first
    pub fn versions(&self, name: &str) -> Vec<String> {
        let versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        versions.get(name).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SecretProvider for MemorySecretProvider {
    async fn get(&self, name: &str) -> Result<String, SecretError> {
        let versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        versions
            .get(name)
            .and_then(|v| v.last())
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }

    async fn put(&self, name: &str, payload: &str) -> Result<(), SecretError> {
        self.insert(name, payload);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
