//! Sync settings shared by the client facade and the CLI.
//!
//! Settings are read from a JSON file. Missing files and missing keys fall back
//! to defaults, unknown keys are rejected.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_STORAGE_NAMESPACE: &str = "ebb";
const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Tunables for the offline queue and transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    /// GraphQL HTTP endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Prefix for every key the queue writes to storage
    #[serde(default = "default_storage_namespace")]
    pub storage_namespace: String,
    /// Re-submissions allowed for one conflicting replay before it fails
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    /// Per-request transport timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_storage_namespace() -> String {
    DEFAULT_STORAGE_NAMESPACE.to_string()
}

const fn default_max_conflict_retries() -> u32 {
    DEFAULT_MAX_CONFLICT_RETRIES
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            storage_namespace: default_storage_namespace(),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SyncSettings {
    /// Load settings, returning defaults when `path` does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&raw)?;
        settings.normalize();
        settings.validate()?;
        Ok(settings)
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        normalized.validate()?;
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Override the endpoint when `value` is non-blank.
    #[must_use]
    pub fn with_endpoint(mut self, value: Option<String>) -> Self {
        if let Some(endpoint) = normalize_text_option(value) {
            self.endpoint = Some(endpoint);
        }
        self
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            if !is_http_url(endpoint) {
                return Err(Error::InvalidInput(
                    "endpoint must include http:// or https://".to_string(),
                ));
            }
        }
        if self.storage_namespace.is_empty() {
            return Err(Error::InvalidInput(
                "storage_namespace must not be empty".to_string(),
            ));
        }
        if self.max_conflict_retries == 0 {
            return Err(Error::InvalidInput(
                "max_conflict_retries must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.endpoint = normalize_text_option(self.endpoint.take())
            .map(|endpoint| endpoint.trim_end_matches('/').to_string());
        self.storage_namespace = normalize_text_option(Some(self.storage_namespace.clone()))
            .unwrap_or_else(default_storage_namespace);
    }
}
