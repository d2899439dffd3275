//! Agent configuration
//!
//! One [`AgentConfig`] is built when the agent is deployed and handed to
//! every component; nothing is read from process-wide state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name of the current cache generation
    pub version_tag: String,

    /// Application origin; relative paths resolve against it
    pub origin: Url,

    /// Resources written to the store at install time
    pub precache: Vec<String>,

    /// Path segment that marks an API call
    pub api_marker: String,

    /// Optional per-store size limit in bytes
    pub store_quota_bytes: Option<u64>,

    /// Where cache stores are persisted between runs
    pub snapshot_path: Option<PathBuf>,

    /// Notification defaults
    pub notification: NotificationDefaults,
}

/// Fallback values for notifications built from push payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    /// Title used when the payload has none
    pub app_name: String,

    /// Body used when the payload has none
    pub body: String,

    pub icon: String,

    pub badge: String,

    /// Tag used when the payload has none
    pub tag: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            version_tag: "pressing-cache-v1.0.0".to_string(),
            origin: Url::parse("http://localhost:3000/").expect("static origin is valid"),
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192x192.png".to_string(),
                "/icons/icon-512x512.png".to_string(),
            ],
            api_marker: "/api/".to_string(),
            store_quota_bytes: None,
            snapshot_path: None,
            notification: NotificationDefaults::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            app_name: "Pressing".to_string(),
            body: "Vous avez une nouvelle notification".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/badge-72x72.png".to_string(),
            tag: "default".to_string(),
        }
    }
}

impl AgentConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version_tag.trim().is_empty() {
            return Err(ConfigError::Invalid("version_tag is empty".to_string()));
        }
        if self.origin.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "origin {} cannot be a base URL",
                self.origin
            )));
        }
        if self.api_marker.is_empty() {
            return Err(ConfigError::Invalid("api_marker is empty".to_string()));
        }
        if self.notification.app_name.trim().is_empty() || self.notification.body.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "notification defaults need a title and a body".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a path or URL against the origin
    pub fn resolve(&self, target: &str) -> Result<Url, ConfigError> {
        self.origin
            .join(target)
            .map_err(|e| ConfigError::Invalid(format!("{target}: {e}")))
    }

    /// The precache manifest as absolute URLs, in declaration order
    pub fn manifest_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.precache.iter().map(|entry| self.resolve(entry)).collect()
    }
}
