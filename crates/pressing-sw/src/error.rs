//! Error types for the offline agent.

use thiserror::Error;

/// Cache store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Precache of {url} failed: {reason}")]
    Precache { url: String, reason: String },

    #[error("Precache of {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("Store {store} over quota: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { store: String, needed: u64, quota: u64 },

    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Failures talking to client windows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Client not found: {0}")]
    NotFound(String),

    #[error("Client {0} is not a window")]
    NotAWindow(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Clients unavailable: {0}")]
    Unavailable(String),
}

/// Failures showing or closing notifications.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Show failed: {0}")]
    ShowFailed(String),
}

/// Configuration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Config IO error: {0}")]
    Io(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Anything an event handler can fail with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    StateError(String),
}

impl AgentError {
    /// Short category label for logs.
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::Cache(_) => "cache",
            AgentError::Client(_) => "client",
            AgentError::Notification(_) => "notification",
            AgentError::Config(_) => "config",
            AgentError::StateError(_) => "state",
        }
    }
}
