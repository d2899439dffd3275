//! Control channel used by the foreground page.
//!
//! Messages are JSON objects with a `type` field:
//!
//! | `type`         | Effect                               | Reply                 |
//! |----------------|--------------------------------------|-----------------------|
//! | `SKIP_WAITING` | ask the host to promote this version | none                  |
//! | `GET_VERSION`  | none                                 | `{"version": <tag>}`  |
//! | `CLEAR_CACHE`  | drop the current store               | `{"success": true}`   |
//!
//! Anything else is logged and ignored without a reply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::agent::AgentSignal;
use crate::cache::VersionedCacheStore;

/// A command from the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    SkipWaiting,
    GetVersion,
    ClearCache,
}

impl ControlRequest {
    /// Parse a message; unknown or malformed messages yield `None`.
    pub fn from_message(message: &JsonValue) -> Option<Self> {
        match Self::deserialize(message) {
            Ok(request) => Some(request),
            Err(e) => {
                warn!(
                    kind = message.get("type").and_then(JsonValue::as_str).unwrap_or("<none>"),
                    error = %e,
                    "Ignoring unknown control message"
                );
                None
            }
        }
    }
}

/// The answer sent back on the reply port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlReply {
    Version { version: String },
    Cleared { success: bool },
}

/// One-shot reply port supplied by the sender.
pub type ReplyPort = oneshot::Sender<ControlReply>;

/// Handles control messages for one agent version.
#[derive(Clone)]
pub struct ControlChannel {
    store: VersionedCacheStore,
    skip_waiting: Arc<AtomicBool>,
    signals: mpsc::UnboundedSender<AgentSignal>,
}

impl ControlChannel {
    pub fn new(store: VersionedCacheStore, signals: mpsc::UnboundedSender<AgentSignal>) -> Self {
        Self {
            store,
            skip_waiting: Arc::new(AtomicBool::new(false)),
            signals,
        }
    }

    /// Whether the page asked this version to skip waiting.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Handle `message`, answering on `reply_to` when the request has a reply.
    ///
    /// The reply is also returned. CLEAR_CACHE replies only after the store
    /// is gone.
    pub async fn handle(
        &self,
        message: &JsonValue,
        reply_to: Option<ReplyPort>,
    ) -> Option<ControlReply> {
        let request = ControlRequest::from_message(message)?;
        debug!(?request, "Control message");

        let reply = match request {
            ControlRequest::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::Release);
                info!(version = %self.store.tag(), "Skip waiting requested");
                let _ = self.signals.send(AgentSignal::SkipWaitingRequested {
                    version: self.store.tag().to_string(),
                });
                None
            }
            ControlRequest::GetVersion => Some(ControlReply::Version {
                version: self.store.tag().to_string(),
            }),
            ControlRequest::ClearCache => {
                let existed = self.store.delete_all().await;
                self.store.persist().await;
                info!(version = %self.store.tag(), existed, "Cache cleared");
                Some(ControlReply::Cleared { success: true })
            }
        };

        if let (Some(reply), Some(port)) = (reply.clone(), reply_to) {
            if port.send(reply).is_err() {
                debug!("Control reply port closed before reply");
            }
        }
        reply
    }
}
