//! JSON-lines event input.
//!
//! One object per line, discriminated by `kind`:
//!
//! ```text
//! {"kind":"fetch","url":"/api/orders","destination":"image"}
//! {"kind":"push","payload":{"type":"new_order","orderId":"123"}}
//! {"kind":"click","tag":"order-123","action":"view","data":{"url":"/pressing/orders"}}
//! {"kind":"close","tag":"promo","data":{"trackClose":true}}
//! {"kind":"message","type":"GET_VERSION"}
//! {"kind":"sync","tag":"outbox"}
//! ```

use http::Method;
use pressing_sw::{AgentConfig, AgentEvent, Destination, NotificationData, PushPayload, Request};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Errors turning a line into an event.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Bad URL {url}: {reason}")]
    BadUrl { url: String, reason: String },

    #[error("Bad method: {0}")]
    BadMethod(String),
}

/// An event as written in the input file.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HarnessEvent {
    Fetch {
        url: String,
        #[serde(default)]
        destination: Destination,
        #[serde(default)]
        method: Option<String>,
    },
    Push {
        #[serde(default)]
        payload: Option<JsonValue>,
    },
    Click {
        #[serde(default)]
        tag: Option<String>,
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        data: NotificationData,
    },
    Close {
        #[serde(default)]
        tag: Option<String>,
        #[serde(default)]
        data: NotificationData,
    },
    Message {
        #[serde(flatten)]
        message: Map<String, JsonValue>,
    },
    Sync {
        #[serde(default)]
        tag: Option<String>,
    },
}

impl HarnessEvent {
    pub fn parse(line: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Build the agent event; relative URLs resolve against the app origin.
    pub fn into_agent_event(self, config: &AgentConfig) -> Result<AgentEvent, EventError> {
        let default_tag = || config.notification.tag.clone();

        Ok(match self {
            HarnessEvent::Fetch {
                url,
                destination,
                method,
            } => {
                let resolved = config.resolve(&url).map_err(|e| EventError::BadUrl {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
                let mut request = Request::get(resolved).destination(destination);
                if let Some(method) = method {
                    request.method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                        .map_err(|_| EventError::BadMethod(method))?;
                }
                AgentEvent::Fetch {
                    request,
                    respond_to: None,
                }
            }
            HarnessEvent::Push { payload } => AgentEvent::Push {
                payload: match payload {
                    None | Some(JsonValue::Null) => PushPayload::empty(),
                    Some(JsonValue::String(text)) => PushPayload::from_text(&text),
                    Some(other) => PushPayload::from_text(&other.to_string()),
                },
            },
            HarnessEvent::Click { tag, action, data } => AgentEvent::NotificationClick {
                tag: tag.unwrap_or_else(default_tag),
                action,
                data,
            },
            HarnessEvent::Close { tag, data } => AgentEvent::NotificationClose {
                tag: tag.unwrap_or_else(default_tag),
                data,
            },
            HarnessEvent::Message { message } => AgentEvent::Message {
                message: JsonValue::Object(message),
                reply_to: None,
            },
            HarnessEvent::Sync { tag } => AgentEvent::Sync {
                tag: tag.unwrap_or_default(),
            },
        })
    }
}
