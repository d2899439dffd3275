//! Push payload normalization.
//!
//! A push message is opaque bytes: usually JSON, sometimes plain text,
//! occasionally nothing at all. [`PushPayloadNormalizer::normalize`] turns
//! any of these into a renderable [`NotificationDescriptor`] and never fails.
//!
//! JSON objects are merged field by field over the configured defaults.
//! Known fields are coerced to their expected type; anything that cannot be
//! coerced, and every unknown field, is dropped.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, trace};

use crate::config::NotificationDefaults;

/// Raw message delivered by the push transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushPayload(Option<Bytes>);

impl PushPayload {
    /// A push without a body.
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(Some(bytes.into()))
    }

    pub fn from_text(text: &str) -> Self {
        Self(Some(Bytes::copy_from_slice(text.as_bytes())))
    }

    /// Body decoded as text, replacing invalid UTF-8.
    pub fn text(&self) -> Option<String> {
        self.0
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Application meaning carried by a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationData {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub require_interaction: bool,
    pub silent: bool,
    pub track_close: bool,
}

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Normalized, always-renderable notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDescriptor {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl NotificationDescriptor {
    /// Whether the notification stays until the user acts on it.
    pub fn require_interaction(&self) -> bool {
        self.data.require_interaction
    }

    /// Whether the notification is shown without sound or vibration.
    pub fn silent(&self) -> bool {
        self.data.silent
    }
}

/// Builds descriptors from push payloads.
#[derive(Debug, Clone)]
pub struct PushPayloadNormalizer {
    defaults: NotificationDefaults,
}

impl PushPayloadNormalizer {
    pub fn new(defaults: NotificationDefaults) -> Self {
        Self { defaults }
    }

    /// The descriptor shown when a payload carries nothing usable.
    pub fn default_descriptor(&self) -> NotificationDescriptor {
        NotificationDescriptor {
            title: self.defaults.app_name.clone(),
            body: self.defaults.body.clone(),
            icon: self.defaults.icon.clone(),
            badge: self.defaults.badge.clone(),
            tag: self.defaults.tag.clone(),
            data: NotificationData::default(),
            actions: Vec::new(),
        }
    }

    /// Turn any payload into a descriptor.
    pub fn normalize(&self, payload: &PushPayload) -> NotificationDescriptor {
        let mut descriptor = self.default_descriptor();

        let Some(text) = payload.text() else {
            trace!("Push without payload, using defaults");
            return descriptor;
        };

        match serde_json::from_str::<JsonValue>(&text) {
            Ok(JsonValue::Object(fields)) => merge(&mut descriptor, &fields),
            Ok(JsonValue::String(message)) => set_text(&mut descriptor.body, Some(&message)),
            Ok(_) | Err(_) => {
                debug!(len = text.len(), "Push payload is not a JSON object, using it as body");
                set_text(&mut descriptor.body, Some(&text));
            }
        }

        descriptor
    }
}

fn merge(descriptor: &mut NotificationDescriptor, fields: &Map<String, JsonValue>) {
    set_text(&mut descriptor.title, fields.get("title").and_then(coerce_string).as_deref());
    set_text(&mut descriptor.body, fields.get("body").and_then(coerce_string).as_deref());
    set_text(&mut descriptor.icon, fields.get("icon").and_then(coerce_string).as_deref());
    set_text(&mut descriptor.badge, fields.get("badge").and_then(coerce_string).as_deref());
    set_text(&mut descriptor.tag, fields.get("tag").and_then(coerce_string).as_deref());

    let lookup = |key: &str| data_field(fields, key);
    let data = &mut descriptor.data;
    data.kind = lookup("type").and_then(coerce_string);
    data.order_id = lookup("orderId").and_then(coerce_string);
    data.url = lookup("url").and_then(coerce_string);
    data.require_interaction = lookup("requireInteraction").and_then(coerce_bool).unwrap_or(false);
    data.silent = lookup("silent").and_then(coerce_bool).unwrap_or(false);
    data.track_close = lookup("trackClose").and_then(coerce_bool).unwrap_or(false);

    if let Some(actions) = fields.get("actions").and_then(JsonValue::as_array) {
        descriptor.actions = actions.iter().filter_map(coerce_action).collect();
    }
}

/// Routing fields may sit in `data` or at the top level; `data` wins.
fn data_field<'a>(fields: &'a Map<String, JsonValue>, key: &str) -> Option<&'a JsonValue> {
    fields
        .get("data")
        .and_then(JsonValue::as_object)
        .and_then(|data| data.get(key))
        .or_else(|| fields.get(key))
}

/// Replace `slot` with `value` when it has visible content.
fn set_text(slot: &mut String, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        *slot = value.to_string();
    }
}

fn coerce_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_bool(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        JsonValue::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn coerce_action(value: &JsonValue) -> Option<NotificationAction> {
    let fields = value.as_object()?;
    let action = fields.get("action").and_then(coerce_string)?;
    let title = fields
        .get("title")
        .and_then(coerce_string)
        .unwrap_or_else(|| action.clone());
    Some(NotificationAction {
        action,
        title,
        icon: fields.get("icon").and_then(coerce_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> PushPayloadNormalizer {
        PushPayloadNormalizer::new(NotificationDefaults::default())
    }

    #[test]
    fn test_empty_payload_uses_defaults() {
        let n = normalizer();
        let descriptor = n.normalize(&PushPayload::empty());
        assert_eq!(descriptor, n.default_descriptor());
        assert!(!descriptor.title.is_empty());
        assert!(!descriptor.body.is_empty());
    }

    #[test]
    fn test_plain_text_becomes_body() {
        let defaults = NotificationDefaults::default();
        let descriptor = normalizer().normalize(&PushPayload::from_text("Hello"));

        assert_eq!(descriptor.title, defaults.app_name);
        assert_eq!(descriptor.body, "Hello");
        assert_eq!(descriptor.icon, defaults.icon);
        assert_eq!(descriptor.badge, defaults.badge);
        assert_eq!(descriptor.tag, "default");
    }

    #[test]
    fn test_json_object_merges_over_defaults() {
        let payload = PushPayload::from_text(
            r#"{
                "title": "Nouvelle commande",
                "body": "Commande #123",
                "tag": "order-123",
                "data": {"type": "new_order", "orderId": 123, "requireInteraction": true},
                "actions": [
                    {"action": "accept", "title": "Accepter"},
                    {"action": "dismiss"},
                    {"title": "no action id"},
                    "garbage"
                ],
                "unknown": {"nested": true}
            }"#,
        );
        let descriptor = normalizer().normalize(&payload);

        assert_eq!(descriptor.title, "Nouvelle commande");
        assert_eq!(descriptor.body, "Commande #123");
        assert_eq!(descriptor.tag, "order-123");
        assert_eq!(descriptor.icon, NotificationDefaults::default().icon);
        assert_eq!(descriptor.data.kind.as_deref(), Some("new_order"));
        assert_eq!(descriptor.data.order_id.as_deref(), Some("123"));
        assert!(descriptor.require_interaction());
        assert!(!descriptor.silent());
        assert_eq!(descriptor.actions.len(), 2);
        assert_eq!(descriptor.actions[1].title, "dismiss");
    }

    #[test]
    fn test_top_level_routing_fields_lift_into_data() {
        let payload = PushPayload::from_text(r#"{"type":"new_order","orderId":"123"}"#);
        let descriptor = normalizer().normalize(&payload);

        assert_eq!(descriptor.data.kind.as_deref(), Some("new_order"));
        assert_eq!(descriptor.data.order_id.as_deref(), Some("123"));
        assert_eq!(descriptor.body, NotificationDefaults::default().body);
    }

    #[test]
    fn test_wrongly_typed_fields_are_dropped() {
        let payload = PushPayload::from_text(
            r#"{"title": "", "body": ["x"], "icon": null, "data": {"silent": "maybe", "trackClose": "true"}}"#,
        );
        let defaults = NotificationDefaults::default();
        let descriptor = normalizer().normalize(&payload);

        assert_eq!(descriptor.title, defaults.app_name);
        assert_eq!(descriptor.body, defaults.body);
        assert_eq!(descriptor.icon, defaults.icon);
        assert!(!descriptor.silent());
        assert!(descriptor.data.track_close);
    }

    #[test]
    fn test_json_without_known_fields() {
        let descriptor = normalizer().normalize(&PushPayload::from_text("{}"));
        assert_eq!(descriptor, normalizer().default_descriptor());
    }

    #[test]
    fn test_non_object_json() {
        let n = normalizer();
        assert_eq!(n.normalize(&PushPayload::from_text(r#""quoted""#)).body, "quoted");
        assert_eq!(n.normalize(&PushPayload::from_text("42")).body, "42");
        assert_eq!(n.normalize(&PushPayload::from_text("[1,2]")).body, "[1,2]");
    }

    #[test]
    fn test_whitespace_and_invalid_utf8_never_yield_empty_body() {
        let n = normalizer();
        let descriptor = n.normalize(&PushPayload::from_text("   \n"));
        assert_eq!(descriptor.body, NotificationDefaults::default().body);

        let descriptor = n.normalize(&PushPayload::from_bytes(vec![0xff, 0xfe, b'h', b'i']));
        assert!(!descriptor.body.trim().is_empty());
        assert!(!descriptor.title.is_empty());
    }

    #[test]
    fn test_truncated_json_is_text() {
        let descriptor = normalizer().normalize(&PushPayload::from_text(r#"{"title": "cut"#));
        assert_eq!(descriptor.body, r#"{"title": "cut"#);
    }

    #[test]
    fn test_data_serializes_with_wire_names() {
        let data = NotificationData {
            kind: Some("new_order".into()),
            order_id: Some("7".into()),
            track_close: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["type"], "new_order");
        assert_eq!(json["orderId"], "7");
        assert_eq!(json["trackClose"], true);
        assert!(json.get("url").is_none());
    }
}
