//! Notification interaction routing.
//!
//! Resolution is two lookup tables. A click on an action button goes
//! through [`ACTION_TABLE`]; a click on the notification body goes through
//! [`TYPE_TABLE`] keyed on `data.type`. Both have a fallback so every
//! (action, type) pair resolves to a target or an explicit dismissal.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::clients::{ClientHost, ClientMatchOptions, ClientType};
use crate::push::{NotificationData, NotificationDescriptor};

/// Order list path; an order id is appended for the detail page.
pub const ORDERS_PATH: &str = "/pressing/orders";

/// A user interaction with a rendered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEvent {
    /// Tag of the notification the user acted on.
    pub tag: String,
    /// Action button id, `None` for a click on the notification itself.
    pub action: Option<String>,
    pub data: NotificationData,
}

impl InteractionEvent {
    pub fn new(tag: impl Into<String>, action: Option<String>, data: NotificationData) -> Self {
        // Hosts report a body click as an empty action id.
        let action = action.filter(|a| !a.is_empty());
        Self {
            tag: tag.into(),
            action,
            data,
        }
    }

    pub fn from_descriptor(descriptor: &NotificationDescriptor, action: Option<String>) -> Self {
        Self::new(descriptor.tag.clone(), action, descriptor.data.clone())
    }
}

/// Where an interaction leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Navigate to this path or URL, relative to the agent's origin.
    Navigate(String),
    /// Close without navigating.
    Dismiss,
}

/// What the router did with an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Dismissed,
    /// An existing window was navigated and focused.
    Focused { client_id: String, url: Url },
    /// A new window was opened.
    Opened { client_id: String, url: Url },
    /// Client enumeration or focus failed; nothing was navigated.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// `data.url`, or the root.
    DataUrl,
    /// Order detail when `data.orderId` is set, order list otherwise.
    Orders,
    /// Order detail for a new order with an id, `data.url` otherwise.
    AcceptOrder,
    Section(&'static str),
    Dismiss,
}

const ACTION_TABLE: &[(&str, Target)] = &[
    ("view", Target::DataUrl),
    ("accept", Target::AcceptOrder),
    ("dismiss", Target::Dismiss),
];
const ACTION_FALLBACK: Target = Target::DataUrl;

const TYPE_TABLE: &[(&str, Target)] = &[
    ("new_order", Target::Orders),
    ("order_status_update", Target::Orders),
    ("payment_received", Target::Section("/pressing/payments")),
    ("new_review", Target::Section("/pressing/reviews")),
    ("promotion_alert", Target::Section("/promotions")),
];
const TYPE_FALLBACK: Target = Target::Section("/");

fn lookup(table: &[(&str, Target)], key: Option<&str>, fallback: Target) -> Target {
    key.and_then(|key| table.iter().find(|(k, _)| *k == key).map(|(_, t)| *t))
        .unwrap_or(fallback)
}

fn order_detail(data: &NotificationData) -> Option<String> {
    data.order_id
        .as_deref()
        .map(|id| format!("{}/{}", ORDERS_PATH, id))
}

impl Target {
    fn apply(self, data: &NotificationData) -> Navigation {
        let path = match self {
            Target::Dismiss => return Navigation::Dismiss,
            Target::DataUrl => data.url.clone().unwrap_or_else(|| "/".to_string()),
            Target::Orders => order_detail(data).unwrap_or_else(|| ORDERS_PATH.to_string()),
            Target::AcceptOrder if data.kind.as_deref() == Some("new_order") => {
                match order_detail(data) {
                    Some(path) => path,
                    None => return Target::DataUrl.apply(data),
                }
            }
            Target::AcceptOrder => return Target::DataUrl.apply(data),
            Target::Section(path) => path.to_string(),
        };
        Navigation::Navigate(path)
    }
}

/// Resolve an interaction without touching any window.
pub fn resolve(event: &InteractionEvent) -> Navigation {
    let target = match event.action.as_deref() {
        Some(action) => lookup(ACTION_TABLE, Some(action), ACTION_FALLBACK),
        None => lookup(TYPE_TABLE, event.data.kind.as_deref(), TYPE_FALLBACK),
    };
    target.apply(&event.data)
}

/// Routes interactions to a window on the agent's origin.
#[derive(Clone)]
pub struct InteractionRouter {
    origin: Url,
    clients: Arc<dyn ClientHost>,
}

impl InteractionRouter {
    pub fn new(origin: Url, clients: Arc<dyn ClientHost>) -> Self {
        Self { origin, clients }
    }

    /// Resolve `event` and bring a window to the target. Never fails:
    /// client errors are logged and the attempt is abandoned.
    pub async fn route(&self, event: &InteractionEvent) -> RouteOutcome {
        let path = match resolve(event) {
            Navigation::Dismiss => {
                debug!(tag = %event.tag, "Notification dismissed by action");
                return RouteOutcome::Dismissed;
            }
            Navigation::Navigate(path) => path,
        };

        let url = match self.origin.join(&path) {
            Ok(url) => url,
            Err(e) => {
                warn!(target_path = %path, error = %e, "Unresolvable navigation target");
                return RouteOutcome::Abandoned;
            }
        };

        let windows = match self
            .clients
            .match_all(ClientMatchOptions {
                include_uncontrolled: true,
                client_type: ClientType::Window,
            })
            .await
        {
            Ok(windows) => windows,
            Err(e) => {
                warn!(error = %e, "Client enumeration failed");
                return RouteOutcome::Abandoned;
            }
        };

        if let Some(window) = windows.iter().find(|c| c.same_origin(&self.origin)) {
            let focused = match self.clients.navigate(&window.id, &url).await {
                Ok(client) => self.clients.focus(&client.id).await,
                Err(e) => Err(e),
            };
            return match focused {
                Ok(client) => {
                    info!(client = %client.id, url = %url, "Focused existing window");
                    RouteOutcome::Focused {
                        client_id: client.id,
                        url,
                    }
                }
                Err(e) => {
                    warn!(client = %window.id, error = %e, "Could not focus window");
                    RouteOutcome::Abandoned
                }
            };
        }

        match self.clients.open_window(&url).await {
            Ok(client) => {
                info!(client = %client.id, url = %url, "Opened new window");
                RouteOutcome::Opened {
                    client_id: client.id,
                    url,
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Could not open window");
                RouteOutcome::Abandoned
            }
        }
    }
}

/// Close telemetry: reports whether a close was recorded.
pub fn record_close(event: &InteractionEvent) -> bool {
    if !event.data.track_close {
        return false;
    }
    info!(
        tag = %event.tag,
        kind = event.data.kind.as_deref().unwrap_or("unknown"),
        "Notification closed without interaction"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::clients::{Client, Clients};
    use crate::error::ClientError;

    fn data(kind: Option<&str>, order_id: Option<&str>, url: Option<&str>) -> NotificationData {
        NotificationData {
            kind: kind.map(String::from),
            order_id: order_id.map(String::from),
            url: url.map(String::from),
            ..Default::default()
        }
    }

    fn event(action: Option<&str>, data: NotificationData) -> InteractionEvent {
        InteractionEvent::new("t", action.map(String::from), data)
    }

    fn nav(path: &str) -> Navigation {
        Navigation::Navigate(path.to_string())
    }

    #[test]
    fn test_type_table() {
        let cases = [
            (data(Some("new_order"), Some("123"), None), "/pressing/orders/123"),
            (data(Some("new_order"), None, None), "/pressing/orders"),
            (data(Some("order_status_update"), Some("9"), None), "/pressing/orders/9"),
            (data(Some("order_status_update"), None, None), "/pressing/orders"),
            (data(Some("payment_received"), None, None), "/pressing/payments"),
            (data(Some("new_review"), None, None), "/pressing/reviews"),
            (data(Some("promotion_alert"), None, Some("/ignored")), "/promotions"),
            (data(Some("something_else"), None, None), "/"),
            (data(None, None, None), "/"),
        ];
        for (data, expected) in cases {
            assert_eq!(resolve(&event(None, data.clone())), nav(expected), "{:?}", data);
        }
    }

    #[test]
    fn test_action_table() {
        let with_url = data(Some("payment_received"), None, Some("/pressing/payments/7"));
        assert_eq!(resolve(&event(Some("view"), with_url.clone())), nav("/pressing/payments/7"));
        assert_eq!(resolve(&event(Some("view"), data(None, None, None))), nav("/"));
        assert_eq!(resolve(&event(Some("dismiss"), with_url.clone())), Navigation::Dismiss);
        assert_eq!(resolve(&event(Some("snooze"), with_url)), nav("/pressing/payments/7"));

        let order = data(Some("new_order"), Some("42"), Some("/elsewhere"));
        assert_eq!(resolve(&event(Some("accept"), order)), nav("/pressing/orders/42"));

        // accept outside a new order with an id falls back to data.url
        let no_id = data(Some("new_order"), None, Some("/pressing/orders"));
        assert_eq!(resolve(&event(Some("accept"), no_id)), nav("/pressing/orders"));
        let other = data(Some("new_review"), Some("42"), None);
        assert_eq!(resolve(&event(Some("accept"), other)), nav("/"));
    }

    #[test]
    fn test_every_pair_resolves() {
        let actions = [Some("view"), Some("accept"), Some("dismiss"), Some("other"), None];
        let kinds = [
            Some("new_order"),
            Some("order_status_update"),
            Some("payment_received"),
            Some("new_review"),
            Some("promotion_alert"),
            Some("unknown"),
            None,
        ];
        for action in actions {
            for kind in kinds {
                for order_id in [None, Some("1")] {
                    let result = resolve(&event(action, data(kind, order_id, None)));
                    match result {
                        Navigation::Dismiss => assert_eq!(action, Some("dismiss")),
                        Navigation::Navigate(path) => assert!(path.starts_with('/')),
                    }
                }
            }
        }
    }

    #[test]
    fn test_empty_action_is_body_click() {
        let e = InteractionEvent::new("t", Some(String::new()), data(Some("new_review"), None, None));
        assert_eq!(e.action, None);
        assert_eq!(resolve(&e), nav("/pressing/reviews"));
    }

    fn origin() -> Url {
        Url::parse("http://localhost:3000/").unwrap()
    }

    #[tokio::test]
    async fn test_focuses_existing_same_origin_window() {
        let clients = Arc::new(Clients::new());
        clients
            .add(Client::window("other", Url::parse("https://elsewhere.test/").unwrap()))
            .await;
        clients
            .add(Client::window("home", Url::parse("http://localhost:3000/dashboard").unwrap()))
            .await;

        let router = InteractionRouter::new(origin(), clients.clone());
        let outcome = router
            .route(&event(None, data(Some("new_order"), Some("123"), None)))
            .await;

        let expected = Url::parse("http://localhost:3000/pressing/orders/123").unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Focused {
                client_id: "home".into(),
                url: expected.clone()
            }
        );
        let home = clients.get("home").await.unwrap();
        assert!(home.focused);
        assert_eq!(home.url, expected);
        assert!(!clients.get("other").await.unwrap().focused);
    }

    #[tokio::test]
    async fn test_opens_window_when_none_match() {
        let clients = Arc::new(Clients::new());
        let router = InteractionRouter::new(origin(), clients.clone());

        let outcome = router
            .route(&event(None, data(Some("payment_received"), None, None)))
            .await;

        match outcome {
            RouteOutcome::Opened { client_id, url } => {
                assert_eq!(url.as_str(), "http://localhost:3000/pressing/payments");
                assert!(clients.get(&client_id).await.unwrap().focused);
            }
            other => panic!("expected a new window, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dismiss_touches_no_window() {
        let clients = Arc::new(Clients::new());
        let router = InteractionRouter::new(origin(), clients.clone());

        let outcome = router.route(&event(Some("dismiss"), data(None, None, None))).await;
        assert_eq!(outcome, RouteOutcome::Dismissed);
        assert_eq!(clients.len().await, 0);
    }

    struct BrokenHost;

    #[async_trait]
    impl ClientHost for BrokenHost {
        async fn match_all(&self, _: ClientMatchOptions) -> Result<Vec<Client>, ClientError> {
            Err(ClientError::Unavailable("host gone".into()))
        }
        async fn navigate(&self, id: &str, _: &Url) -> Result<Client, ClientError> {
            Err(ClientError::NotFound(id.into()))
        }
        async fn focus(&self, id: &str) -> Result<Client, ClientError> {
            Err(ClientError::NotFound(id.into()))
        }
        async fn open_window(&self, _: &Url) -> Result<Client, ClientError> {
            Err(ClientError::Unavailable("host gone".into()))
        }
        async fn claim(&self, _: &str) -> Result<usize, ClientError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_client_failure_is_abandoned() {
        let router = InteractionRouter::new(origin(), Arc::new(BrokenHost));
        let outcome = router.route(&event(Some("view"), data(None, None, None))).await;
        assert_eq!(outcome, RouteOutcome::Abandoned);
    }

    #[test]
    fn test_record_close() {
        let mut tracked = data(Some("new_order"), None, None);
        assert!(!record_close(&event(None, tracked.clone())));
        tracked.track_close = true;
        assert!(record_close(&event(None, tracked)));
    }
}
