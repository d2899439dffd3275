//! End-to-end behaviour of the agent through its event dispatcher.

use std::sync::Arc;

use pressing_net::{Fixture, FixtureFetcher};
use pressing_sw::{
    Agent, AgentConfig, AgentEvent, AgentHost, CacheStorage, Client, Clients, ControlReply,
    Destination, EventOutcome, Handled, NotificationCenter, NotificationData, PushPayload,
    Registration, Request, Response, RouteOutcome, SharedCacheStorage,
};
use serde_json::json;
use tokio::sync::oneshot;
use url::Url;

const ORIGIN: &str = "http://localhost:3000";

fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

fn config(tag: &str) -> AgentConfig {
    AgentConfig {
        version_tag: tag.to_string(),
        precache: vec![
            "/".into(),
            "/index.html".into(),
            "/manifest.json".into(),
            "/icons/icon-192x192.png".into(),
        ],
        ..AgentConfig::default()
    }
}

fn network() -> Arc<FixtureFetcher> {
    let fetcher = Arc::new(FixtureFetcher::new());
    fetcher.route(&url("/"), Fixture::ok("<html>home</html>"));
    fetcher.route(&url("/index.html"), Fixture::ok("<html>index</html>"));
    fetcher.route(&url("/manifest.json"), Fixture::ok("{}"));
    fetcher.route(&url("/icons/icon-192x192.png"), Fixture::ok("png"));
    fetcher
}

struct Harness {
    agent: Agent,
    fetcher: Arc<FixtureFetcher>,
    clients: Arc<Clients>,
    notifications: Arc<NotificationCenter>,
}

async fn activated(tag: &str, caches: SharedCacheStorage) -> Harness {
    let fetcher = network();
    let clients = Arc::new(Clients::new());
    let notifications = Arc::new(NotificationCenter::new());
    let host = AgentHost::new(fetcher.clone(), caches)
        .with_clients(clients.clone())
        .with_notifications(notifications.clone());
    let (agent, _signals) = Agent::new(config(tag), host).unwrap();

    assert!(agent.dispatch(AgentEvent::Install).await.is_completed());
    assert!(agent.dispatch(AgentEvent::Activate).await.is_completed());

    Harness {
        agent,
        fetcher,
        clients,
        notifications,
    }
}

async fn fetch(agent: &Agent, target: &str, destination: Destination) -> Option<Response> {
    let (tx, rx) = oneshot::channel();
    let request = Request::parse(target).unwrap().destination(destination);
    agent
        .dispatch(AgentEvent::Fetch {
            request,
            respond_to: Some(tx),
        })
        .await;
    rx.await.unwrap()
}

#[tokio::test]
async fn precached_resources_are_served_offline() {
    let h = activated("pressing-cache-v1.0.0", CacheStorage::new().shared()).await;
    h.fetcher.set_offline(true);

    let page = fetch(&h.agent, &url("/"), Destination::Document).await.unwrap();
    assert_eq!(page.text().unwrap(), "<html>home</html>");
    assert!(page.from_cache);

    let icon = fetch(&h.agent, &url("/icons/icon-192x192.png"), Destination::Image)
        .await
        .unwrap();
    assert_eq!(icon.text().unwrap(), "png");
}

#[tokio::test]
async fn activation_leaves_only_the_current_store() {
    let caches = CacheStorage::new().shared();
    {
        let mut storage = caches.write().await;
        storage.open("pressing-cache-v0.8.0");
        storage.open("pressing-cache-v0.9.0");
    }

    activated("pressing-cache-v1.0.0", caches.clone()).await;

    assert_eq!(caches.read().await.keys(), vec!["pressing-cache-v1.0.0"]);
}

#[tokio::test]
async fn static_asset_hit_never_touches_the_network() {
    let h = activated("v1", CacheStorage::new().shared()).await;
    let before = h.fetcher.total_calls();

    for _ in 0..3 {
        fetch(&h.agent, &url("/icons/icon-192x192.png"), Destination::Image).await;
    }

    assert_eq!(h.fetcher.total_calls(), before);
}

#[tokio::test]
async fn api_success_is_readable_from_cache_afterwards() {
    let h = activated("v1", CacheStorage::new().shared()).await;
    h.fetcher.route(&url("/api/orders"), Fixture::ok(r#"[{"id":1}]"#));

    let live = fetch(&h.agent, &url("/api/orders"), Destination::Empty).await.unwrap();
    assert!(!live.from_cache);

    h.fetcher.set_offline(true);
    let fallback = fetch(&h.agent, &url("/api/orders"), Destination::Empty).await.unwrap();
    assert!(fallback.from_cache);
    assert_eq!(fallback.text().unwrap(), r#"[{"id":1}]"#);

    let nothing = fetch(&h.agent, &url("/api/payments"), Destination::Empty).await;
    assert!(nothing.is_none());
}

#[tokio::test]
async fn api_error_status_without_cache_is_no_response() {
    let h = activated("v1", CacheStorage::new().shared()).await;
    h.fetcher.route(&url("/api/me"), Fixture::status(500));

    let (tx, rx) = oneshot::channel();
    let request = Request::parse(&url("/api/me")).unwrap().destination(Destination::Empty);
    let outcome = h
        .agent
        .dispatch(AgentEvent::Fetch {
            request,
            respond_to: Some(tx),
        })
        .await;

    assert!(rx.await.unwrap().is_none());
    assert!(matches!(
        outcome,
        EventOutcome::Completed(Handled::Responded { status: None, .. })
    ));
}

#[tokio::test]
async fn page_is_served_stale_then_refreshed() {
    let h = activated("v1", CacheStorage::new().shared()).await;
    let page = url("/pressing/orders");

    h.fetcher.route(&page, Fixture::ok("first"));
    let miss = fetch(&h.agent, &page, Destination::Document).await.unwrap();
    assert_eq!(miss.text().unwrap(), "first");

    h.fetcher.route(&page, Fixture::ok("second"));
    let stale = fetch(&h.agent, &page, Destination::Document).await.unwrap();
    assert_eq!(stale.text().unwrap(), "first");

    // dispatch settled the refresh, so the cache already holds the update
    let cached = h.agent.store().get(&page).await.unwrap();
    assert_eq!(cached.text().unwrap(), "second");
}

#[tokio::test]
async fn malformed_pushes_still_show_something() {
    let h = activated("v1", CacheStorage::new().shared()).await;

    let payloads = [
        PushPayload::empty(),
        PushPayload::from_text(""),
        PushPayload::from_text("Votre commande est prête"),
        PushPayload::from_text("{not json"),
        PushPayload::from_text("{}"),
        PushPayload::from_text("[1,2,3]"),
        PushPayload::from_bytes(vec![0xff, 0x00, 0xfe]),
    ];

    for payload in payloads {
        let descriptor = h.agent.push(&payload).await.unwrap();
        assert!(!descriptor.title.trim().is_empty());
        assert!(!descriptor.body.trim().is_empty());
    }

    // Same default tag every time, so only the last one is on screen.
    assert_eq!(h.notifications.displayed().await.len(), 1);
}

#[tokio::test]
async fn new_order_click_focuses_the_open_window() {
    let h = activated("v1", CacheStorage::new().shared()).await;
    h.clients
        .add(Client::window("dashboard", Url::parse(&url("/pressing")).unwrap()))
        .await;

    let descriptor = h
        .agent
        .push(&PushPayload::from_text(r#"{"type":"new_order","orderId":"123"}"#))
        .await
        .unwrap();
    let outcome = h
        .agent
        .dispatch(AgentEvent::NotificationClick {
            tag: descriptor.tag,
            action: None,
            data: descriptor.data,
        })
        .await;

    let expected = Url::parse(&url("/pressing/orders/123")).unwrap();
    assert_eq!(
        outcome,
        EventOutcome::Completed(Handled::Routed(RouteOutcome::Focused {
            client_id: "dashboard".into(),
            url: expected.clone(),
        }))
    );
    assert_eq!(h.clients.get("dashboard").await.unwrap().url, expected);
    assert!(h.notifications.displayed().await.is_empty());
}

#[tokio::test]
async fn new_order_click_opens_a_window_when_none_exist() {
    let h = activated("v1", CacheStorage::new().shared()).await;

    let data = NotificationData {
        kind: Some("new_order".into()),
        order_id: Some("123".into()),
        ..Default::default()
    };
    let outcome = h
        .agent
        .dispatch(AgentEvent::NotificationClick {
            tag: "default".into(),
            action: None,
            data,
        })
        .await;

    match outcome {
        EventOutcome::Completed(Handled::Routed(RouteOutcome::Opened { url, .. })) => {
            assert_eq!(url.as_str(), "http://localhost:3000/pressing/orders/123");
        }
        other => panic!("expected a new window, got {:?}", other),
    }
    assert_eq!(h.clients.len().await, 1);
}

#[tokio::test]
async fn clear_cache_replies_after_the_store_is_gone() {
    let h = activated("pressing-cache-v1.0.0", CacheStorage::new().shared()).await;
    assert_eq!(h.agent.store().len().await, 4);

    let (tx, rx) = oneshot::channel();
    h.agent
        .dispatch(AgentEvent::Message {
            message: json!({"type": "CLEAR_CACHE"}),
            reply_to: Some(tx),
        })
        .await;

    assert_eq!(rx.await.unwrap(), ControlReply::Cleared { success: true });
    assert_eq!(h.agent.store().len().await, 0);

    let (tx, rx) = oneshot::channel();
    h.agent
        .dispatch(AgentEvent::Message {
            message: json!({"type": "GET_VERSION"}),
            reply_to: Some(tx),
        })
        .await;
    assert_eq!(
        rx.await.unwrap(),
        ControlReply::Version {
            version: "pressing-cache-v1.0.0".into()
        }
    );
}

#[tokio::test]
async fn stores_survive_a_restart_through_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config("v1");
    config.snapshot_path = Some(dir.path().join("caches.json"));

    {
        let caches = AgentHost::open_storage(&config).await.unwrap();
        let (agent, _signals) =
            Agent::new(config.clone(), AgentHost::new(network(), caches)).unwrap();
        agent.dispatch(AgentEvent::Install).await;
        agent.dispatch(AgentEvent::Activate).await;
    }

    let offline = Arc::new(FixtureFetcher::new());
    offline.set_offline(true);
    let caches = AgentHost::open_storage(&config).await.unwrap();
    let (agent, _signals) = Agent::new(config, AgentHost::new(offline, caches)).unwrap();

    let page = fetch(&agent, &url("/index.html"), Destination::Document).await.unwrap();
    assert_eq!(page.text().unwrap(), "<html>index</html>");
}

#[tokio::test]
async fn runtime_cache_writes_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config("v1");
    config.snapshot_path = Some(dir.path().join("caches.json"));

    {
        let fetcher = network();
        fetcher.route(&url("/api/orders"), Fixture::ok(r#"[{"id":"123"}]"#));
        fetcher.route(&url("/pressing/orders"), Fixture::ok("<html>orders</html>"));
        let caches = AgentHost::open_storage(&config).await.unwrap();
        let (agent, _signals) =
            Agent::new(config.clone(), AgentHost::new(fetcher, caches)).unwrap();
        agent.dispatch(AgentEvent::Install).await;
        agent.dispatch(AgentEvent::Activate).await;

        fetch(&agent, &url("/api/orders"), Destination::Empty).await.unwrap();
        fetch(&agent, &url("/pressing/orders"), Destination::Document).await.unwrap();
    }

    let offline = Arc::new(FixtureFetcher::new());
    offline.set_offline(true);
    let caches = AgentHost::open_storage(&config).await.unwrap();
    let (agent, _signals) = Agent::new(config, AgentHost::new(offline, caches)).unwrap();

    let orders = fetch(&agent, &url("/api/orders"), Destination::Empty).await.unwrap();
    assert!(orders.from_cache);
    assert_eq!(orders.text().unwrap(), r#"[{"id":"123"}]"#);

    let page = fetch(&agent, &url("/pressing/orders"), Destination::Document).await.unwrap();
    assert_eq!(page.text().unwrap(), "<html>orders</html>");
}

#[tokio::test]
async fn waiting_version_takes_over_on_skip_waiting() {
    let caches = CacheStorage::new().shared();
    let mut registration = Registration::new(Url::parse(ORIGIN).unwrap());

    let (v1, _) = Agent::new(config("v1"), AgentHost::new(network(), caches.clone())).unwrap();
    registration.update(Arc::new(v1)).await.unwrap();

    let (v2, _) = Agent::new(config("v2"), AgentHost::new(network(), caches.clone())).unwrap();
    registration.update(Arc::new(v2)).await.unwrap();
    assert_eq!(registration.controller().unwrap().version(), "v1");

    let waiting = Arc::clone(registration.waiting().unwrap());
    waiting
        .dispatch(AgentEvent::Message {
            message: json!({"type": "SKIP_WAITING"}),
            reply_to: None,
        })
        .await;
    assert!(registration.promote_if_requested().await.unwrap());

    assert_eq!(registration.controller().unwrap().version(), "v2");
    assert_eq!(caches.read().await.keys(), vec!["v2"]);
}
