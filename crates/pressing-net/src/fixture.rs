//! Canned network for offline runs and tests.
//!
//! A [`FixtureFetcher`] answers from a table of URL → [`Fixture`]. Unknown
//! URLs get a 404, and the whole network can be switched off to simulate
//! losing connectivity.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hashbrown::HashMap;
use http::{HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;

use crate::{Fetcher, NetError, Request, Response};

/// One canned response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

fn default_status() -> u16 {
    200
}

/// Normalize a route key the same way [`Request::cache_key`] does.
fn route_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.into()
        }
        Err(_) => url.to_string(),
    }
}

impl Fixture {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            content_type: None,
        }
    }

    fn to_response(&self, url: &Url) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::new(url.clone(), status, self.body.clone().into_bytes());
        if let Some(value) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            response.headers.insert(http::header::CONTENT_TYPE, value);
        }
        response
    }
}

/// [`Fetcher`] that serves canned responses.
#[derive(Default)]
pub struct FixtureFetcher {
    routes: Mutex<HashMap<String, Fixture>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
    latency: Option<Duration>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Load a JSON object of `{ "<url>": { "status": 200, "body": "..." } }`.
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        let routes: HashMap<String, Fixture> = serde_json::from_str(json)
            .map_err(|e| NetError::RequestFailed(format!("bad fixture file: {e}")))?;
        let routes = routes
            .into_iter()
            .map(|(url, fixture)| (route_key(&url), fixture))
            .collect();
        Ok(Self {
            routes: Mutex::new(routes),
            ..Self::default()
        })
    }

    /// Load fixtures from a JSON file.
    pub fn load(path: &Path) -> Result<Self, NetError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| NetError::RequestFailed(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Register (or replace) the fixture for `url`.
    pub fn route(&self, url: &str, fixture: Fixture) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(route_key(url), fixture);
        }
    }

    /// Simulate losing or regaining connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches issued for `url` so far, including failed ones.
    pub fn calls(&self, url: &str) -> usize {
        let key = route_key(url);
        self.calls
            .lock()
            .map(|calls| calls.get(&key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total number of fetches issued.
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let key = request.cache_key();
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(key.clone()).or_insert(0) += 1;
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            trace!(url = %key, "Fixture network offline");
            return Err(NetError::Offline(key));
        }

        let fixture = self
            .routes
            .lock()
            .map_err(|_| NetError::RequestFailed("fixture table poisoned".to_string()))?
            .get(&key)
            .cloned();

        Ok(match fixture {
            Some(fixture) => fixture.to_response(&request.url),
            None => Fixture::status(404).to_response(&request.url),
        })
    }
}
