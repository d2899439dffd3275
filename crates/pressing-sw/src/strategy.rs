//! Request classification and caching strategies.
//!
//! | Class        | Condition                          | Strategy               |
//! |--------------|------------------------------------|------------------------|
//! | Static asset | destination is image/script/style  | Cache-First            |
//! | API call     | path contains the API marker       | Network-First          |
//! | Page         | anything else                      | Stale-While-Revalidate |
//!
//! Rows are evaluated top to bottom; the first match wins.

use std::fmt;
use std::sync::Arc;

use pressing_net::{Fetcher, Request, Response, UrlPattern};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::cache::VersionedCacheStore;
use crate::lifetime::EventLifetime;

/// Which kind of request this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    StaticAsset,
    Api,
    Page,
}

/// How a request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl RequestClass {
    pub fn strategy(self) -> Strategy {
        match self {
            RequestClass::StaticAsset => Strategy::CacheFirst,
            RequestClass::Api => Strategy::NetworkFirst,
            RequestClass::Page => Strategy::StaleWhileRevalidate,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        })
    }
}

/// Answers intercepted requests from the cache, the network, or both.
#[derive(Clone)]
pub struct StrategyRouter {
    store: VersionedCacheStore,
    fetcher: Arc<dyn Fetcher>,
    api: UrlPattern,
}

impl StrategyRouter {
    pub fn new(store: VersionedCacheStore, fetcher: Arc<dyn Fetcher>, api_marker: &str) -> Self {
        Self {
            store,
            fetcher,
            api: UrlPattern::path_contains(api_marker),
        }
    }

    /// Classify a request.
    pub fn classify(&self, request: &Request) -> RequestClass {
        if request.destination.is_static_asset() {
            RequestClass::StaticAsset
        } else if self.api.matches(&request.url) {
            RequestClass::Api
        } else {
            RequestClass::Page
        }
    }

    /// Answer `request`.
    ///
    /// `None` means neither the cache nor the network produced a response.
    /// Only GET requests are cached; anything else goes straight to the
    /// network. Work that must outlive the answer is registered on
    /// `lifetime`.
    pub async fn handle(&self, request: &Request, lifetime: &mut EventLifetime) -> Option<Response> {
        if request.method != http::Method::GET {
            trace!(url = %request.url, method = %request.method, "Passing non-GET request through");
            return self.network_only(request).await;
        }

        let strategy = self.classify(request).strategy();
        debug!(url = %request.url, %strategy, "Routing request");

        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, lifetime).await,
        }
    }

    async fn network_only(&self, request: &Request) -> Option<Response> {
        match self.fetcher.fetch(request).await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network request failed");
                None
            }
        }
    }

    /// Cached copy if present, otherwise the network. Never writes back.
    async fn cache_first(&self, request: &Request) -> Option<Response> {
        if let Some(cached) = self.store.get(&request.cache_key()).await {
            trace!(url = %request.url, "Cache hit");
            return Some(cached);
        }
        self.network_only(request).await
    }

    /// Network if it answers 2xx (writing 200s back), otherwise the cache.
    /// An error status with nothing cached is no response at all.
    async fn network_first(&self, request: &Request) -> Option<Response> {
        let key = request.cache_key();

        match self.fetcher.fetch(request).await {
            Ok(response) if response.ok() => {
                if response.is_cacheable() {
                    store_quietly(&self.store, &key, &response).await;
                }
                Some(response)
            }
            Ok(response) => {
                debug!(url = %request.url, status = %response.status, "Network answered with error, trying cache");
                self.store.get(&key).await
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, falling back to cache");
                self.store.get(&key).await
            }
        }
    }

    /// Cached copy immediately; the network refresh always runs to
    /// completion in the background.
    async fn stale_while_revalidate(
        &self,
        request: &Request,
        lifetime: &mut EventLifetime,
    ) -> Option<Response> {
        let key = request.cache_key();
        let cached = self.store.get(&key).await;

        let (tx, rx) = oneshot::channel();
        let store = self.store.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let request = request.clone();
        lifetime.wait_until(async move {
            let fresh = match fetcher.fetch(&request).await {
                Ok(response) => {
                    if response.is_cacheable() {
                        store_quietly(&store, &key, &response).await;
                    }
                    Some(response)
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Revalidation failed");
                    None
                }
            };
            // The receiver is gone when the cached copy was already served.
            let _ = tx.send(fresh);
        });

        match cached {
            Some(cached) => Some(cached),
            None => rx.await.ok().flatten(),
        }
    }
}

/// Write-through that never fails the caller.
async fn store_quietly(store: &VersionedCacheStore, key: &str, response: &Response) {
    if let Err(e) = store.put(key, response).await {
        warn!(url = %key, error = %e, "Cache write failed");
    }
}
