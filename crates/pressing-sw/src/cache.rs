//! Versioned on-device cache stores.
//!
//! ```text
//! CacheStorage (all stores, shared across events)
//!     ├── "pressing-cache-v1.0.0" (Cache)
//!     │       └── request key → CacheEntry
//!     └── "pressing-cache-v0.9.0" (stale until activation evicts it)
//! ```
//!
//! A generation is replaced as a whole: [`VersionedCacheStore::precache`]
//! fills the store named by the current tag, and
//! [`VersionedCacheStore::evict_stale`] drops every other store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::join_all;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use pressing_common::now_millis;
use pressing_net::{Fetcher, Request, Response};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CacheError;

// ==================== Cache Entry ====================

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    #[serde(serialize_with = "body_to_base64", deserialize_with = "body_from_base64")]
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for storage.
    pub fn from_response(request_key: &str, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: request_key.to_string(),
            method: "GET".to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response from the stored record.
    ///
    /// Returns `None` if the stored URL no longer parses.
    pub fn to_response(&self) -> Option<Response> {
        let url = Url::parse(&self.url).ok()?;
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(n, v);
            }
        }

        Some(Response {
            url,
            status,
            headers,
            body: self.body.clone().into(),
            from_cache: true,
        })
    }

    /// Approximate on-device size.
    pub fn size_bytes(&self) -> u64 {
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len()).sum();
        (self.url.len() + headers + self.body.len()) as u64
    }
}

fn body_to_base64<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(body))
}

fn body_from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}

// ==================== Cache ====================

/// A named key → response store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries.
    entries: HashMap<String, CacheEntry>,

    #[serde(skip)]
    quota: Option<u64>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
            quota: None,
        }
    }

    /// Match a request key.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry, replacing any previous one for the same key.
    pub fn put(&mut self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        if let Some(quota) = self.quota {
            let replaced = self.entries.get(key).map(|e| e.size_bytes()).unwrap_or(0);
            let needed = self.size_bytes() - replaced + entry.size_bytes();
            if needed > quota {
                return Err(CacheError::QuotaExceeded {
                    store: self.name.clone(),
                    needed,
                    quota,
                });
            }
        }
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Get all keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of entry sizes.
    pub fn size_bytes(&self) -> u64 {
        self.entries.values().map(CacheEntry::size_bytes).sum()
    }
}

// ==================== Cache Storage ====================

/// All named stores on the device.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,

    #[serde(skip)]
    quota: Option<u64>,
}

/// Storage handle shared by every event handler.
pub type SharedCacheStorage = Arc<RwLock<CacheStorage>>;

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a per-store byte quota to existing and future stores.
    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.set_quota(quota);
        self
    }

    pub fn set_quota(&mut self, quota: Option<u64>) {
        self.quota = quota;
        for cache in self.caches.values_mut() {
            cache.quota = quota;
        }
    }

    /// Wrap for sharing between events.
    pub fn shared(self) -> SharedCacheStorage {
        Arc::new(RwLock::new(self))
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        let quota = self.quota;
        self.caches.entry(name.to_string()).or_insert_with(|| {
            let mut cache = Cache::new(name);
            cache.quota = quota;
            cache
        })
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Get all cache names, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.caches.keys().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    /// Read a snapshot written by [`write_snapshot`].
    ///
    /// A missing file yields empty storage.
    pub async fn load_snapshot(path: &Path) -> Result<Self, CacheError> {
        let json = match tokio::fs::read(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No cache snapshot, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(CacheError::Snapshot(format!("{}: {e}", path.display()))),
        };

        let storage: Self = serde_json::from_slice(&json)
            .map_err(|e| CacheError::Snapshot(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), stores = storage.caches.len(), "Cache snapshot loaded");
        Ok(storage)
    }

    /// Serialize every store as JSON.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(self).map_err(|e| CacheError::Snapshot(e.to_string()))
    }
}

/// Write a snapshot produced by [`CacheStorage::snapshot_bytes`] to `path`.
///
/// The file is replaced atomically through a sibling temp file.
pub async fn write_snapshot(path: &Path, json: Vec<u8>) -> Result<(), CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CacheError::Snapshot(format!("{}: {e}", parent.display())))?;
    }

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| CacheError::Snapshot(format!("{}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::Snapshot(format!("{}: {e}", path.display())))?;

    debug!(path = %path.display(), "Cache snapshot saved");
    Ok(())
}

// ==================== Versioned Store ====================

/// The current generation's view of [`CacheStorage`].
///
/// Every operation takes the storage lock for one store/key operation only;
/// concurrent writers to the same key resolve last-write-wins.
#[derive(Clone)]
pub struct VersionedCacheStore {
    tag: String,
    storage: SharedCacheStorage,
    snapshot_path: Option<PathBuf>,
    /// Set by runtime writes not yet in the snapshot.
    dirty: Arc<AtomicBool>,
}

impl VersionedCacheStore {
    pub fn new(tag: impl Into<String>, storage: SharedCacheStorage) -> Self {
        Self {
            tag: tag.into(),
            storage,
            snapshot_path: None,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Persist storage to `path` after lifecycle changes.
    pub fn with_snapshot(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    /// The current cache version tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn storage(&self) -> &SharedCacheStorage {
        &self.storage
    }

    /// Fetch every manifest resource and write them into the current store.
    ///
    /// All resources are fetched before anything is written; one failure
    /// (transport error or non-2xx) fails the whole precache and leaves the
    /// store untouched.
    pub async fn precache(&self, manifest: &[Url], fetcher: &dyn Fetcher) -> Result<usize, CacheError> {
        info!(tag = %self.tag, resources = manifest.len(), "Precaching manifest");

        let requests: Vec<Request> = manifest.iter().cloned().map(Request::get).collect();
        let results = join_all(requests.iter().map(|request| fetcher.fetch(request))).await;

        let mut staged = Vec::with_capacity(results.len());
        for (request, result) in requests.iter().zip(results) {
            let key = request.cache_key();
            match result {
                Ok(response) if response.ok() => {
                    staged.push(CacheEntry::from_response(&key, &response));
                }
                Ok(response) => {
                    warn!(url = %key, status = %response.status, "Precache resource rejected");
                    return Err(CacheError::BadStatus {
                        url: key,
                        status: response.status.as_u16(),
                    });
                }
                Err(e) => {
                    warn!(url = %key, error = %e, "Precache resource unreachable");
                    return Err(CacheError::Precache {
                        url: key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Fill a copy so a quota failure part way leaves the store as it was.
        let mut storage = self.storage.write().await;
        let cache = storage.open(&self.tag);
        let mut next = cache.clone();
        let count = staged.len();
        for entry in staged {
            let key = entry.url.clone();
            next.put(&key, entry)?;
        }
        *cache = next;

        info!(tag = %self.tag, count, "Precache complete");
        Ok(count)
    }

    /// Delete every store whose name is not the current tag.
    ///
    /// Returns the names that were deleted.
    pub async fn evict_stale(&self) -> Result<Vec<String>, CacheError> {
        let mut storage = self.storage.write().await;
        let stale: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|name| *name != self.tag)
            .map(str::to_string)
            .collect();

        for name in &stale {
            info!(store = %name, "Deleting stale cache");
            storage.delete(name);
        }

        Ok(stale)
    }

    /// Look up `key` in the current store.
    pub async fn get(&self, key: &str) -> Option<Response> {
        let storage = self.storage.read().await;
        storage
            .get(&self.tag)
            .and_then(|cache| cache.match_request(key))
            .and_then(CacheEntry::to_response)
    }

    /// Store `response` under `key` in the current store.
    pub async fn put(&self, key: &str, response: &Response) -> Result<(), CacheError> {
        let entry = CacheEntry::from_response(key, response);
        let mut storage = self.storage.write().await;
        storage.open(&self.tag).put(key, entry)?;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Drop the current store entirely.
    pub async fn delete_all(&self) -> bool {
        self.storage.write().await.delete(&self.tag)
    }

    /// Number of entries in the current store.
    pub async fn len(&self) -> usize {
        let storage = self.storage.read().await;
        storage.get(&self.tag).map(Cache::len).unwrap_or(0)
    }

    /// Save a snapshot if one is configured; failures are logged only.
    ///
    /// The storage lock is released before any file I/O.
    pub async fn persist(&self) {
        let Some(path) = self.snapshot_path.as_deref() else {
            return;
        };
        self.dirty.store(false, Ordering::Release);
        let json = {
            let storage = self.storage.read().await;
            storage.snapshot_bytes()
        };
        let result = match json {
            Ok(json) => write_snapshot(path, json).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.dirty.store(true, Ordering::Release);
            warn!(error = %e, "Failed to persist cache snapshot");
        }
    }

    /// Save a snapshot only when runtime writes happened since the last one.
    pub async fn persist_if_changed(&self) {
        if self.snapshot_path.is_some() && self.dirty.load(Ordering::Acquire) {
            self.persist().await;
        }
    }
}
