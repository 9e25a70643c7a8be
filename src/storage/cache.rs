use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::kv::SharedStorage;

/// Namespace prefix for entries written by the read-through query layer.
pub const CACHE_PREFIX: &str = "api-cache-";

/// Stored form of a cached value: the data plus the write time in epoch millis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<T> {
    pub data: Option<T>,
    pub is_expired: bool,
}

impl<T> CacheLookup<T> {
    fn miss() -> Self { Self { data: None, is_expired: true } }
}

/// Short-TTL cache over the durable key-value store.
#[derive(Clone)]
pub struct LocalCache {
    storage: SharedStorage,
}

impl LocalCache {
    pub fn new(storage: SharedStorage) -> Self { Self { storage } }

    /// Cache key for an API endpoint; a leading `/` is ignored.
    pub fn key_for(endpoint: &str) -> String {
        format!("{}{}", CACHE_PREFIX, endpoint.strip_prefix('/').unwrap_or(endpoint))
    }

    /// Store `data` stamped with the current time. Failures are logged, never raised.
    pub fn set<T: Serialize>(&self, key: &str, data: &T) {
        let entry = CacheEntry { data, timestamp: chrono::Utc::now().timestamp_millis() };
        let res = serde_json::to_string(&entry)
            .map_err(anyhow::Error::from)
            .and_then(|s| self.storage.set(key, &s));
        if let Err(e) = res {
            error!(target: "panel_client::cache", "failed to write cache entry {}: {:#}", key, e);
        }
    }

    /// Read `key`, treating entries older than `ttl_minutes` as absent. Expired and
    /// unparseable entries are removed on the way out.
    pub fn get<T: DeserializeOwned>(&self, key: &str, ttl_minutes: f64) -> CacheLookup<T> {
        let Some(raw) = self.storage.get(key) else { return CacheLookup::miss(); };
        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(target: "panel_client::cache", "dropping unreadable cache entry {}: {}", key, e);
                self.storage.remove(key);
                return CacheLookup::miss();
            }
        };
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = entry.timestamp as f64 + ttl_minutes * 60_000.0;
        if now as f64 > expires_at {
            self.storage.remove(key);
            return CacheLookup::miss();
        }
        CacheLookup { data: Some(entry.data), is_expired: false }
    }

    pub fn remove(&self, key: &str) { self.storage.remove(key); }

    /// Drop every entry under [`CACHE_PREFIX`]. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let keys: Vec<String> = self.storage.keys().into_iter().filter(|k| k.starts_with(CACHE_PREFIX)).collect();
        for k in &keys {
            self.storage.remove(k);
        }
        keys.len()
    }
}
