//! Read-through query over the local cache.
//!
//! A [`CachedQuery`] shows whatever the cache still holds for its endpoint the
//! moment it is created, then refreshes from the server. A successful refetch
//! overwrites both the cache and the state; a failed one keeps the stale data,
//! records the error and raises a warning notice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::{ApiClient, NoticeLevel, RequestConfig};
use crate::storage::LocalCache;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiState<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct CachedQuery<T> {
    client: ApiClient,
    endpoint: String,
    cache_key: String,
    state: Arc<RwLock<ApiState<T>>>,
    fetching: Arc<AtomicBool>,
}

/// Clears the in-flight flag even if the refetch future is dropped.
struct Fetching<'a>(&'a AtomicBool);

impl Drop for Fetching<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::SeqCst); }
}

impl<T> CachedQuery<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Query with the client's configured cache TTL.
    pub fn new(client: &ApiClient, endpoint: &str) -> Self {
        Self::with_ttl(client, endpoint, client.config().cache_ttl_minutes)
    }

    pub fn with_ttl(client: &ApiClient, endpoint: &str, ttl_minutes: f64) -> Self {
        let endpoint = endpoint.trim_start_matches('/').to_string();
        let cache_key = LocalCache::key_for(&endpoint);
        let cached = client.cache().get::<T>(&cache_key, ttl_minutes);
        let is_loading = cached.data.is_none();
        Self {
            client: client.clone(),
            endpoint,
            cache_key,
            state: Arc::new(RwLock::new(ApiState { data: cached.data, is_loading, error: None })),
            fetching: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }

    pub fn cache_key(&self) -> &str { &self.cache_key }

    pub fn state(&self) -> ApiState<T> { self.state.read().clone() }

    pub fn data(&self) -> Option<T> { self.state.read().data.clone() }

    /// Settled with nothing to show: no data, an empty list, or a falsy scalar.
    pub fn is_empty(&self) -> bool {
        let s = self.state.read();
        if s.is_loading || s.error.is_some() {
            return false;
        }
        match s.data.as_ref().map(serde_json::to_value) {
            None | Some(Ok(Value::Null)) => true,
            Some(Ok(Value::Array(items))) => items.is_empty(),
            Some(Ok(Value::Bool(b))) => !b,
            Some(Ok(Value::String(text))) => text.is_empty(),
            Some(Ok(Value::Number(n))) => n.as_f64() == Some(0.0),
            Some(Ok(Value::Object(_))) | Some(Err(_)) => false,
        }
    }

    /// Fetch from the server. Returns false without doing anything when another
    /// refetch of this query is already running.
    pub async fn refetch(&self) -> bool {
        if self.fetching.swap(true, Ordering::SeqCst) {
            debug!(target: "panel_client::query", endpoint = %self.endpoint, "refetch already in flight");
            return false;
        }
        let _guard = Fetching(&self.fetching);
        self.state.write().is_loading = true;

        match self.client.get_result_with::<T>(&self.endpoint, &RequestConfig::silent()).await {
            Ok(data) => {
                if self.client.config().development {
                    debug!(target: "panel_client::query", endpoint = %self.endpoint, payload = ?serde_json::to_value(&data).ok(), "refetch payload");
                }
                self.client.cache().set(&self.cache_key, &data);
                *self.state.write() = ApiState { data: Some(data), is_loading: false, error: None };
                debug!(target: "panel_client::query", endpoint = %self.endpoint, "refetched");
            }
            Err(e) => {
                warn!(target: "panel_client::query", endpoint = %self.endpoint, "refetch failed, keeping cached data: {}", e);
                self.client.notify(NoticeLevel::Warning, e.message());
                let mut s = self.state.write();
                s.is_loading = false;
                s.error = Some(e.message().to_string());
            }
        }
        true
    }

    /// Run [`refetch`](Self::refetch) on the runtime without waiting for it.
    pub fn spawn_refetch(&self) -> JoinHandle<bool> {
        let query = self.clone();
        tokio::spawn(async move { query.refetch().await })
    }
}
