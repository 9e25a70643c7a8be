//!
//! panel-client transport
//! ----------------------
//! `ApiClient` is the single gateway to the admin API. Every call goes through
//! the same pipeline:
//!
//! - Request phase: resolve the path against the base URL and attach
//!   `Authorization: Bearer <accessToken>` when a session exists.
//! - Send phase: the retry policy re-sends on network failures (no response,
//!   connection errors, timeouts).
//! - Response phase: 2xx bodies are normalized into a `CanonicalResult` and
//!   returned as-is, even with `success=false`; the typed helpers in `api` decide
//!   whether that is an error. A 401 on an authenticated, not yet replayed request
//!   is handed to the refresh coordinator and the request is replayed once with
//!   the new token. Any other HTTP error becomes a domain error carrying the
//!   server's message.

use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ClientConfig;
use crate::envelope::{self, CanonicalResult};
use crate::error::{ApiError, ApiResult};
use crate::session::TransportMode;
use crate::storage::{FileStorage, LocalCache, MemoryStorage, SharedStorage};

pub mod classify;
pub mod notify;
pub mod refresh;
pub mod request;
pub mod retry;

pub use classify::ClassifiedError;
pub use notify::{ChannelNotifier, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use refresh::{RefreshCoordinator, RefreshState, SessionEvent, TokenGrant};
pub use request::{Method, RequestConfig};
pub use retry::{retry, RetryPolicy};

use classify::{classify_send_error, classify_status};
use request::PendingRequest;

const COOKIE_PROBE: &str = "panel_cookie_probe";

struct RawResponse {
    status: StatusCode,
    body: Value,
}

struct ClientInner {
    http: reqwest::Client,
    base: Url,
    config: ClientConfig,
    retry: RetryPolicy,
    coordinator: RefreshCoordinator,
    notifier: Arc<dyn Notifier>,
    storage: SharedStorage,
    jar: Option<Arc<Jar>>,
}

/// Cheaply cloneable handle; clones share the session, cookie jar and storage.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

pub struct ApiClientBuilder {
    config: ClientConfig,
    storage: Option<SharedStorage>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ApiClientBuilder {
    /// Use this store instead of the one implied by `config.storage_path`.
    pub fn storage(mut self, storage: SharedStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> ApiResult<ApiClient> {
        let config = self.config.normalized();
        let base = Url::parse(&config.api_base_url)
            .map_err(|e| ApiError::unknown(format!("invalid base URL '{}': {}", config.api_base_url, e)))?;
        let storage = match self.storage {
            Some(s) => s,
            None => match &config.storage_path {
                Some(path) => FileStorage::shared(path)?,
                None => MemoryStorage::shared(),
            },
        };
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));

        let jar = config.cookie_store.then(|| Arc::new(Jar::default()));
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(jar) = &jar {
            builder = builder.cookie_provider(jar.clone());
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::unknown(format!("failed to build HTTP client: {}", e)))?;

        let refresh_url = join_path(&base, &config.refresh_path)?;
        let coordinator = RefreshCoordinator::new(
            http.clone(),
            refresh_url,
            config.timeout,
            crate::session::SessionStore::new(storage.clone()),
            notifier.clone(),
        );
        let retry = RetryPolicy::new(config.retry_attempts, config.retry_base_delay);

        Ok(ApiClient {
            inner: Arc::new(ClientInner { http, base, config, retry, coordinator, notifier, storage, jar }),
        })
    }
}

fn join_path(base: &Url, path: &str) -> ApiResult<Url> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path).map_err(|e| ApiError::unknown(format!("invalid URL '{}': {}", path, e)));
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ApiError::unknown(format!("invalid path '{}': {}", path, e)))
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder { config, storage: None, notifier: None }
    }

    pub fn new(config: ClientConfig) -> ApiResult<Self> { Self::builder(config).build() }

    pub fn config(&self) -> &ClientConfig { &self.inner.config }

    pub fn storage(&self) -> &SharedStorage { &self.inner.storage }

    pub fn cache(&self) -> LocalCache { LocalCache::new(self.inner.storage.clone()) }

    pub fn coordinator(&self) -> &RefreshCoordinator { &self.inner.coordinator }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.inner.coordinator.subscribe() }

    pub fn transport_mode(&self) -> TransportMode { self.inner.coordinator.transport_mode() }

    pub fn notify(&self, level: NoticeLevel, message: &str) { self.inner.notifier.notify(level, message); }

    /// Absolute URL for a request path.
    pub fn resolve(&self, path: &str) -> ApiResult<Url> { join_path(&self.inner.base, path) }

    /// Write and read back a throwaway cookie to see whether the jar keeps cookies
    /// for the API origin. Always false without a cookie store.
    pub fn cookies_supported(&self) -> bool {
        use reqwest::cookie::CookieStore;
        let Some(jar) = &self.inner.jar else { return false; };
        let url = &self.inner.base;
        jar.add_cookie_str(&format!("{}=1; Path=/", COOKIE_PROBE), url);
        let accepted = jar
            .cookies(url)
            .and_then(|h| h.to_str().ok().map(|s| s.contains(&format!("{}=1", COOKIE_PROBE))))
            .unwrap_or(false);
        jar.add_cookie_str(&format!("{}=; Max-Age=0; Path=/", COOKIE_PROBE), url);
        accepted
    }

    pub async fn get(&self, url: &str, config: &RequestConfig) -> ApiResult<CanonicalResult<Value>> {
        self.execute(Method::Get, url, Value::Null, config).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B, config: &RequestConfig) -> ApiResult<CanonicalResult<Value>> {
        let body = serde_json::to_value(body)?;
        self.execute(Method::Post, url, body, config).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, url: &str, body: &B, config: &RequestConfig) -> ApiResult<CanonicalResult<Value>> {
        let body = serde_json::to_value(body)?;
        self.execute(Method::Put, url, body, config).await
    }

    pub async fn delete(&self, url: &str, config: &RequestConfig) -> ApiResult<CanonicalResult<Value>> {
        self.execute(Method::Delete, url, Value::Null, config).await
    }

    /// Run one request through the full pipeline. `Value::Null` means no body.
    pub async fn execute(&self, method: Method, url: &str, body: Value, config: &RequestConfig) -> ApiResult<CanonicalResult<Value>> {
        let raw = self.execute_raw(method, url, body, config).await?;
        Ok(envelope::normalize(&raw))
    }

    /// Same pipeline as [`execute`](Self::execute) but hands back the 2xx body
    /// untouched, for endpoints that answer without an envelope.
    pub async fn execute_raw(&self, method: Method, url: &str, body: Value, config: &RequestConfig) -> ApiResult<Value> {
        let mut req = PendingRequest::new(method, url, body, config);
        let target = self.resolve(&req.url)?;
        let mut renewed: Option<String> = None;
        loop {
            let token = if req.config.skip_auth {
                None
            } else {
                renewed.take().or_else(|| self.inner.coordinator.access_token())
            };
            let raw = match self.dispatch(&req, &target, token.as_deref()).await {
                Ok(raw) => raw,
                Err(e) => return Err(self.report(&req.config, e)),
            };
            if raw.status.is_success() {
                return Ok(raw.body);
            }
            match classify_status(raw.status, &raw.body) {
                unauthorized @ ClassifiedError::Unauthorized(_) if token.is_some() && !req.retried => {
                    req.retried = true;
                    match self.inner.coordinator.access_token() {
                        // renewed by another caller while this response was in flight
                        Some(current) if token.as_deref() != Some(current.as_str()) => {
                            debug!(target: "panel_client::transport", url = %target, "401 with a superseded token; replaying");
                            renewed = Some(current);
                        }
                        // cleared by a failed refresh, which already notified
                        None => {
                            debug!(target: "panel_client::transport", url = %target, "401 after the session ended");
                            return Err(unauthorized.into());
                        }
                        Some(_) => {
                            debug!(target: "panel_client::transport", url = %target, "401 on authenticated request; refreshing");
                            // on failure the coordinator has already notified and cleared the session
                            renewed = Some(self.inner.coordinator.refresh().await?);
                        }
                    }
                }
                other => return Err(self.report(&req.config, other.into())),
            }
        }
    }

    async fn dispatch(&self, req: &PendingRequest, target: &Url, token: Option<&str>) -> ApiResult<RawResponse> {
        self.inner.retry.run(move || self.send_once(req, target, token)).await
    }

    async fn send_once(&self, req: &PendingRequest, target: &Url, token: Option<&str>) -> ApiResult<RawResponse> {
        let timeout = req.config.timeout.unwrap_or(self.inner.config.timeout);
        let mut rb = self.inner.http.request(req.method.as_reqwest(), target.clone()).timeout(timeout);
        if let Some(t) = token {
            rb = rb.bearer_auth(t);
        }
        for (name, value) in &req.config.headers {
            rb = rb.header(name.as_str(), value.as_str());
        }
        if !req.config.query.is_empty() {
            rb = rb.query(&req.config.query);
        }
        if !req.body.is_null() {
            rb = rb.json(&req.body);
        }
        debug!(target: "panel_client::transport", method = ?req.method, url = %target, authed = token.is_some(), replay = req.retried, "sending");

        let resp = rb.send().await.map_err(|e| ApiError::from(classify_send_error(&e)))?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| ApiError::from(classify_send_error(&e)))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                debug!(target: "panel_client::transport", status = status.as_u16(), "non-JSON response body: {}", e);
                Value::Null
            })
        };
        debug!(target: "panel_client::transport", status = status.as_u16(), url = %target, "received");
        Ok(RawResponse { status, body })
    }

    /// Fire the single user-facing notice for a failure and hand the error back.
    fn report(&self, config: &RequestConfig, err: ApiError) -> ApiError {
        if !config.silent {
            self.notify(NoticeLevel::Error, err.message());
        }
        err
    }
}
