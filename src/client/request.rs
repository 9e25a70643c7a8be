use std::time::Duration;

use serde_json::Value;

/// HTTP verbs the admin API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Overrides the client-wide timeout.
    pub timeout: Option<Duration>,
    /// Send without `Authorization` and never attempt a token refresh.
    pub skip_auth: bool,
    /// Suppress user-facing notices; the error is still returned.
    pub silent: bool,
}

impl RequestConfig {
    pub fn anonymous() -> Self { Self { skip_auth: true, ..Self::default() } }

    pub fn silent() -> Self { Self { silent: true, ..Self::default() } }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// A request kept around so it can be replayed after a token refresh.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub method: Method,
    pub url: String,
    /// `Value::Null` means no body.
    pub body: Value,
    pub config: RequestConfig,
    /// Set once the request has been replayed after a refresh.
    pub retried: bool,
}

impl PendingRequest {
    pub fn new(method: Method, url: &str, body: Value, config: &RequestConfig) -> Self {
        Self { method, url: url.to_string(), body, config: config.clone(), retried: false }
    }
}
