//!
//! Session refresh coordination
//! ----------------------------
//! Owns the persisted session and serializes access-token renewal:
//!
//! - The first caller to need a refresh flips `Idle -> Refreshing` under the lock,
//!   before any await, and performs the single refresh POST.
//! - Callers arriving while `Refreshing` are queued as waiters and get the
//!   outcome of that one call, in the order they queued.
//! - Success persists the new token and returns to `Idle`; failure clears the
//!   session, enters `Failed` and announces `LoginRequired`.
//!
//! Transport: body mode sends `{refreshToken}`; cookie mode sends `{}` and relies
//! on the http-only cookie in the client's jar. A cookie-mode 401 falls back to
//! body mode once when a refresh token is cached locally.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use super::classify::{classify_send_error, classify_status};
use super::notify::{NoticeLevel, Notifier};
use crate::envelope;
use crate::error::{ApiError, ApiResult, SESSION_EXPIRED};
use crate::session::{parse_expiry, Session, SessionStore, TransportMode};
use crate::tprintln;

const TOKEN_KEYS: &[&str] = &["accessToken", "AccessToken"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Failed,
}

/// Session lifecycle announcements for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { transport_mode: TransportMode },
    Refreshed,
    /// The session is gone and could not be renewed; send the user to login.
    LoginRequired { reason: String },
    LoggedOut,
}

type Waiter = oneshot::Sender<ApiResult<String>>;

struct Inner {
    state: RefreshState,
    waiters: VecDeque<Waiter>,
}

/// `{accessToken, expiresAt, refreshToken?}` as returned by login and refresh.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    #[serde(alias = "AccessToken")]
    pub access_token: String,
    #[serde(default, alias = "RefreshToken")]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "ExpiresAt")]
    pub expires_at: Option<String>,
}

impl TokenGrant {
    /// Pull a grant out of a body that may or may not be enveloped.
    pub fn locate(raw: &Value) -> Option<Self> {
        let layer = envelope::find_layer(raw, TOKEN_KEYS)?;
        let grant = Self {
            access_token: TOKEN_KEYS.iter().find_map(|k| layer.get(*k)).and_then(Value::as_str)?.to_string(),
            refresh_token: ["refreshToken", "RefreshToken"]
                .iter()
                .find_map(|k| layer.get(*k))
                .and_then(Value::as_str)
                .map(str::to_string),
            expires_at: ["expiresAt", "ExpiresAt"]
                .iter()
                .find_map(|k| layer.get(*k))
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        (!grant.access_token.is_empty()).then_some(grant)
    }

    pub fn non_empty_refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

enum AttemptError {
    /// The refresh endpoint answered 401.
    Rejected(ApiError),
    Other(ApiError),
}

impl AttemptError {
    fn into_inner(self) -> ApiError {
        match self {
            AttemptError::Rejected(e) | AttemptError::Other(e) => e,
        }
    }
}

pub struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: Url,
    timeout: std::time::Duration,
    sessions: SessionStore,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<SessionEvent>,
    inner: Mutex<Inner>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        http: reqwest::Client,
        refresh_url: Url,
        timeout: std::time::Duration,
        sessions: SessionStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            http,
            refresh_url,
            timeout,
            sessions,
            notifier,
            events,
            inner: Mutex::new(Inner { state: RefreshState::Idle, waiters: VecDeque::new() }),
        }
    }

    pub fn state(&self) -> RefreshState { self.inner.lock().state }

    pub fn access_token(&self) -> Option<String> { self.sessions.access_token() }

    pub fn transport_mode(&self) -> TransportMode { self.sessions.transport_mode() }

    pub fn session(&self) -> Option<Session> { self.sessions.load() }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }

    fn announce(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Install a freshly issued session (login).
    pub(crate) fn begin_session(&self, session: Session) {
        self.sessions.save(&session);
        {
            let mut g = self.inner.lock();
            if g.state == RefreshState::Failed {
                g.state = RefreshState::Idle;
            }
        }
        info!(target: "panel_client::refresh", mode = session.transport_mode.as_str(), "session started");
        tprintln!("session.begin mode={} expires_at={:?}", session.transport_mode.as_str(), session.expires_at);
        self.announce(SessionEvent::LoggedIn { transport_mode: session.transport_mode });
    }

    /// Drop every persisted session field (logout).
    pub(crate) fn end_session(&self) {
        self.sessions.clear();
        self.announce(SessionEvent::LoggedOut);
    }

    /// Obtain a new access token, sharing one in-flight refresh among all callers.
    pub async fn refresh(&self) -> ApiResult<String> {
        let queued = {
            let mut g = self.inner.lock();
            if g.state == RefreshState::Refreshing {
                let (tx, rx) = oneshot::channel();
                g.waiters.push_back(tx);
                debug!(target: "panel_client::refresh", queued = g.waiters.len(), "refresh in flight; waiting");
                Some(rx)
            } else {
                g.state = RefreshState::Refreshing;
                None
            }
        };

        if let Some(rx) = queued {
            return rx
                .await
                .unwrap_or_else(|_| Err(ApiError::unauthorized("token refresh was abandoned")));
        }

        let mut guard = InFlight { coordinator: self, settled: false };
        let outcome = self.perform_refresh().await;
        tprintln!("refresh.settle ok={}", outcome.is_ok());
        guard.settled = true;
        self.settle(&outcome);
        outcome
    }

    fn settle(&self, outcome: &ApiResult<String>) {
        let waiters = {
            let mut g = self.inner.lock();
            g.state = if outcome.is_ok() { RefreshState::Idle } else { RefreshState::Failed };
            std::mem::take(&mut g.waiters)
        };
        match outcome {
            Ok(token) => {
                info!(target: "panel_client::refresh", replaying = waiters.len(), "access token refreshed");
                for w in waiters {
                    let _ = w.send(Ok(token.clone()));
                }
                self.announce(SessionEvent::Refreshed);
            }
            Err(e) => {
                warn!(target: "panel_client::refresh", rejected = waiters.len(), "token refresh failed: {}", e);
                self.sessions.clear();
                for w in waiters {
                    let _ = w.send(Err(e.clone()));
                }
                self.notifier.notify(NoticeLevel::Error, SESSION_EXPIRED);
                self.announce(SessionEvent::LoginRequired { reason: e.message().to_string() });
            }
        }
    }

    async fn perform_refresh(&self) -> ApiResult<String> {
        let mode = self.sessions.transport_mode();
        let cached = self.sessions.refresh_token();

        let (grant, used_body) = match (mode, cached.as_deref()) {
            (TransportMode::Body, Some(rt)) => (self.attempt(Some(rt)).await.map_err(AttemptError::into_inner)?, true),
            _ => match self.attempt(None).await {
                Ok(g) => (g, false),
                Err(AttemptError::Rejected(e)) => match cached.as_deref() {
                    Some(rt) => {
                        warn!(target: "panel_client::refresh", "cookie refresh rejected; falling back to body transport");
                        (self.attempt(Some(rt)).await.map_err(AttemptError::into_inner)?, true)
                    }
                    None => return Err(e),
                },
                Err(AttemptError::Other(e)) => return Err(e),
            },
        };

        self.sessions.apply_grant(
            &grant.access_token,
            grant.non_empty_refresh_token(),
            grant.expires_at.as_deref().and_then(parse_expiry),
        );
        if used_body && mode != TransportMode::Body {
            self.sessions.set_transport_mode(TransportMode::Body);
        }
        Ok(grant.access_token)
    }

    async fn attempt(&self, refresh_token: Option<&str>) -> Result<TokenGrant, AttemptError> {
        let body = match refresh_token {
            Some(rt) => json!({ "refreshToken": rt }),
            None => json!({}),
        };
        debug!(target: "panel_client::refresh", body_mode = refresh_token.is_some(), "POST {}", self.refresh_url);
        let resp = self
            .http
            .post(self.refresh_url.clone())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError::Other(classify_send_error(&e).into()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AttemptError::Other(classify_send_error(&e).into()))?;
        let raw: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        if status == StatusCode::UNAUTHORIZED {
            let msg = envelope::error_message(&raw).unwrap_or_else(|| SESSION_EXPIRED.to_string());
            return Err(AttemptError::Rejected(ApiError::unauthorized(msg)));
        }
        if !status.is_success() {
            let err: ApiError = classify_status(status, &raw).into();
            return Err(AttemptError::Other(err));
        }
        TokenGrant::locate(&raw).ok_or_else(|| {
            let canonical = envelope::normalize(&raw);
            let msg = if canonical.success { "refresh response carried no access token".to_string() } else { canonical.message };
            AttemptError::Other(ApiError::unauthorized(msg))
        })
    }
}

/// Returns the machine to `Idle` if the leading refresh future is dropped early,
/// so queued callers are released instead of hanging.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = {
            let mut g = self.coordinator.inner.lock();
            g.state = RefreshState::Idle;
            std::mem::take(&mut g.waiters)
        };
        for w in waiters {
            let _ = w.send(Err(ApiError::unauthorized("token refresh was abandoned")));
        }
    }
}
