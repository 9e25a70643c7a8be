//! Session model and its persisted form.
//!
//! The session lives in the durable store under fixed keys so it survives a
//! restart. Only the refresh coordinator writes it; everything else reads.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::storage::SharedStorage;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const TRANSPORT_MODE_KEY: &str = "transport_mode";
pub const EXPIRES_AT_KEY: &str = "expires_at";

/// How the refresh token travels to the refresh endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// http-only cookie held by the HTTP client's cookie jar
    #[default]
    Cookie,
    /// `{refreshToken}` in the request body
    Body,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Cookie => "cookie",
            TransportMode::Body => "body",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cookie" => Some(TransportMode::Cookie),
            "body" => Some(TransportMode::Body),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub transport_mode: TransportMode,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now >= e).unwrap_or(false)
    }
}

/// Parse a server `expiresAt`: RFC 3339, or a naive ISO timestamp taken as UTC.
pub fn parse_expiry(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

/// Typed view over the persisted session keys.
#[derive(Clone)]
pub struct SessionStore {
    storage: SharedStorage,
}

impl SessionStore {
    pub fn new(storage: SharedStorage) -> Self { Self { storage } }

    pub fn access_token(&self) -> Option<String> {
        self.storage.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.storage.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.storage
            .get(TRANSPORT_MODE_KEY)
            .and_then(|m| TransportMode::parse(&m))
            .unwrap_or_default()
    }

    pub fn load(&self) -> Option<Session> {
        let access_token = self.access_token()?;
        Some(Session {
            access_token,
            refresh_token: self.refresh_token(),
            transport_mode: self.transport_mode(),
            expires_at: self.storage.get(EXPIRES_AT_KEY).and_then(|s| parse_expiry(&s)),
        })
    }

    pub fn save(&self, session: &Session) {
        self.put(ACCESS_TOKEN_KEY, &session.access_token);
        match session.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            Some(rt) => self.put(REFRESH_TOKEN_KEY, rt),
            None => self.storage.remove(REFRESH_TOKEN_KEY),
        }
        self.put(TRANSPORT_MODE_KEY, session.transport_mode.as_str());
        match session.expires_at {
            Some(e) => self.put(EXPIRES_AT_KEY, &e.to_rfc3339()),
            None => self.storage.remove(EXPIRES_AT_KEY),
        }
    }

    /// Apply a refresh grant. A missing rotated refresh token keeps the old one.
    pub fn apply_grant(&self, access_token: &str, rotated_refresh: Option<&str>, expires_at: Option<DateTime<Utc>>) {
        self.put(ACCESS_TOKEN_KEY, access_token);
        if let Some(rt) = rotated_refresh.filter(|t| !t.is_empty()) {
            self.put(REFRESH_TOKEN_KEY, rt);
        }
        if let Some(e) = expires_at {
            self.put(EXPIRES_AT_KEY, &e.to_rfc3339());
        }
    }

    pub fn set_transport_mode(&self, mode: TransportMode) {
        self.put(TRANSPORT_MODE_KEY, mode.as_str());
    }

    pub fn clear(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TRANSPORT_MODE_KEY, EXPIRES_AT_KEY] {
            self.storage.remove(key);
        }
    }

    fn put(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            error!(target: "panel_client::session", "failed to persist {}: {:#}", key, e);
        }
    }
}
