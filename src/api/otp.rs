//! Sign-up OTP session: which phone number is mid-registration and whether
//! its code has been verified yet.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::SharedStorage;

pub const OTP_SESSION_KEY: &str = "otpSession";
/// Validity of a sent code, in millis.
pub const OTP_TTL_MS: i64 = 3 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSession {
    pub phone: String,
    /// Epoch millis.
    pub expire_at: i64,
    pub verified: bool,
}

impl OtpSession {
    /// A verified session never expires.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        !self.verified && now_ms > self.expire_at
    }

    pub fn is_expired(&self) -> bool { self.is_expired_at(chrono::Utc::now().timestamp_millis()) }
}

#[derive(Clone)]
pub struct OtpStore {
    storage: SharedStorage,
}

impl OtpStore {
    pub fn new(storage: SharedStorage) -> Self { Self { storage } }

    /// Record that a code was just sent to `phone`.
    pub fn start(&self, phone: &str) -> OtpSession {
        let session = OtpSession {
            phone: phone.to_string(),
            expire_at: chrono::Utc::now().timestamp_millis() + OTP_TTL_MS,
            verified: false,
        };
        self.write(&session);
        session
    }

    pub fn current(&self) -> Option<OtpSession> {
        let raw = self.storage.get(OTP_SESSION_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(target: "panel_client::otp", "dropping unreadable OTP session: {}", e);
                self.storage.remove(OTP_SESSION_KEY);
                None
            }
        }
    }

    pub fn mark_verified(&self) {
        if let Some(mut session) = self.current() {
            session.verified = true;
            self.write(&session);
        }
    }

    pub fn clear(&self) { self.storage.remove(OTP_SESSION_KEY); }

    fn write(&self, session: &OtpSession) {
        let res = serde_json::to_string(session)
            .map_err(anyhow::Error::from)
            .and_then(|s| self.storage.set(OTP_SESSION_KEY, &s));
        if let Err(e) = res {
            warn!(target: "panel_client::otp", "failed to persist OTP session: {:#}", e);
        }
    }
}
