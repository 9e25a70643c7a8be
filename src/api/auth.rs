//! Authentication flows: password login, OTP sign-up, current user, logout.
//!
//! Login is where a session is born. The transport mode is picked here from
//! what the server handed back: a non-empty `refreshToken` in the body means
//! body mode, otherwise the refresh token is assumed to sit in an http-only
//! cookie. Without a working cookie jar body mode is forced.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::otp::OtpStore;
use super::users::UserDto;
use crate::client::{ApiClient, Method, NoticeLevel, RequestConfig};
use crate::envelope;
use crate::error::{ApiError, ApiResult};
use crate::session::{parse_expiry, Session, TransportMode};
use crate::tprintln;

pub const LOGIN_PATH: &str = "Auth/login";
pub const SEND_OTP_PATH: &str = "Auth/send-otp";
pub const VERIFY_OTP_PATH: &str = "Auth/verify-otp";
pub const REGISTER_PATH: &str = "Auth/register-user";
pub const ME_PATH: &str = "Auth/me";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub phone_number: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    pub id: String,
    pub phone_number: String,
    pub full_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    #[serde(alias = "AccessToken")]
    pub access_token: String,
    #[serde(default, alias = "RefreshToken")]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "ExpiresAt")]
    pub expires_at: Option<String>,
    #[serde(default, alias = "SessionId")]
    pub session_id: Option<String>,
    #[serde(default, alias = "UserInfo")]
    pub user_info: Option<UserInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub phone_number: String,
    pub otp_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRegistrationRequest {
    pub first_name: String,
    pub last_name: String,
    pub national_code: Option<String>,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    pub confirm_password: String,
    /// ISO timestamp; the backend DTO requires it.
    pub created_at: String,
    pub role_id: Option<String>,
}

const TOKEN_KEYS: &[&str] = &["accessToken", "AccessToken"];

#[derive(Clone)]
pub struct AuthService {
    client: ApiClient,
    otp: OtpStore,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        let otp = OtpStore::new(client.storage().clone());
        Self { client, otp }
    }

    pub fn otp(&self) -> &OtpStore { &self.otp }

    pub fn client(&self) -> &ApiClient { &self.client }

    pub async fn login(&self, phone: &str, password: &str) -> ApiResult<AuthResult> {
        let request = LoginRequest { phone_number: phone.to_string(), password: password.to_string() };
        let raw = self
            .client
            .execute_raw(Method::Post, LOGIN_PATH, serde_json::to_value(&request)?, &RequestConfig::anonymous())
            .await?;
        let result = self.read_grant(&raw)?;

        let refresh_token = result.refresh_token.as_deref().filter(|t| !t.trim().is_empty());
        let mut mode = if refresh_token.is_some() { TransportMode::Body } else { TransportMode::Cookie };
        if mode == TransportMode::Cookie && !self.client.cookies_supported() {
            warn!(target: "panel_client::auth", "cookie jar unavailable; using body transport");
            mode = TransportMode::Body;
        }

        self.client.coordinator().begin_session(Session {
            access_token: result.access_token.clone(),
            refresh_token: refresh_token.map(str::to_string),
            transport_mode: mode,
            expires_at: result.expires_at.as_deref().and_then(parse_expiry),
        });
        info!(target: "panel_client::auth", mode = mode.as_str(), "logged in");
        tprintln!("auth.login mode={} sid={:?}", mode.as_str(), result.session_id);
        Ok(result)
    }

    /// Locate `{accessToken, ...}` in a login body, enveloped or not.
    fn read_grant(&self, raw: &Value) -> ApiResult<AuthResult> {
        let grant = envelope::find_layer(raw, TOKEN_KEYS)
            .map(|layer| serde_json::from_value::<AuthResult>(Value::Object(layer.clone())))
            .transpose()?
            .filter(|r| !r.access_token.trim().is_empty());
        if let Some(result) = grant {
            return Ok(result);
        }
        let canonical = envelope::normalize(raw);
        let message = if canonical.success { "login response carried no access token".to_string() } else { canonical.message };
        let err = ApiError::Logical { status: None, message, details: canonical.details, trace_id: canonical.trace_id };
        self.client.notify(NoticeLevel::Error, err.message());
        Err(err)
    }

    /// Ask the backend to text a sign-up code and open a fresh OTP session.
    pub async fn send_otp(&self, phone: &str) -> ApiResult<()> {
        let body = SendOtpRequest { phone_number: phone.to_string() };
        let _: Value = self.client.post_result_with(SEND_OTP_PATH, &body, &RequestConfig::anonymous()).await?;
        self.otp.start(phone);
        Ok(())
    }

    /// Returns whether the code was accepted. A successful answer without an
    /// explicit flag counts as accepted.
    pub async fn verify_otp(&self, phone: &str, code: &str) -> ApiResult<bool> {
        let body = VerifyOtpRequest { phone_number: phone.to_string(), otp_code: code.to_string() };
        let verified: Option<bool> = self.client.post_result_with(VERIFY_OTP_PATH, &body, &RequestConfig::anonymous()).await?;
        let verified = verified.unwrap_or(true);
        if verified {
            self.otp.mark_verified();
        }
        Ok(verified)
    }

    pub async fn complete_registration(&self, request: &CompleteRegistrationRequest) -> ApiResult<()> {
        let _: Value = self.client.post_result_with(REGISTER_PATH, request, &RequestConfig::anonymous()).await?;
        self.otp.clear();
        info!(target: "panel_client::auth", "registration completed");
        Ok(())
    }

    pub async fn get_current_user(&self) -> ApiResult<UserDto> { self.client.get_result(ME_PATH).await }

    /// Tell the backend to revoke the session, then forget it locally no matter
    /// how that went. The returned result is the network outcome only.
    pub async fn logout(&self) -> ApiResult<()> {
        let body = match self.client.coordinator().session() {
            Some(Session { transport_mode: TransportMode::Body, refresh_token: Some(rt), .. }) => json!({ "refreshToken": rt }),
            _ => json!({}),
        };
        let logout_path = self.client.config().logout_path.clone();
        let outcome = self.client.post(&logout_path, &body, &RequestConfig::silent()).await;
        self.client.coordinator().end_session();
        match &outcome {
            Ok(_) => info!(target: "panel_client::auth", "logged out"),
            Err(e) => warn!(target: "panel_client::auth", "logout call failed, session cleared locally: {}", e),
        }
        outcome.map(|_| ())
    }

    pub async fn refresh_access_token(&self) -> ApiResult<String> { self.client.coordinator().refresh().await }
}
