//! In-process admin API used by the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use panel_client::client::{ChannelNotifier, Notice};
use panel_client::storage::{KvStorage, MemoryStorage, SharedStorage};
use panel_client::{ApiClient, ClientConfig};

pub const REFRESH_COOKIE: &str = "refreshToken=rt-cookie";

#[derive(Default)]
pub struct MockState {
    /// Bearer token protected routes accept.
    pub valid_token: Mutex<String>,
    /// Token handed out by a successful refresh.
    pub next_token: Mutex<String>,
    /// Refresh token included in the login body, if any.
    pub login_refresh_token: Mutex<Option<String>>,
    pub cookie_refresh_ok: AtomicBool,
    pub body_refresh_ok: AtomicBool,
    pub refresh_delay_ms: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub refresh_bodies: Mutex<Vec<Value>>,
    pub me_always_401: AtomicBool,
    /// `Auth/me` answers success without a user payload.
    pub me_without_data: AtomicBool,
    pub me_auth_headers: Mutex<Vec<String>>,
    pub logout_bodies: Mutex<Vec<Value>>,
    pub users_fail: AtomicBool,
    pub users_calls: AtomicUsize,
    pub roles: Mutex<Vec<Value>>,
    pub assigned: Mutex<Vec<Value>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        let s = Self::default();
        *s.valid_token.lock() = "abc".to_string();
        *s.next_token.lock() = "fresh".to_string();
        s.cookie_refresh_ok.store(true, Ordering::SeqCst);
        s.body_refresh_ok.store(true, Ordering::SeqCst);
        *s.roles.lock() = vec![json!({ "id": "r1", "name": "Admin" })];
        Arc::new(s)
    }

    /// Make every currently issued token stale.
    pub fn expire_tokens(&self) { *self.valid_token.lock() = "rotated-away".to_string(); }

    pub fn refresh_calls(&self) -> usize { self.refresh_calls.load(Ordering::SeqCst) }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid_token.lock());
        headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(expected.as_str())
    }
}

type Shared = Arc<MockState>;

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "token expired" }))).into_response()
}

async fn login(State(s): State<Shared>, Json(body): Json<Value>) -> Response {
    if body["password"] != "secret" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "success": false, "message": "invalid credentials" }))).into_response();
    }
    let token = s.valid_token.lock().clone();
    let mut out = json!({
        "accessToken": token,
        "expiresAt": "2030-01-01T00:00:00Z",
        "sessionId": "sid-1",
        "userInfo": { "id": "u1", "phoneNumber": body["phoneNumber"], "fullName": "Admin User", "roles": ["Admin"] }
    });
    if let Some(rt) = s.login_refresh_token.lock().clone() {
        out["refreshToken"] = json!(rt);
    }
    let cookie = format!("{}; Path=/; HttpOnly", REFRESH_COOKIE);
    (StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(out)).into_response()
}

async fn refresh(State(s): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    s.refresh_calls.fetch_add(1, Ordering::SeqCst);
    s.refresh_bodies.lock().push(body.clone());
    let delay = s.refresh_delay_ms.load(Ordering::SeqCst) as u64;
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let accepted = if body.get("refreshToken").is_some() {
        s.body_refresh_ok.load(Ordering::SeqCst)
    } else {
        let has_cookie = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(|c| c.contains(REFRESH_COOKIE))
            .unwrap_or(false);
        has_cookie && s.cookie_refresh_ok.load(Ordering::SeqCst)
    };
    if !accepted {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "refresh token invalid" }))).into_response();
    }
    let token = s.next_token.lock().clone();
    *s.valid_token.lock() = token.clone();
    Json(json!({ "isSuccess": true, "value": { "accessToken": token, "expiresAt": "2030-01-01T00:00:00" } })).into_response()
}

async fn me(State(s): State<Shared>, headers: HeaderMap) -> Response {
    let seen = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    s.me_auth_headers.lock().push(seen);
    // `x-delay-ms` holds the response back, so a 401 can land after a refresh settled
    let delay = headers
        .get("x-delay-ms")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if s.me_always_401.load(Ordering::SeqCst) || !s.authorized(&headers) {
        return unauthorized();
    }
    if s.me_without_data.load(Ordering::SeqCst) {
        return Json(json!({ "success": true, "message": "ok" })).into_response();
    }
    Json(json!({
        "success": true,
        "data": { "id": "u1", "phoneNumber": "09121234567", "fullName": "Admin User", "roles": ["Admin"] }
    }))
    .into_response()
}

async fn logout(State(s): State<Shared>, Json(body): Json<Value>) -> Response {
    s.logout_bodies.lock().push(body);
    Json(json!({ "success": true, "message": "bye" })).into_response()
}

async fn send_otp(Json(body): Json<Value>) -> Response {
    Json(json!({ "success": true, "message": format!("code sent to {}", body["phoneNumber"].as_str().unwrap_or("")), "data": null }))
        .into_response()
}

async fn verify_otp(Json(body): Json<Value>) -> Response {
    if body["otpCode"] == "1234" {
        Json(json!({ "success": true, "message": "verified", "data": true })).into_response()
    } else {
        Json(json!({ "success": false, "message": "invalid code" })).into_response()
    }
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["password"] != body["confirmPassword"] {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "title": "passwords do not match" }))).into_response();
    }
    Json(json!({ "success": true, "message": "registered" })).into_response()
}

async fn list_roles(State(s): State<Shared>, headers: HeaderMap) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    let roles = s.roles.lock().clone();
    // nested the way the gateway wraps controller results
    Json(json!({ "data": { "data": { "isSuccess": true, "message": "ok", "Value": roles } } })).into_response()
}

async fn create_role(State(s): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    let mut roles = s.roles.lock();
    if roles.iter().any(|r| r["name"] == body["name"]) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "success": false, "message": "role already exists", "traceId": "00-conflict" })),
        )
            .into_response();
    }
    let role = json!({ "id": format!("r{}", roles.len() + 1), "name": body["name"], "description": body.get("description") });
    roles.push(role.clone());
    Json(json!({ "success": true, "message": "created", "data": role })).into_response()
}

async fn delete_role(State(s): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    s.roles.lock().retain(|r| r["id"] != id.as_str());
    Json(json!({ "success": true, "message": "deleted" })).into_response()
}

async fn assign_permissions(
    State(s): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    s.assigned.lock().push(json!({ "role": id, "body": body }));
    Json(json!({ "success": true, "message": "assigned" })).into_response()
}

async fn permission_by_name(State(s): State<Shared>, headers: HeaderMap, Path(name): Path<String>) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "IsSuccess": true, "Data": { "id": "p1", "name": name } })).into_response()
}

async fn users(State(s): State<Shared>) -> Response {
    s.users_calls.fetch_add(1, Ordering::SeqCst);
    if s.users_fail.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "title": "Internal Server Error", "status": 500 })))
            .into_response();
    }
    Json(json!({
        "isSuccess": true,
        "value": [
            { "id": "u1", "phoneNumber": "09121234567", "fullName": "Admin User", "roles": ["Admin"] },
            { "id": "u2", "phoneNumber": "09351234567", "fullName": "Operator", "roles": [] }
        ]
    }))
    .into_response()
}

async fn logical_fail() -> Response {
    Json(json!({ "success": false, "message": "quota exceeded", "traceId": "t-9" })).into_response()
}

async fn plain_text() -> Response { (StatusCode::OK, "<html>maintenance</html>").into_response() }

pub fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/Auth/login", post(login))
        .route("/api/Auth/refresh-token", post(refresh))
        .route("/api/Auth/me", get(me))
        .route("/api/Auth/logout", post(logout))
        .route("/api/Auth/send-otp", post(send_otp))
        .route("/api/Auth/verify-otp", post(verify_otp))
        .route("/api/Auth/register-user", post(register))
        .route("/api/admin/roles", get(list_roles).post(create_role))
        .route("/api/admin/roles/{id}", delete(delete_role))
        .route("/api/admin/roles/{id}/assign-permissions", post(assign_permissions))
        .route("/api/admin/Permissions/by-name/{name}", get(permission_by_name))
        .route("/api/Home/UsersList", get(users))
        .route("/api/logical-fail", get(logical_fail))
        .route("/api/plain", get(plain_text))
        .with_state(state)
}

/// Serve the mock API on an ephemeral port; returns the base URL.
pub async fn spawn(state: Shared) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api/", addr)
}

/// Base URL on which nothing listens.
pub fn dead_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/api/", port)
}

pub fn test_config(base: &str) -> ClientConfig {
    ClientConfig {
        retry_base_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        ..ClientConfig::default().with_base_url(base)
    }
}

pub struct Harness {
    pub client: ApiClient,
    pub storage: SharedStorage,
    pub notices: UnboundedReceiver<Notice>,
}

impl Harness {
    pub fn with_config(config: ClientConfig) -> Self {
        Self::with_storage(config, MemoryStorage::shared())
    }

    pub fn with_storage(config: ClientConfig, storage: SharedStorage) -> Self {
        let (notifier, notices) = ChannelNotifier::channel();
        let client = ApiClient::builder(config)
            .storage(storage.clone())
            .notifier(Arc::new(notifier))
            .build()
            .unwrap();
        Self { client, storage, notices }
    }

    pub fn new(base: &str) -> Self { Self::with_config(test_config(base)) }

    /// Persist a session directly, as if a previous run had logged in.
    pub fn seed_session(&self, access: &str, refresh: Option<&str>, mode: &str) {
        self.storage.set("accessToken", access).unwrap();
        if let Some(rt) = refresh {
            self.storage.set("refresh_token", rt).unwrap();
        }
        self.storage.set("transport_mode", mode).unwrap();
    }

    /// Every notice raised so far.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(n) = self.notices.try_recv() {
            out.push(n);
        }
        out
    }
}
