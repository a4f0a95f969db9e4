// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mock Rahnum backend for integration tests.
//!
//! A real axum server on `127.0.0.1:0` exposing login, token refresh, a
//! bearer-protected `/profile/`, and a few odd endpoints. Every handler
//! counts its calls and records the `Authorization` header it saw.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use rahnum_client::test_support::{http_client, mint_token, RecordingTimer};
use rahnum_client::timer::{Clock, SystemClock, Timer};
use rahnum_client::{ApiClient, AuthSession, CredentialStore, RefreshPolicy, TokenKind};

pub const GOOD_REFRESH: &str = "good-refresh";
pub const USERNAME: &str = "ada";
pub const PASSWORD: &str = "correct horse";

#[derive(Default)]
pub struct Backend {
    /// The one access token `/profile/` accepts.
    pub valid_access: Mutex<String>,
    pub refresh_delay: Mutex<Duration>,
    /// Rotate refresh tokens on refresh (returns `refresh` as well).
    pub rotate: Mutex<bool>,
    pub refresh_calls: AtomicU32,
    pub refresh_seen_at: Mutex<Vec<Instant>>,
    pub profile_calls: AtomicU32,
    pub rejecting_calls: AtomicU32,
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub upload_content_types: Mutex<Vec<Option<String>>>,
    pub upload_bodies: Mutex<Vec<Bytes>>,
    pub json_content_types: Mutex<Vec<Option<String>>>,
}

impl Backend {
    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> u32 {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn last_auth_header(&self) -> Option<String> {
        self.auth_headers.lock().last().cloned().flatten()
    }

    /// Issue a new valid access token expiring `secs` from now.
    pub fn issue(&self, secs: u64) -> String {
        let token = expires_in(secs);
        *self.valid_access.lock() = token.clone();
        token
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<Backend>,
}

impl MockBackend {
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn refresh_url(&self) -> String {
        format!("{}/token/refresh/", self.base_url())
    }
}

pub fn expires_in(secs: u64) -> String {
    mint_token("1", SystemClock.now_ms() / 1000 + secs)
}

/// A token that looks fresh locally but that the backend never issued.
pub fn revoked() -> String {
    mint_token("revoked", SystemClock.now_ms() / 1000 + 3600)
}

pub fn expired() -> String {
    mint_token("1", SystemClock.now_ms() / 1000 - 30)
}

fn auth_of(headers: &HeaderMap) -> Option<String> {
    headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

fn content_type_of(headers: &HeaderMap) -> Option<String> {
    headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

async fn refresh(State(s): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    s.refresh_calls.fetch_add(1, Ordering::SeqCst);
    s.refresh_seen_at.lock().push(Instant::now());
    let delay = *s.refresh_delay.lock();
    tokio::time::sleep(delay).await;

    if body["refresh"] != GOOD_REFRESH {
        let detail = json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" });
        return (StatusCode::UNAUTHORIZED, Json(detail)).into_response();
    }
    let access = s.issue(3600);
    if *s.rotate.lock() {
        Json(json!({ "access": access, "refresh": GOOD_REFRESH })).into_response()
    } else {
        Json(json!({ "access": access })).into_response()
    }
}

async fn login(State(s): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    if body["username"] != USERNAME || body["password"] != PASSWORD {
        let detail = json!({ "detail": "No active account found with the given credentials" });
        return (StatusCode::UNAUTHORIZED, Json(detail)).into_response();
    }
    let access = s.issue(3600);
    Json(json!({
        "access": access,
        "refresh": GOOD_REFRESH,
        "user": { "id": 1, "username": USERNAME, "role": "student" },
    }))
    .into_response()
}

async fn profile(State(s): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    s.profile_calls.fetch_add(1, Ordering::SeqCst);
    let auth = auth_of(&headers);
    s.auth_headers.lock().push(auth.clone());
    let expected = format!("Bearer {}", s.valid_access.lock());
    if auth.as_deref() == Some(expected.as_str()) {
        Json(json!({ "id": 1, "username": USERNAME })).into_response()
    } else {
        let detail = json!({ "detail": "Given token not valid for any token type" });
        (StatusCode::UNAUTHORIZED, Json(detail)).into_response()
    }
}

async fn always_401(State(s): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    s.rejecting_calls.fetch_add(1, Ordering::SeqCst);
    s.auth_headers.lock().push(auth_of(&headers));
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "nope" }))).into_response()
}

async fn upload(State(s): State<Arc<Backend>>, headers: HeaderMap, body: Bytes) -> Response {
    s.upload_content_types.lock().push(content_type_of(&headers));
    s.auth_headers.lock().push(auth_of(&headers));
    let len = body.len();
    s.upload_bodies.lock().push(body);
    Json(json!({ "received": len })).into_response()
}

async fn echo(State(s): State<Arc<Backend>>, headers: HeaderMap, body: Bytes) -> Response {
    s.json_content_types.lock().push(content_type_of(&headers));
    let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Json(json!({ "echo": parsed })).into_response()
}

async fn text() -> Response {
    "pong".into_response()
}

async fn empty_json() -> Response {
    ([(header::CONTENT_TYPE, "application/json")], "").into_response()
}

async fn broken_json() -> Response {
    ([(header::CONTENT_TYPE, "application/json")], "{not json").into_response()
}

async fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "message": "students cannot grade" }))).into_response()
}

async fn text_error() -> Response {
    (StatusCode::BAD_GATEWAY, "upstream down").into_response()
}

pub async fn start_backend() -> anyhow::Result<MockBackend> {
    let state = Arc::new(Backend::default());
    let api = Router::new()
        .route("/token/refresh/", post(refresh))
        .route("/login/", post(login))
        .route("/signup/", post(login))
        .route("/profile/", get(profile))
        .route("/always-401/", get(always_401))
        .route("/upload/", post(upload))
        .route("/echo/", post(echo).put(echo))
        .route("/text/", get(text))
        .route("/empty/", get(empty_json).delete(empty_json))
        .route("/broken/", get(broken_json))
        .route("/forbidden/", get(forbidden))
        .route("/text-error/", get(text_error))
        .with_state(Arc::clone(&state));
    let app = Router::new().nest("/api", api);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(MockBackend { addr, state })
}

/// Client against `backend` whose timers only fire on demand.
pub fn client_for(backend: &MockBackend) -> (ApiClient, Arc<RecordingTimer>) {
    let timer = RecordingTimer::new();
    let session = session_for(backend, Arc::clone(&timer) as Arc<dyn Timer>, RefreshPolicy::default());
    (ApiClient::with_session(backend.base_url(), http_client(), session), timer)
}

pub fn session_for(
    backend: &MockBackend,
    timer: Arc<dyn Timer>,
    policy: RefreshPolicy,
) -> Arc<AuthSession> {
    AuthSession::builder(CredentialStore::in_memory(), http_client(), backend.refresh_url())
        .policy(policy)
        .timer(timer)
        .build()
}

/// Seed a session directly into the store.
pub fn seed(client: &ApiClient, access: &str, refresh: &str) {
    let store = client.session().store();
    store.set(TokenKind::Access, access);
    store.set(TokenKind::Refresh, refresh);
    store.set_profile(&json!({ "id": 1 }));
}
