// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end session tests.
//!
//! Runs an in-process mock of the account server (REST under `/api`, push
//! events on `/ws`) and resolves the compiled `sophy` binary for smoke tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path as UrlPath, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use sophy_session::ClientConfig;

/// Resolve the path to the compiled `sophy` binary.
pub fn sophy_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("sophy")
}

struct Account {
    user_id: String,
    password: String,
    fullname: String,
}

#[derive(Clone)]
struct Challenge {
    expires_at: DateTime<Utc>,
    status: &'static str,
}

#[derive(Default)]
struct Inner {
    /// phone → account
    accounts: HashMap<String, Account>,
    /// access token → user id
    access: HashMap<String, String>,
    /// refresh token → user id
    refresh: HashMap<String, String>,
    challenges: HashMap<String, Challenge>,
    push: HashMap<String, mpsc::UnboundedSender<String>>,
}

/// Shared state behind the mock server.
pub struct MockState {
    inner: Mutex<Inner>,
    minted: AtomicUsize,
    refresh_calls: AtomicUsize,
    qr_ttl: Mutex<Duration>,
    refresh_delay: Mutex<Duration>,
}

impl MockState {
    fn mint(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.minted.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Issue a fresh token pair for `user_id`.
    fn issue(&self, user_id: &str) -> (String, String) {
        let access = self.mint("A");
        let refresh = self.mint("R");
        let mut inner = self.inner.lock();
        inner.access.insert(access.clone(), user_id.to_owned());
        inner.refresh.insert(refresh.clone(), user_id.to_owned());
        (access, refresh)
    }

    fn user_for(&self, headers: &HeaderMap) -> Option<String> {
        let token = bearer(headers)?;
        self.inner.lock().access.get(token).cloned()
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization")?.to_str().ok()?.strip_prefix("Bearer ")
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn unauthorized() -> Response {
    reply(StatusCode::UNAUTHORIZED, json!({ "message": "Unauthorized" }))
}

/// An account server running on a loopback port until dropped.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            inner: Mutex::new(Inner::default()),
            minted: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            qr_ttl: Mutex::new(Duration::from_secs(60)),
            refresh_delay: Mutex::new(Duration::ZERO),
        });
        let router = build_router(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Self { addr, state, handle })
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn push_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client settings pointing at this server, with state under `state_dir`.
    pub fn client_config(&self, state_dir: &Path) -> ClientConfig {
        ClientConfig {
            api_url: self.api_url(),
            push_url: self.push_url(),
            request_timeout_ms: 5000,
            tick_ms: 100,
            state_dir: Some(state_dir.to_path_buf()),
            ..Default::default()
        }
    }

    pub fn add_account(&self, phone: &str, password: &str, user_id: &str, fullname: &str) {
        self.state.inner.lock().accounts.insert(
            phone.to_owned(),
            Account { user_id: user_id.to_owned(), password: password.to_owned(), fullname: fullname.to_owned() },
        );
    }

    /// Mint a session for `user_id` without going through login.
    pub fn issue_tokens(&self, user_id: &str) -> (String, String) {
        self.state.issue(user_id)
    }

    /// Invalidate every access token; refresh tokens stay valid.
    pub fn expire_access_tokens(&self) {
        self.state.inner.lock().access.clear();
    }

    /// Invalidate every refresh token.
    pub fn revoke_refresh_tokens(&self) {
        self.state.inner.lock().refresh.clear();
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn set_qr_ttl(&self, ttl: Duration) {
        *self.state.qr_ttl.lock() = ttl;
    }

    /// Hold every refresh response for `delay`.
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock() = delay;
    }

    pub fn is_access_token_valid(&self, token: &str) -> bool {
        self.state.inner.lock().access.contains_key(token)
    }

    /// Wait until a push client has announced itself for `qr_token`.
    pub async fn wait_for_push_client(&self, qr_token: &str, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.state.inner.lock().push.contains_key(qr_token) {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("no push client for {qr_token}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    /// Latest challenge token handed out.
    pub fn latest_qr_token(&self) -> Option<String> {
        let inner = self.state.inner.lock();
        inner
            .challenges
            .iter()
            .max_by_key(|(_, c)| c.expires_at)
            .map(|(token, _)| token.clone())
    }

    fn send_push(&self, qr_token: &str, event: &str, data: Value) -> anyhow::Result<()> {
        let frame = json!({ "event": event, "data": data }).to_string();
        let tx = self.state.inner.lock().push.get(qr_token).cloned();
        let tx = tx.ok_or_else(|| anyhow::anyhow!("no push client for {qr_token}"))?;
        tx.send(frame).map_err(|_| anyhow::anyhow!("push client for {qr_token} is gone"))
    }

    /// Play the phone: scan the code.
    pub fn scan(&self, qr_token: &str, fullname: &str) -> anyhow::Result<()> {
        if let Some(c) = self.state.inner.lock().challenges.get_mut(qr_token) {
            c.status = "scanned";
        }
        self.send_push(qr_token, "qrScanned", json!({ "fullname": fullname, "urlavatar": null }))
    }

    /// Play the phone: approve the login. Returns the issued access token.
    pub fn confirm(&self, qr_token: &str, user_id: &str) -> anyhow::Result<String> {
        let (access, refresh) = self.state.issue(user_id);
        if let Some(c) = self.state.inner.lock().challenges.get_mut(qr_token) {
            c.status = "authenticated";
        }
        self.send_push(
            qr_token,
            "qrLoginConfirmed",
            json!({ "userId": user_id, "accessToken": access, "refreshToken": refresh }),
        )?;
        Ok(access)
    }

    pub fn reject(&self, qr_token: &str, message: &str) -> anyhow::Result<()> {
        self.send_push(qr_token, "qrLoginRejected", json!({ "message": message }))
    }

    /// Send a frame with an event name the client does not know.
    pub fn send_unknown(&self, qr_token: &str) -> anyhow::Result<()> {
        self.send_push(qr_token, "typing", json!({}))
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn build_router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/change-password", put(change_password))
        .route("/api/auth/generate-qr-token", post(generate_qr))
        .route("/api/auth/verify-qr-token", post(verify_qr))
        .route("/api/auth/check-qr-status/{qr_token}", post(check_qr))
        .route("/api/users/me", get(me))
        .route("/api/users/get-user-by-id/{user_id}", get(user_by_id))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginBody {
    phone: String,
    password: String,
}

fn auth_body(user_id: &str, fullname: &str, access: &str, refresh: &str) -> Value {
    json!({
        "token": { "accessToken": access, "refreshToken": refresh },
        "user": { "userId": user_id, "fullname": fullname },
    })
}

async fn login(State(s): State<Arc<MockState>>, Json(body): Json<LoginBody>) -> Response {
    let found = {
        let inner = s.inner.lock();
        inner.accounts.get(&body.phone).map(|a| (a.password == body.password, a.user_id.clone(), a.fullname.clone()))
    };
    match found {
        None => reply(StatusCode::NOT_FOUND, json!({ "message": "Account not found" })),
        Some((false, _, _)) => reply(StatusCode::UNAUTHORIZED, json!({ "message": "Wrong password" })),
        Some((true, user_id, fullname)) => {
            let (access, refresh) = s.issue(&user_id);
            reply(StatusCode::OK, auth_body(&user_id, &fullname, &access, &refresh))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    phone: String,
    password: String,
    fullname: String,
}

async fn register(State(s): State<Arc<MockState>>, Json(body): Json<RegisterBody>) -> Response {
    let user_id = format!("U-{}", uuid::Uuid::new_v4());
    {
        let mut inner = s.inner.lock();
        if inner.accounts.contains_key(&body.phone) {
            return reply(StatusCode::BAD_REQUEST, json!({ "message": "Phone already registered" }));
        }
        inner.accounts.insert(
            body.phone.clone(),
            Account { user_id: user_id.clone(), password: body.password.clone(), fullname: body.fullname.clone() },
        );
    }
    let (access, refresh) = s.issue(&user_id);
    reply(StatusCode::CREATED, auth_body(&user_id, &body.fullname, &access, &refresh))
}

async fn refresh(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    s.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *s.refresh_delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let user = bearer(&headers).and_then(|t| s.inner.lock().refresh.remove(t));
    match user {
        Some(user_id) => {
            let (access, refresh) = s.issue(&user_id);
            reply(StatusCode::OK, json!({ "accessToken": access, "refreshToken": refresh }))
        }
        None => reply(StatusCode::UNAUTHORIZED, json!({ "message": "Invalid refresh token" })),
    }
}

async fn logout(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let Some(token) = bearer(&headers).map(str::to_owned) else {
        return unauthorized();
    };
    let mut inner = s.inner.lock();
    match inner.access.remove(&token) {
        Some(user_id) => {
            inner.refresh.retain(|_, u| *u != user_id);
            reply(StatusCode::OK, json!({ "message": "Logged out" }))
        }
        None => unauthorized(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordBody {
    user_id: String,
    old_password: String,
    new_password: String,
}

async fn change_password(State(s): State<Arc<MockState>>, Json(body): Json<ChangePasswordBody>) -> Response {
    let mut inner = s.inner.lock();
    let Some(account) = inner.accounts.values_mut().find(|a| a.user_id == body.user_id) else {
        return reply(StatusCode::NOT_FOUND, json!({ "message": "User not found" }));
    };
    if account.password != body.old_password {
        return reply(StatusCode::UNAUTHORIZED, json!({ "message": "Old password is incorrect" }));
    }
    account.password = body.new_password;
    reply(StatusCode::OK, json!({ "message": "Password changed" }))
}

async fn generate_qr(State(s): State<Arc<MockState>>) -> Response {
    let qr_token = format!("qr-{}", s.minted.fetch_add(1, Ordering::SeqCst) + 1);
    let ttl = chrono::Duration::from_std(*s.qr_ttl.lock()).unwrap_or_default();
    let expires_at = Utc::now() + ttl;
    s.inner.lock().challenges.insert(qr_token.clone(), Challenge { expires_at, status: "pending" });
    reply(StatusCode::OK, json!({ "qrToken": qr_token, "expiresAt": expires_at.to_rfc3339() }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QrBody {
    qr_token: String,
}

fn challenge_status(s: &MockState, qr_token: &str) -> Result<Challenge, Response> {
    let challenge = s.inner.lock().challenges.get(qr_token).cloned();
    match challenge {
        None => Err(reply(StatusCode::NOT_FOUND, json!({ "message": "QR token not found" }))),
        Some(c) if c.expires_at <= Utc::now() => {
            Err(reply(StatusCode::BAD_REQUEST, json!({ "message": "QR token expired" })))
        }
        Some(c) => Ok(c),
    }
}

async fn verify_qr(State(s): State<Arc<MockState>>, Json(body): Json<QrBody>) -> Response {
    if let Err(resp) = challenge_status(&s, &body.qr_token) {
        return resp;
    }
    if let Some(c) = s.inner.lock().challenges.get_mut(&body.qr_token) {
        c.status = "scanned";
    }
    reply(StatusCode::OK, json!({ "message": "QR code scanned" }))
}

async fn check_qr(State(s): State<Arc<MockState>>, UrlPath(qr_token): UrlPath<String>) -> Response {
    match challenge_status(&s, &qr_token) {
        Ok(c) => reply(StatusCode::OK, json!({ "status": c.status })),
        Err(resp) => resp,
    }
}

async fn me(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    match s.user_for(&headers) {
        Some(user_id) => reply(StatusCode::OK, json!({ "userId": user_id })),
        None => unauthorized(),
    }
}

async fn user_by_id(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    UrlPath(user_id): UrlPath<String>,
) -> Response {
    if s.user_for(&headers).is_none() {
        return unauthorized();
    }
    let inner = s.inner.lock();
    match inner.accounts.values().find(|a| a.user_id == user_id) {
        Some(a) => reply(StatusCode::OK, json!({ "userId": a.user_id, "fullname": a.fullname })),
        None => reply(StatusCode::NOT_FOUND, json!({ "message": "User not found" })),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsQuery {
    qr_token: String,
}

async fn ws_handler(
    State(s): State<Arc<MockState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, s, query.qr_token))
}

/// Register the connection once the client sends `initQrLogin`, then
/// forward frames queued by the test.
async fn handle_ws(socket: WebSocket, s: Arc<MockState>, qr_token: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let init: Option<Value> = serde_json::from_str(&text).ok();
                    let announced = init
                        .as_ref()
                        .filter(|v| v["event"] == "initQrLogin")
                        .and_then(|v| v["data"].as_str())
                        .map(str::to_owned);
                    if announced.as_deref() == Some(qr_token.as_str()) {
                        s.inner.lock().push.insert(qr_token.clone(), tx.clone());
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                _ => {}
            },
        }
    }
    s.inner.lock().push.remove(&qr_token);
    tracing::debug!(%qr_token, "push client disconnected");
}
