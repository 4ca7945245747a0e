//! Mock API server shared by the gateway, guard, and lifecycle tests.
//!
//! Routes:
//! - `POST /refresh` renews `R1` into `A2`/`R2` (or fails with 500)
//! - `POST /session`, `POST /users` issue `A1`/`R1` for password `hunter2`
//! - `GET /data`, `POST /echo` accept only `Bearer A2`, else 401 token.expired
//! - `GET /always-expired` always 401 token.expired
//! - `GET /invalid` always 401 token.invalid
//! - `GET /boom` always 500
//! - `GET /throttled` always 429 with `Retry-After` and a binary body
//! - `GET /public` always 200

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use session_auth::{CredentialPair, CredentialStore, MemoryStore};
use session_refresh::{ContextMode, HttpRenewer, RefreshConfig, RefreshCoordinator};
use tokio::net::TcpListener;

use crate::context::ExecutionContext;
use crate::gateway::AuthGateway;

/// Body of `/throttled`; deliberately not valid UTF-8.
pub const THROTTLED_BODY: &[u8] = &[0xff, 0x00, 0xfe, 0x80];

#[derive(Clone, Copy)]
pub enum RefreshReply {
    Renewed,
    Fails,
}

struct MockState {
    reply: RefreshReply,
    renewals: AtomicUsize,
    seen: Mutex<Vec<(String, Option<String>)>>,
    hold: Mutex<Option<(RefreshCoordinator, usize)>>,
}

pub struct MockApi {
    pub url: String,
    state: Arc<MockState>,
}

impl MockApi {
    pub async fn start(reply: RefreshReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(MockState {
            reply,
            renewals: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            hold: Mutex::new(None),
        });

        let app = Router::new()
            .route("/refresh", post(refresh))
            .route("/session", post(issue))
            .route("/users", post(issue))
            .route("/data", get(data))
            .route("/echo", post(echo))
            .route("/always-expired", get(always_expired))
            .route("/invalid", get(invalid))
            .route("/boom", get(boom))
            .route("/throttled", get(throttled))
            .route("/public", get(public))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, state }
    }

    /// Make `/refresh` wait until `waiting` callers are queued on the
    /// coordinator, so concurrent expiries are guaranteed to share it.
    pub fn hold_refresh_until(&self, coordinator: RefreshCoordinator, waiting: usize) {
        *self.state.hold.lock().unwrap() = Some((coordinator, waiting));
    }

    pub fn renewals(&self) -> usize {
        self.state.renewals.load(Ordering::SeqCst)
    }

    /// `Authorization` headers received on `path`, in arrival order.
    pub fn seen_auth(&self, path: &str) -> Vec<Option<String>> {
        self.state
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, auth)| auth.clone())
            .collect()
    }
}

fn record(state: &MockState, uri: &Uri, headers: &HeaderMap) -> Option<String> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state
        .seen
        .lock()
        .unwrap()
        .push((uri.path().to_string(), auth.clone()));
    auth
}

fn expired() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": true, "code": "token.expired", "message": "Token expired."})),
    )
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.renewals.fetch_add(1, Ordering::SeqCst);

    let hold = state.hold.lock().unwrap().clone();
    if let Some((coordinator, waiting)) = hold {
        while coordinator.pending() < waiting {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    if body["refresh_token"] != "R1" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"code": "token.invalid"})));
    }
    match state.reply {
        RefreshReply::Renewed => (
            StatusCode::OK,
            Json(json!({"token": "A2", "refresh_token": "R2"})),
        ),
        RefreshReply::Fails => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "refresh backend down"})),
        ),
    }
}

async fn issue(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["password"] == "hunter2" {
        (StatusCode::OK, Json(json!({"token": "A1", "refresh_token": "R1"})))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "E-mail or password incorrect"})),
        )
    }
}

async fn data(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    match record(&state, &uri, &headers).as_deref() {
        Some("Bearer A2") => (StatusCode::OK, Json(json!({"data": "ok"}))),
        _ => expired(),
    }
}

async fn echo(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match record(&state, &uri, &headers).as_deref() {
        Some("Bearer A2") => (
            StatusCode::OK,
            Json(json!({"method": method.as_str(), "body": body})),
        ),
        _ => expired(),
    }
}

async fn always_expired(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    record(&state, &uri, &headers);
    expired()
}

async fn invalid(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    record(&state, &uri, &headers);
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": true, "code": "token.invalid", "message": "Invalid token."})),
    )
}

async fn boom(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    record(&state, &uri, &headers);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"message": "internal error"})),
    )
}

async fn throttled(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> impl IntoResponse {
    record(&state, &uri, &headers);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(RETRY_AFTER, "7"), (CONTENT_TYPE, "application/octet-stream")],
        THROTTLED_BODY,
    )
}

async fn public(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> StatusCode {
    record(&state, &uri, &headers);
    StatusCode::OK
}

/// Context backed by a `MemoryStore`, renewing against `base_url`.
pub fn context(
    mode: ContextMode,
    base_url: &str,
    pair: Option<CredentialPair>,
) -> (ExecutionContext, Arc<MemoryStore>) {
    let config = RefreshConfig::default();
    let store = Arc::new(match pair {
        Some(pair) => MemoryStore::with_pair(pair, config.credential_ttl),
        None => MemoryStore::new(),
    });
    let renewer = Arc::new(HttpRenewer::new(reqwest::Client::new(), base_url));
    let ctx = ExecutionContext::new(mode, store.clone() as Arc<dyn CredentialStore>, renewer, config);
    (ctx, store)
}

pub fn interactive_gateway(api: &MockApi, pair: Option<CredentialPair>) -> (AuthGateway, Arc<MemoryStore>) {
    let (ctx, store) = context(ContextMode::Interactive, &api.url, pair);
    (AuthGateway::new(reqwest::Client::new(), &api.url, ctx), store)
}

pub fn server_gateway(api: &MockApi, pair: Option<CredentialPair>) -> (AuthGateway, Arc<MemoryStore>) {
    let (ctx, store) = context(ContextMode::ServerRender, &api.url, pair);
    (AuthGateway::new(reqwest::Client::new(), &api.url, ctx), store)
}
