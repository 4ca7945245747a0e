//! Session endpoints exposed by the proxy
//!
//! `POST /auth/sign-in` and `POST /auth/sign-up` take a JSON
//! `{"email", "password"}` body, open a session against the upstream, and set
//! the session cookies. `POST /auth/sign-out` clears them.

use axum::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use session_auth::SignInCredentials;
use tracing::{info, instrument, warn};

use crate::error::ProxyError;
use crate::proxy::{ProxyState, with_cookies};

/// Which account endpoint opens the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    SignIn,
    SignUp,
}

impl Entry {
    fn label(&self) -> &'static str {
        match self {
            Entry::SignIn => "sign_in",
            Entry::SignUp => "sign_up",
        }
    }
}

#[instrument(skip_all, fields(request_id = %request_id, entry = entry.label()))]
pub async fn open_session(
    state: &ProxyState,
    headers: &HeaderMap,
    credentials: SignInCredentials,
    entry: Entry,
    request_id: &str,
) -> Response {
    let (gateway, store) = state.request_gateway(headers);

    let result = match entry {
        Entry::SignIn => gateway.sign_in(&credentials).await,
        Entry::SignUp => gateway.sign_up(&credentials).await,
    };

    match result {
        Ok(_) => {
            info!("session opened");
            let status = match entry {
                Entry::SignIn => StatusCode::OK,
                Entry::SignUp => StatusCode::CREATED,
            };
            let body = Json(serde_json::json!({ "status": "signed_in" }));
            with_cookies((status, body).into_response(), store.set_cookie_headers())
        }
        Err(e) => {
            let err = ProxyError::from(e);
            warn!(error = %err, "failed to open session");
            err.into_response(request_id)
        }
    }
}

#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn sign_out(state: &ProxyState, headers: &HeaderMap, request_id: &str) -> Response {
    let (gateway, store) = state.request_gateway(headers);

    match gateway.sign_out().await {
        Ok(()) => {
            let body = Json(serde_json::json!({ "status": "signed_out" }));
            with_cookies(
                (StatusCode::OK, body).into_response(),
                store.set_cookie_headers(),
            )
        }
        Err(e) => ProxyError::from(e).into_response(request_id),
    }
}
