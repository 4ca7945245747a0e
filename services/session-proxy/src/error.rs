//! Per-request error responses
//!
//! Handlers never propagate Rust errors to axum; every failure becomes a JSON
//! body `{"error":{"type","message","request_id"}}` with a matching status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid request body: {0}")]
    BadRequest(String),

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("{0}")]
    Auth(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Auth(_) => StatusCode::UNAUTHORIZED,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ProxyError::Auth(_) => "auth_error",
            _ => "proxy_error",
        }
    }

    /// Label for `proxy_upstream_errors_total`.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::UpstreamTimeout(_) => "timeout",
            ProxyError::Upstream(_) => "connection",
            ProxyError::Auth(_) => "auth",
            ProxyError::Internal(_) => "internal",
        }
    }

    pub fn into_response(self, request_id: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
                "request_id": request_id,
            }
        });
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

impl From<session_gateway::Error> for ProxyError {
    fn from(err: session_gateway::Error) -> Self {
        use session_gateway::Error;
        match err {
            Error::Timeout(msg) => ProxyError::UpstreamTimeout(msg),
            Error::Transport(msg) => ProxyError::Upstream(msg),
            Error::InvalidRequest(msg) => ProxyError::BadRequest(msg),
            Error::Session(session_auth::Error::InvalidCredentials(msg)) => ProxyError::Auth(msg),
            Error::Session(session_auth::Error::Http(msg)) => ProxyError::Upstream(msg),
            Error::Session(session_auth::Error::Endpoint(msg)) => ProxyError::Upstream(msg),
            other => ProxyError::Internal(other.to_string()),
        }
    }
}
