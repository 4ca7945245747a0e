//! Authenticated request gateway
//!
//! `send` attaches the context's current access token, and on a failed
//! response decides, by classification, whether to pass the failure through,
//! wait for a refresh and replay once, or end the session.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use session_auth::CredentialPair;
use session_refresh::ContextMode;
use tracing::{debug, info, warn};

use crate::classify::{FailureClassification, classify_failure};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};

/// A request to the API, kept whole so it can be replayed after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the gateway base URL, with any query string
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// POST with a JSON body.
    pub fn post_json<T: Serialize + ?Sized>(path: impl Into<String>, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body).map_err(|e| Error::InvalidRequest(e.to_string()))?;
        let mut request = Self::new(Method::POST, path).body(bytes);
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(request)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A successful (2xx) API response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::InvalidRequest(format!("invalid JSON response: {e}")))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn into_error(self) -> Error {
        Error::Request(Box::new(self))
    }
}

/// HTTP client bound to one API base URL and one execution context.
#[derive(Clone)]
pub struct AuthGateway {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    timeout: Option<Duration>,
    context: ExecutionContext,
}

impl AuthGateway {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, context: ExecutionContext) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: None,
            context,
        }
    }

    /// Per-request timeout applied to every dispatch, including the replay.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request` with the context's credentials.
    ///
    /// Resolves with the 2xx response, either first time or after one
    /// refresh-and-replay. A replay that fails for any reason is returned as
    /// is; the gateway never refreshes twice for one request.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let stored = self.context.store().read().await;

        let response = self.dispatch(&request, stored.as_ref()).await?;
        if response.status.is_success() {
            return Ok(response);
        }

        let classification = classify_failure(response.status.as_u16(), &response.text());
        metrics::counter!(
            "gateway_failures_total",
            "classification" => classification.label()
        )
        .increment(1);

        match classification {
            FailureClassification::NotAuthFailure => Err(response.into_error()),
            FailureClassification::CredentialExpired => {
                debug!(path = %request.path, "access token expired, waiting for refresh");
                let renewed = self.context.coordinator().request_refresh().await?;

                let replay = self.dispatch(&request, Some(&renewed)).await?;
                if replay.status.is_success() {
                    return Ok(replay);
                }
                warn!(
                    path = %request.path,
                    status = replay.status.as_u16(),
                    "request failed again after refresh"
                );
                Err(replay.into_error())
            }
            FailureClassification::CredentialInvalid => {
                info!(
                    path = %request.path,
                    mode = self.context.mode().label(),
                    "credentials rejected, ending session"
                );
                self.context.notifier().notify_invalidated().await;
                match self.context.mode() {
                    ContextMode::Interactive => Err(Error::CredentialInvalid),
                    ContextMode::ServerRender => Err(Error::AuthToken),
                }
            }
        }
    }

    /// One HTTP round trip. Any caller-supplied `Authorization` header is
    /// replaced by the pair's access token, or dropped when there is none.
    async fn dispatch(&self, request: &ApiRequest, credentials: Option<&CredentialPair>) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut headers = request.headers.clone();
        headers.remove(AUTHORIZATION);
        if let Some(pair) = credentials {
            let value = HeaderValue::from_str(&pair.bearer())
                .map_err(|e| Error::InvalidRequest(format!("invalid access token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("{} {url}", request.method))
            } else {
                Error::Transport(format!("{} {url}: {e}", request.method))
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading response body: {e}")))?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use session_auth::CredentialStore;
    use super::*;
    use crate::test_support::{
        MockApi, RefreshReply, THROTTLED_BODY, interactive_gateway, server_gateway,
    };
    use session_refresh::{RefreshError, RefreshState, SessionEvent};

    #[tokio::test]
    async fn attaches_stored_access_token() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, _store) = interactive_gateway(&api, Some(CredentialPair::new("A2", "R2")));

        let response = gateway.send(ApiRequest::get("/data")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(api.seen_auth("/data"), vec![Some("Bearer A2".to_string())]);
        assert_eq!(api.renewals(), 0);
    }

    #[tokio::test]
    async fn omits_authorization_without_session() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, _store) = interactive_gateway(&api, None);

        let request = ApiRequest::get("/public").header(
            AUTHORIZATION,
            HeaderValue::from_static("Bearer caller-supplied"),
        );
        gateway.send(request).await.unwrap();

        assert_eq!(api.seen_auth("/public"), vec![None]);
    }

    #[tokio::test]
    async fn non_auth_failure_passes_through() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, store) = interactive_gateway(&api, Some(CredentialPair::new("A1", "R1")));

        let err = gateway.send(ApiRequest::get("/boom")).await.unwrap_err();

        assert!(matches!(err, Error::Request(ref response)
            if response.status == StatusCode::INTERNAL_SERVER_ERROR && response.text().contains("internal")));
        assert_eq!(api.renewals(), 0);
        assert_eq!(gateway.context().notifier().invalidations(), 0);
        assert!(store.read().await.is_some());
    }

    #[tokio::test]
    async fn expired_token_refreshes_and_replays() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, store) = interactive_gateway(&api, Some(CredentialPair::new("A1", "R1")));

        let response = gateway.send(ApiRequest::get("/data")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["data"], "ok");
        assert_eq!(
            api.seen_auth("/data"),
            vec![Some("Bearer A1".to_string()), Some("Bearer A2".to_string())]
        );
        assert_eq!(api.renewals(), 1);
        assert_eq!(store.read().await, Some(CredentialPair::new("A2", "R2")));
    }

    #[tokio::test]
    async fn replay_preserves_method_and_body() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, _store) = interactive_gateway(&api, Some(CredentialPair::new("A1", "R1")));

        let request =
            ApiRequest::post_json("/echo", &serde_json::json!({"name": "first note"})).unwrap();
        let response = gateway.send(request).await.unwrap();

        let echoed: serde_json::Value = response.json().unwrap();
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["body"]["name"], "first note");
        assert_eq!(api.seen_auth("/echo").len(), 2);
    }

    #[tokio::test]
    async fn concurrent_expiries_share_one_refresh() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, store) = interactive_gateway(&api, Some(CredentialPair::new("A1", "R1")));
        api.hold_refresh_until(gateway.context().coordinator().clone(), 3);

        let (a, b, c) = tokio::join!(
            gateway.send(ApiRequest::get("/data")),
            gateway.send(ApiRequest::get("/data")),
            gateway.send(ApiRequest::get("/data")),
        );

        for result in [a, b, c] {
            assert_eq!(result.unwrap().status, StatusCode::OK);
        }
        assert_eq!(api.renewals(), 1);

        let seen = api.seen_auth("/data");
        assert_eq!(seen.len(), 6);
        let with = |token: &str| {
            seen.iter()
                .filter(|auth| auth.as_deref() == Some(token))
                .count()
        };
        assert_eq!(with("Bearer A1"), 3);
        assert_eq!(with("Bearer A2"), 3);

        assert_eq!(store.read().await, Some(CredentialPair::new("A2", "R2")));
        assert_eq!(gateway.context().coordinator().state(), RefreshState::Idle);
        assert_eq!(gateway.context().coordinator().pending(), 0);
    }

    #[tokio::test]
    async fn failed_refresh_rejects_every_waiter_and_signs_out_once() {
        let api = MockApi::start(RefreshReply::Fails).await;
        let (gateway, store) = interactive_gateway(&api, Some(CredentialPair::new("A1", "R1")));
        api.hold_refresh_until(gateway.context().coordinator().clone(), 3);
        let mut events = gateway.context().notifier().subscribe();

        let (a, b, c) = tokio::join!(
            gateway.send(ApiRequest::get("/data")),
            gateway.send(ApiRequest::get("/data")),
            gateway.send(ApiRequest::get("/data")),
        );

        for result in [a, b, c] {
            let err = result.unwrap_err();
            assert!(matches!(err, Error::Refresh(RefreshError::Renewal(_))), "{err}");
            assert!(err.is_session_terminal());
        }
        assert_eq!(api.renewals(), 1);

        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
        assert!(events.try_recv().is_err());
        assert_eq!(gateway.context().notifier().invalidations(), 1);
        assert!(store.read().await.is_none());
        // no replays happened
        assert_eq!(api.seen_auth("/data").len(), 3);
    }

    #[tokio::test]
    async fn failed_response_keeps_headers_and_raw_body() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, _store) = interactive_gateway(&api, Some(CredentialPair::new("A2", "R2")));

        let err = gateway.send(ApiRequest::get("/throttled")).await.unwrap_err();

        let response = match err {
            Error::Request(response) => response,
            other => panic!("expected the upstream response, got {other:?}"),
        };
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers[reqwest::header::RETRY_AFTER], "7");
        assert_eq!(
            response.headers[CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(&response.body[..], THROTTLED_BODY);
        assert_eq!(api.renewals(), 0);
    }

    #[tokio::test]
    async fn replay_failure_is_not_retried_again() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, _store) = interactive_gateway(&api, Some(CredentialPair::new("A1", "R1")));

        let err = gateway
            .send(ApiRequest::get("/always-expired"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(api.renewals(), 1);
        assert_eq!(api.seen_auth("/always-expired").len(), 2);
    }

    #[tokio::test]
    async fn invalid_credentials_end_interactive_session() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, store) = interactive_gateway(&api, Some(CredentialPair::new("A1", "R1")));
        let mut events = gateway.context().notifier().subscribe();

        let err = gateway.send(ApiRequest::get("/invalid")).await.unwrap_err();

        assert!(matches!(err, Error::CredentialInvalid));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::SignedOut);
        assert!(store.read().await.is_none());
        assert_eq!(api.renewals(), 0);
    }

    #[tokio::test]
    async fn invalid_credentials_in_server_render_is_auth_token_error() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, store) = server_gateway(&api, Some(CredentialPair::new("A1", "R1")));
        let mut events = gateway.context().notifier().subscribe();

        let err = gateway.send(ApiRequest::get("/invalid")).await.unwrap_err();

        assert!(matches!(err, Error::AuthToken));
        assert!(events.try_recv().is_err());
        assert!(store.read().await.is_none());
    }

    #[tokio::test]
    async fn expired_without_stored_session_fails_refresh() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, _store) = server_gateway(&api, None);

        let err = gateway.send(ApiRequest::get("/data")).await.unwrap_err();

        assert!(matches!(err, Error::Refresh(RefreshError::NoSession)));
        assert_eq!(api.renewals(), 0);
    }

    #[tokio::test]
    async fn unreachable_api_is_transport_error() {
        let api = MockApi::start(RefreshReply::Renewed).await;
        let (gateway, _store) = interactive_gateway(&api, None);
        let gateway = AuthGateway::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1",
            gateway.context().clone(),
        );

        let err = gateway.send(ApiRequest::get("/data")).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!err.is_session_terminal());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let ctx = crate::test_support::context(session_refresh::ContextMode::Interactive, "http://api", None).0;
        let gateway = AuthGateway::new(reqwest::Client::new(), "http://api/", ctx);
        assert_eq!(gateway.base_url(), "http://api");
    }
}
