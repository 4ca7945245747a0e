//! Session-aware HTTP proxy
//!
//! Every inbound request is one server-render unit of work: it gets a fresh
//! `ServerRender` execution context seeded from its cookies, and is forwarded
//! to the upstream API through the session gateway inside the session guard.
//! Expired access tokens are refreshed transparently and the renewed pair is
//! written back to the browser as `Set-Cookie`. A request without a usable
//! session is answered with `303 See Other` to the sign-in path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{COOKIE, HOST, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use session_gateway::{ApiRequest, ApiResponse, AuthGateway, ExecutionContext, Guarded, guard_session};
use session_refresh::HttpRenewer;
use tracing::{error, info, instrument};

use crate::config::SessionConfig;
use crate::cookies::{CookieSettings, CookieStore};
use crate::error::ProxyError;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Runtime counters shared between the proxy and the health endpoint
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Requests currently being handled, reported when the drain times out
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

struct InFlightGuard(Arc<AtomicU64>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Shared state passed to the proxy and auth handlers
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub upstream_url: String,
    pub timeout: Duration,
    pub session: Arc<SessionConfig>,
    pub cookies: Arc<CookieSettings>,
    pub metrics: ServiceMetrics,
}

impl ProxyState {
    pub fn new(
        client: reqwest::Client,
        upstream_url: String,
        timeout: Duration,
        session: SessionConfig,
        metrics: ServiceMetrics,
    ) -> Self {
        Self {
            client,
            upstream_url,
            timeout,
            cookies: Arc::new(CookieSettings::from(&session)),
            session: Arc::new(session),
            metrics,
        }
    }

    /// Gateway over a fresh server-render context for one inbound request,
    /// plus the cookie store backing it.
    pub fn request_gateway(&self, headers: &HeaderMap) -> (AuthGateway, Arc<CookieStore>) {
        let store = Arc::new(CookieStore::from_headers(headers, self.cookies.clone()));
        let renewer = Arc::new(HttpRenewer::new(
            self.client.clone(),
            self.upstream_url.clone(),
        ));
        let context =
            ExecutionContext::server_render(store.clone(), renewer, self.session.refresh_config());
        let gateway = AuthGateway::new(self.client.clone(), self.upstream_url.as_str(), context)
            .with_timeout(self.timeout);
        (gateway, store)
    }
}

/// Append `Set-Cookie` headers to a response.
pub fn with_cookies(mut response: Response, cookies: Vec<HeaderValue>) -> Response {
    let headers = response.headers_mut();
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
    response
}

/// Proxy an inbound request to upstream under the session guard.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(state: &ProxyState, request: Request<Body>, request_id: String) -> Response {
    let started = Instant::now();
    let _in_flight = InFlightGuard::enter(&state.metrics.in_flight);
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let method = request.method().clone();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let (gateway, store) = state.request_gateway(request.headers());

    // Session cookies travel as the bearer token, not as cookies
    let mut headers = HeaderMap::new();
    for (name, value) in request.headers() {
        if !is_hop_by_hop(name.as_str()) && *name != HOST && *name != COOKIE {
            headers.append(name.clone(), value.clone());
        }
    }

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            let err = ProxyError::BadRequest(e.to_string());
            return fail(state, err, &request_id, method.as_str(), started);
        }
    };

    let api_request = ApiRequest {
        method: method.clone(),
        path,
        headers,
        body: Some(body),
    };

    let outcome = guard_session(gateway.context(), &state.session.sign_in_path, || {
        gateway.send(api_request)
    })
    .await;

    let response = match outcome {
        Ok(Guarded::Rendered(api_response)) => {
            with_cookies(upstream_response(api_response), store.set_cookie_headers())
        }
        Ok(Guarded::Redirect { location }) => {
            info!(location = %location, "no usable session, redirecting to sign-in");
            crate::metrics::record_session_redirect();
            with_cookies(redirect(&location), state.cookies.clearing_headers())
        }
        // Upstream failure the gateway does not handle, relayed as sent
        Err(session_gateway::Error::Request(api_response)) => {
            with_cookies(upstream_response(*api_response), store.set_cookie_headers())
        }
        Err(e) => {
            let err = ProxyError::from(e);
            return fail(state, err, &request_id, method.as_str(), started);
        }
    };

    crate::metrics::record_request(
        response.status().as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

fn fail(state: &ProxyState, err: ProxyError, request_id: &str, method: &str, started: Instant) -> Response {
    state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
    crate::metrics::record_upstream_error(err.metric_label());
    error!(error = %err, "proxy request failed");
    let response = err.into_response(request_id);
    crate::metrics::record_request(
        response.status().as_u16(),
        method,
        started.elapsed().as_secs_f64(),
    );
    response
}

fn upstream_response(api_response: ApiResponse) -> Response {
    let mut response = Response::builder().status(api_response.status);
    for (name, value) in &api_response.headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    response
        .body(Body::from(api_response.body))
        .unwrap_or_else(|e| {
            ProxyError::Internal(format!("response build error: {e}")).into_response("")
        })
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::SEE_OTHER, [(LOCATION, value)]).into_response(),
        Err(e) => ProxyError::Internal(format!("invalid redirect location: {e}")).into_response(""),
    }
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
