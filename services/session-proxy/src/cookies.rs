//! Cookie-backed credential store
//!
//! Each inbound request gets its own `CookieStore`, seeded from the request's
//! `Cookie` header. Writes and clears made while handling the request are
//! recorded and turned into `Set-Cookie` headers on the response, so a
//! refresh performed server-side reaches the browser.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::http::header::{COOKIE, InvalidHeaderValue};
use axum::http::{HeaderMap, HeaderValue};
use session_auth::{CredentialPair, CredentialStore, StoreFuture};

use crate::config::SessionConfig;

/// Cookie names and attributes, shared by every request.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub access_cookie: String,
    pub refresh_cookie: String,
    pub secure: bool,
}

impl From<&SessionConfig> for CookieSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            access_cookie: config.access_cookie.clone(),
            refresh_cookie: config.refresh_cookie.clone(),
            secure: config.secure_cookies,
        }
    }
}

impl CookieSettings {
    fn set_cookie(&self, name: &str, value: &str, ttl: Duration) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            ttl.as_secs()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    fn clear_cookie(&self, name: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// `Set-Cookie` values that remove both session cookies.
    pub fn clearing_headers(&self) -> Vec<HeaderValue> {
        [&self.access_cookie, &self.refresh_cookie]
            .into_iter()
            .filter_map(|name| self.clear_cookie(name).ok())
            .collect()
    }
}

#[derive(Debug, Clone)]
enum CookieUpdate {
    Set { pair: CredentialPair, ttl: Duration },
    Clear,
}

#[derive(Default)]
struct CookieState {
    current: Option<CredentialPair>,
    update: Option<CookieUpdate>,
}

/// Credential store scoped to one inbound request.
pub struct CookieStore {
    settings: Arc<CookieSettings>,
    state: Mutex<CookieState>,
}

impl CookieStore {
    /// Seed the store from the request's cookies. Both cookies must be
    /// present for the session to count.
    pub fn from_headers(headers: &HeaderMap, settings: Arc<CookieSettings>) -> Self {
        let access = cookie_value(headers, &settings.access_cookie);
        let refresh = cookie_value(headers, &settings.refresh_cookie);
        let current = match (access, refresh) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            _ => None,
        };
        Self {
            settings,
            state: Mutex::new(CookieState {
                current,
                update: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CookieState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Set-Cookie` values for whatever changed during the request.
    ///
    /// Empty when the store was only read.
    pub fn set_cookie_headers(&self) -> Vec<HeaderValue> {
        let update = self.lock().update.clone();
        let settings = &self.settings;
        match update {
            None => Vec::new(),
            Some(CookieUpdate::Clear) => settings.clearing_headers(),
            Some(CookieUpdate::Set { pair, ttl }) => [
                settings.set_cookie(&settings.access_cookie, &pair.access_token, ttl),
                settings.set_cookie(&settings.refresh_cookie, &pair.refresh_token, ttl),
            ]
            .into_iter()
            .filter_map(|header| {
                header
                    .inspect_err(|e| tracing::warn!(error = %e, "token is not a valid cookie value"))
                    .ok()
            })
            .collect(),
        }
    }
}

impl CredentialStore for CookieStore {
    fn read(&self) -> StoreFuture<'_, Option<CredentialPair>> {
        let current = self.lock().current.clone();
        Box::pin(async move { current })
    }

    fn write(&self, pair: CredentialPair, ttl: Duration) -> StoreFuture<'_, session_auth::Result<()>> {
        let mut state = self.lock();
        state.current = Some(pair.clone());
        state.update = Some(CookieUpdate::Set { pair, ttl });
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> StoreFuture<'_, session_auth::Result<()>> {
        let mut state = self.lock();
        state.current = None;
        state.update = Some(CookieUpdate::Clear);
        Box::pin(async { Ok(()) })
    }
}

/// Value of the named cookie across all `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name && !value.trim().is_empty()).then(|| value.trim().to_string())
        })
}
