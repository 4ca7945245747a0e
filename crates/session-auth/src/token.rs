//! Session endpoint calls
//!
//! Three interactions, all JSON over POST against the API base URL:
//! 1. Sign-in (`SIGN_IN_PATH`) and sign-up (`SIGN_UP_PATH`) exchange user
//!    credentials for a token pair
//! 2. Renewal (`REFRESH_PATH`) exchanges the refresh token for a new pair
//!
//! Every endpoint answers with the same `TokenResponse` shape.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::constants::{REFRESH_PATH, SIGN_IN_PATH, SIGN_UP_PATH};
use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

/// Response body from the session endpoints.
#[derive(Deserialize, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub refresh_token: String,
}

impl From<TokenResponse> for CredentialPair {
    fn from(response: TokenResponse) -> Self {
        CredentialPair::new(response.token, response.refresh_token)
    }
}

/// Email/password pair submitted by the sign-in and sign-up forms.
#[derive(Debug, Clone, Deserialize)]
pub struct SignInCredentials {
    pub email: String,
    pub password: Secret<String>,
}

/// Exchange the refresh token for a new credential pair.
///
/// 401/403 means the refresh token itself is revoked or invalid; other
/// failures are reported as endpoint errors.
pub async fn refresh_session(
    client: &reqwest::Client,
    base_url: &str,
    refresh_token: &str,
) -> Result<CredentialPair> {
    let body = serde_json::json!({ "refresh_token": refresh_token });
    post_for_tokens(client, base_url, REFRESH_PATH, &body, "session renewal").await
}

/// Open a session with existing account credentials.
pub async fn sign_in(
    client: &reqwest::Client,
    base_url: &str,
    credentials: &SignInCredentials,
) -> Result<CredentialPair> {
    let body = serde_json::json!({
        "email": credentials.email,
        "password": credentials.password.expose(),
    });
    post_for_tokens(client, base_url, SIGN_IN_PATH, &body, "sign-in").await
}

/// Create an account and open a session for it.
pub async fn sign_up(
    client: &reqwest::Client,
    base_url: &str,
    credentials: &SignInCredentials,
) -> Result<CredentialPair> {
    let body = serde_json::json!({
        "email": credentials.email,
        "password": credentials.password.expose(),
    });
    post_for_tokens(client, base_url, SIGN_UP_PATH, &body, "sign-up").await
}

async fn post_for_tokens(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
    body: &serde_json::Value,
    operation: &str,
) -> Result<CredentialPair> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let response = client
        .post(&url)
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Http(format!("{operation} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "{operation} rejected ({status}): {body}"
            )));
        }

        return Err(Error::Endpoint(format!(
            "{operation} returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map(CredentialPair::from)
        .map_err(|e| Error::Endpoint(format!("invalid {operation} response: {e}")))
}
