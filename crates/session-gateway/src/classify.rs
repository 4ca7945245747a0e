//! Failure classification for API responses
//!
//! Only 401s are authentication failures. A 401 whose JSON body carries
//! `"code": "token.expired"` can be recovered by refreshing; every other 401
//! means the credential is unusable and the session must end.

use session_auth::EXPIRED_TOKEN_CODE;

/// How the gateway should treat a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClassification {
    /// Not an auth problem: surface to the caller unchanged
    NotAuthFailure,
    /// Access token expired: refresh and replay
    CredentialExpired,
    /// Credential rejected outright: end the session
    CredentialInvalid,
}

impl FailureClassification {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FailureClassification::NotAuthFailure => "not_auth",
            FailureClassification::CredentialExpired => "expired",
            FailureClassification::CredentialInvalid => "invalid",
        }
    }
}

/// Classify a failed response by HTTP status and body.
pub fn classify_failure(status: u16, body: &str) -> FailureClassification {
    if status != 401 {
        return FailureClassification::NotAuthFailure;
    }
    match error_code(body) {
        Some(code) if code == EXPIRED_TOKEN_CODE => FailureClassification::CredentialExpired,
        _ => FailureClassification::CredentialInvalid,
    }
}

/// Extract the machine-readable `code` field from a JSON error body.
///
/// Non-JSON bodies and bodies without a string `code` yield `None`.
pub fn error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("code")?.as_str().map(str::to_owned)
}
