//! Error types for authenticated requests

use session_refresh::RefreshError;

use crate::gateway::ApiResponse;

/// What the caller of `AuthGateway::send` can see go wrong.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Non-2xx response that the gateway does not handle, or the replay after
    /// a successful refresh failed again. Status, headers and body are kept
    /// exactly as the API sent them.
    #[error("request failed with status {}", .0.status)]
    Request(Box<ApiResponse>),

    /// The refresh episode this request waited on failed
    #[error("credential refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Credential rejected; the session was ended and subscribers told
    #[error("credentials rejected, session ended")]
    CredentialInvalid,

    /// Credential rejected while rendering on the server
    #[error("authentication token rejected")]
    AuthToken,

    /// Request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Sign-in, sign-up, or credential store failure
    #[error("session error: {0}")]
    Session(#[from] session_auth::Error),
}

impl Error {
    /// Whether this failure means the session is gone and the user must sign
    /// in again.
    pub fn is_session_terminal(&self) -> bool {
        matches!(
            self,
            Error::Refresh(_) | Error::CredentialInvalid | Error::AuthToken
        )
    }

    /// HTTP status of the failed API response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Request(response) => Some(response.status.as_u16()),
            _ => None,
        }
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
