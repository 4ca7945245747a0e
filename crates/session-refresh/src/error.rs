//! Error types for refresh episodes

use std::time::Duration;

/// Why a refresh episode failed.
///
/// `Clone` because one failure is delivered to every queued caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no stored session to refresh")]
    NoSession,

    #[error("refresh token rejected: {0}")]
    Rejected(String),

    #[error("session renewal failed: {0}")]
    Renewal(String),

    #[error("session renewal timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("storing renewed credentials failed: {0}")]
    Store(String),

    #[error("session renewal aborted before settling")]
    Aborted,
}

impl From<session_auth::Error> for RefreshError {
    fn from(err: session_auth::Error) -> Self {
        match err {
            session_auth::Error::InvalidCredentials(msg) => RefreshError::Rejected(msg),
            other => RefreshError::Renewal(other.to_string()),
        }
    }
}

/// Result alias for refresh operations.
pub type Result<T> = std::result::Result<T, RefreshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_map_to_rejected() {
        let err: RefreshError =
            session_auth::Error::InvalidCredentials("revoked (401)".into()).into();
        assert_eq!(err, RefreshError::Rejected("revoked (401)".into()));
    }

    #[test]
    fn transport_errors_map_to_renewal() {
        let err: RefreshError = session_auth::Error::Http("connection refused".into()).into();
        assert!(matches!(err, RefreshError::Renewal(msg) if msg.contains("connection refused")));
    }

    #[test]
    fn timeout_message_includes_seconds() {
        let err = RefreshError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "session renewal timed out after 10s");
    }
}
