//! Error types for session credential operations

/// Errors from session endpoints and credential persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("session endpoint failed: {0}")]
    Endpoint(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session credential operations.
pub type Result<T> = std::result::Result<T, Error>;
