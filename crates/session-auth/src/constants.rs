//! Session endpoint and persistence constants
//!
//! Paths are relative to the configured API base URL. The cookie names are
//! defaults; the proxy can override them from config.

use std::time::Duration;

/// Session-renewal endpoint (refresh token in, credential pair out)
pub const REFRESH_PATH: &str = "/refresh";

/// Sign-in endpoint (email + password in, credential pair out)
pub const SIGN_IN_PATH: &str = "/session";

/// Sign-up endpoint (same shape as sign-in)
pub const SIGN_UP_PATH: &str = "/users";

/// Machine-readable code carried by a 401 body when the access token expired.
/// Any other 401 means the credential is invalid and cannot be refreshed.
pub const EXPIRED_TOKEN_CODE: &str = "token.expired";

/// Expiry hint applied uniformly to both tokens on every write (30 days)
pub const CREDENTIAL_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Default cookie carrying the access token
pub const ACCESS_TOKEN_COOKIE: &str = "auth.token";

/// Default cookie carrying the refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "auth.refresh_token";
