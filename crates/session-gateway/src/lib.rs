//! Authenticated request gateway
//!
//! Wraps outgoing API requests with the execution context's bearer token and
//! turns credential failures into session behaviour:
//! - any non-401 failure passes through untouched
//! - 401 `token.expired` waits on the context's `RefreshCoordinator`, then
//!   replays the original request once with the renewed token
//! - any other 401 ends the session through the `SessionNotifier`
//!
//! The caller never sees a successful refresh. It only sees terminal
//! failures: the refresh itself failing, invalid credentials, or the replayed
//! request failing again.

pub mod classify;
pub mod context;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod lifecycle;

#[cfg(test)]
mod test_support;

pub use classify::{FailureClassification, classify_failure, error_code};
pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use gateway::{ApiRequest, ApiResponse, AuthGateway};
pub use guard::{Guarded, guard_session};
pub use session_refresh::{ContextMode, RefreshConfig, SessionEvent};
