//! Server-render session guard
//!
//! Wraps one page render (or proxied request) in a `ServerRender` context.
//! Without stored credentials the render never runs. A session-terminal
//! failure during the render clears the credentials and turns into a redirect
//! to the sign-in location; any other failure propagates.

use std::future::Future;

use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::error::Result;

/// Outcome of a guarded render.
#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<T> {
    Rendered(T),
    Redirect { location: String },
}

impl<T> Guarded<T> {
    pub fn is_redirect(&self) -> bool {
        matches!(self, Guarded::Redirect { .. })
    }
}

pub async fn guard_session<T, F, Fut>(
    ctx: &ExecutionContext,
    sign_in_location: &str,
    render: F,
) -> Result<Guarded<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let redirect = || Guarded::Redirect {
        location: sign_in_location.to_string(),
    };

    if ctx.store().read().await.is_none() {
        debug!("no session, redirecting to sign-in");
        return Ok(redirect());
    }

    match render().await {
        Ok(value) => Ok(Guarded::Rendered(value)),
        Err(e) if e.is_session_terminal() => {
            info!(error = %e, "session ended during render, redirecting to sign-in");
            if let Err(clear_err) = ctx.store().clear().await {
                warn!(error = %clear_err, "failed to clear credentials after session end");
            }
            Ok(redirect())
        }
        Err(e) => Err(e),
    }
}
