//! Session invalidation signal
//!
//! The notifier is how the core tells the session-lifecycle layer that a
//! session is over. Invalidation clears the context's credential store and,
//! when a live UI is attached (`ContextMode::Interactive`), broadcasts
//! `SessionEvent::SignedOut` so subscribers can route to the signed-out state.
//! A `ServerRender` context has nobody to navigate; the gateway surfaces a
//! distinguished error to the page logic instead.
//!
//! Invalidation latches: the side effects run once per session no matter how
//! many callers report it, until `session_started()` opens a new session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use session_auth::CredentialStore;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Whether the execution context has a live UI to navigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// Long-lived client with a UI (browser tab analogue)
    Interactive,
    /// One inbound unit of work rendered on the server, no UI
    ServerRender,
}

impl ContextMode {
    pub fn label(&self) -> &'static str {
        match self {
            ContextMode::Interactive => "interactive",
            ContextMode::ServerRender => "server_render",
        }
    }
}

/// Session lifecycle events broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
}

const EVENT_CAPACITY: usize = 16;

struct NotifierInner {
    mode: ContextMode,
    store: Arc<dyn CredentialStore>,
    events: broadcast::Sender<SessionEvent>,
    invalidated: AtomicBool,
    invalidations: AtomicU64,
}

/// Context-scoped invalidation channel. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionNotifier {
    inner: Arc<NotifierInner>,
}

impl SessionNotifier {
    pub fn new(mode: ContextMode, store: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(NotifierInner {
                mode,
                store,
                events,
                invalidated: AtomicBool::new(false),
                invalidations: AtomicU64::new(0),
            }),
        }
    }

    pub fn mode(&self) -> ContextMode {
        self.inner.mode
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Number of times invalidation actually ran its side effects.
    pub fn invalidations(&self) -> u64 {
        self.inner.invalidations.load(Ordering::Relaxed)
    }

    /// Whether the current session has been invalidated.
    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::Acquire)
    }

    /// End the current session because its credentials are no longer usable.
    ///
    /// Returns `true` if this call performed the invalidation, `false` if the
    /// session had already been invalidated.
    pub async fn notify_invalidated(&self) -> bool {
        if self.inner.invalidated.swap(true, Ordering::AcqRel) {
            debug!("session already invalidated");
            return false;
        }
        self.inner.invalidations.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.inner.store.clear().await {
            warn!(error = %e, "failed to clear credentials on invalidation");
        }

        match self.inner.mode {
            ContextMode::Interactive => {
                let _ = self.inner.events.send(SessionEvent::SignedOut);
                info!(mode = self.inner.mode.label(), "session invalidated, signed out");
            }
            ContextMode::ServerRender => {
                info!(mode = self.inner.mode.label(), "session invalidated");
            }
        }
        true
    }

    /// A new session was established (sign-in/sign-up): re-arm invalidation.
    pub fn session_started(&self) {
        self.inner.invalidated.store(false, Ordering::Release);
        if self.inner.mode == ContextMode::Interactive {
            let _ = self.inner.events.send(SessionEvent::SignedIn);
        }
    }

    /// The user signed out deliberately. Credentials are cleared by the caller;
    /// this only latches the session closed and tells subscribers.
    pub fn session_ended(&self) {
        self.inner.invalidated.store(true, Ordering::Release);
        if self.inner.mode == ContextMode::Interactive {
            let _ = self.inner.events.send(SessionEvent::SignedOut);
        }
    }
}
