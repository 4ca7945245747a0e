//! Refresh coordinator state machine
//!
//! States: `Idle` → `Refreshing` → `Idle`. The first caller to report an
//! expired token flips the state and spawns the renewal; every caller, the
//! first included, waits on its own `PendingQueue` entry. The renewal runs in
//! a detached task so a caller that stops waiting cannot strand the others.
//!
//! State and queue sit behind one `std::sync::Mutex`. No critical section
//! awaits, and the episode guard must be able to settle from `Drop`.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use session_auth::{CREDENTIAL_TTL, CredentialPair, CredentialStore};
use tracing::{debug, info, warn};

use crate::error::{RefreshError, Result};
use crate::notifier::SessionNotifier;
use crate::pending::{PendingQueue, Settlement};

/// Default bound on a single renewal call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh state of one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// Boxed future returned by `SessionRenewer::renew`.
pub type RenewFuture<'a> =
    Pin<Box<dyn Future<Output = session_auth::Result<CredentialPair>> + Send + 'a>>;

/// The session-renewal endpoint: refresh token in, credential pair out.
///
/// Uses `Pin<Box<dyn Future>>` for dyn-compatibility (`Arc<dyn SessionRenewer>`).
pub trait SessionRenewer: Send + Sync {
    fn renew<'a>(&'a self, refresh_token: &'a str) -> RenewFuture<'a>;
}

/// Renewer backed by the upstream API's `/refresh` endpoint.
#[derive(Clone)]
pub struct HttpRenewer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRenewer {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl SessionRenewer for HttpRenewer {
    fn renew<'a>(&'a self, refresh_token: &'a str) -> RenewFuture<'a> {
        Box::pin(session_auth::refresh_session(
            &self.client,
            &self.base_url,
            refresh_token,
        ))
    }
}

/// Tunables for refresh episodes.
#[derive(Debug, Clone, Copy)]
pub struct RefreshConfig {
    /// TTL applied to the renewed pair when it is written to the store
    pub credential_ttl: Duration,
    /// Upper bound on one renewal call; expiry counts as a failed refresh
    pub timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            credential_ttl: CREDENTIAL_TTL,
            timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

struct Shared {
    state: RefreshState,
    queue: PendingQueue,
}

struct Inner {
    shared: Mutex<Shared>,
    store: Arc<dyn CredentialStore>,
    renewer: Arc<dyn SessionRenewer>,
    notifier: SessionNotifier,
    config: RefreshConfig,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        // Critical sections never panic mid-transition, so a poisoned lock
        // still holds a consistent state.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver the outcome to the queue front to back and return to `Idle`,
    /// all in one critical section.
    fn settle(&self, outcome: &Settlement) -> Vec<u64> {
        let mut shared = self.lock();
        let tickets = shared.queue.settle_all(outcome);
        shared.state = RefreshState::Idle;
        tickets
    }

    /// Read the refresh token, call the renewal endpoint under the timeout,
    /// and persist the new pair.
    async fn renew_and_store(&self) -> Result<CredentialPair> {
        let current = self.store.read().await.ok_or(RefreshError::NoSession)?;

        let pair = match tokio::time::timeout(
            self.config.timeout,
            self.renewer.renew(&current.refresh_token),
        )
        .await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(RefreshError::Timeout(self.config.timeout)),
        };

        self.store
            .write(pair.clone(), self.config.credential_ttl)
            .await
            .map_err(|e| RefreshError::Store(e.to_string()))?;
        Ok(pair)
    }
}

/// Settles the episode if the renewal task ends without doing so itself
/// (panic inside the renewer, runtime shutdown).
///
/// Waiters are rejected only after the session has been invalidated, so a
/// rejected caller never reads the dead pair back from the store.
struct EpisodeGuard {
    inner: Arc<Inner>,
    settled: bool,
    /// Set on the guard carried by the follow-up invalidation task
    invalidating: bool,
}

impl EpisodeGuard {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            settled: false,
            invalidating: false,
        }
    }

    fn settle(mut self, outcome: &Settlement) -> Vec<u64> {
        self.settled = true;
        self.inner.settle(outcome)
    }
}

impl Drop for EpisodeGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if !self.invalidating {
            metrics::counter!("session_refresh_total", "outcome" => "aborted").increment(1);
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) if !self.invalidating => handle,
            _ => {
                // No runtime to invalidate on, or the follow-up task itself
                // was dropped: settle in place.
                let tickets = self.inner.settle(&Err(RefreshError::Aborted));
                warn!(settled = tickets.len(), "refresh episode aborted, waiters rejected");
                return;
            }
        };

        let follow_up = EpisodeGuard {
            inner: self.inner.clone(),
            settled: false,
            invalidating: true,
        };
        handle.spawn(async move {
            follow_up.inner.notifier.notify_invalidated().await;
            let tickets = follow_up.settle(&Err(RefreshError::Aborted));
            warn!(settled = tickets.len(), "refresh episode aborted, waiters rejected");
        });
    }
}

/// Single-flight refresh coordinator for one execution context.
///
/// Cheap to clone; clones share the same state and queue.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        renewer: Arc<dyn SessionRenewer>,
        notifier: SessionNotifier,
        config: RefreshConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    state: RefreshState::Idle,
                    queue: PendingQueue::new(),
                }),
                store,
                renewer,
                notifier,
                config,
            }),
        }
    }

    pub fn state(&self) -> RefreshState {
        self.inner.lock().state
    }

    /// Number of callers currently waiting on the in-flight refresh.
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn notifier(&self) -> &SessionNotifier {
        &self.inner.notifier
    }

    /// Wait for a renewed credential pair.
    ///
    /// Starts a renewal if none is running, otherwise joins the running one.
    /// Every caller of one episode receives the same outcome.
    pub async fn request_refresh(&self) -> Result<CredentialPair> {
        let (ticket, rx, leader) = {
            let mut shared = self.inner.lock();
            let (ticket, rx) = shared.queue.enqueue();
            let leader = shared.state == RefreshState::Idle;
            if leader {
                shared.state = RefreshState::Refreshing;
            }
            (ticket, rx, leader)
        };

        if leader {
            info!(ticket, "credential expired, starting refresh");
            tokio::spawn(run_episode(self.inner.clone()));
        } else {
            debug!(ticket, "refresh in flight, queued behind it");
            metrics::counter!("session_refresh_queued_total").increment(1);
        }

        rx.await.unwrap_or(Err(RefreshError::Aborted))
    }
}

/// One refresh episode, from renewal call to settled queue.
async fn run_episode(inner: Arc<Inner>) {
    let guard = EpisodeGuard::new(inner.clone());

    let outcome = inner.renew_and_store().await;
    if let Err(e) = &outcome {
        warn!(error = %e, "refresh failed, invalidating session");
        inner.notifier.notify_invalidated().await;
    }
    let tickets = guard.settle(&outcome);

    match outcome {
        Ok(_) => {
            info!(settled = tickets.len(), "refresh succeeded");
            metrics::counter!("session_refresh_total", "outcome" => "success").increment(1);
        }
        Err(_) => {
            debug!(settled = tickets.len(), "refresh waiters rejected");
            metrics::counter!("session_refresh_total", "outcome" => "failure").increment(1);
        }
    }
}
