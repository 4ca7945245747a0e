//! Execution context: one credential scope with its own refresh machinery
//!
//! An interactive client holds one long-lived context. A server handling
//! inbound requests builds a fresh `ServerRender` context per request so
//! refresh state is never shared between unrelated users.

use std::sync::Arc;
use std::time::Duration;

use session_auth::CredentialStore;
use session_refresh::{
    ContextMode, RefreshConfig, RefreshCoordinator, SessionNotifier, SessionRenewer,
};

/// Credential store, notifier, and refresh coordinator for one context.
///
/// Cheap to clone; clones share the same store and refresh state.
#[derive(Clone)]
pub struct ExecutionContext {
    mode: ContextMode,
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
    credential_ttl: Duration,
}

impl ExecutionContext {
    pub fn new(
        mode: ContextMode,
        store: Arc<dyn CredentialStore>,
        renewer: Arc<dyn SessionRenewer>,
        config: RefreshConfig,
    ) -> Self {
        let notifier = SessionNotifier::new(mode, store.clone());
        let credential_ttl = config.credential_ttl;
        let coordinator = RefreshCoordinator::new(store.clone(), renewer, notifier, config);
        Self {
            mode,
            store,
            coordinator,
            credential_ttl,
        }
    }

    /// Long-lived client with a UI attached.
    pub fn interactive(
        store: Arc<dyn CredentialStore>,
        renewer: Arc<dyn SessionRenewer>,
        config: RefreshConfig,
    ) -> Self {
        Self::new(ContextMode::Interactive, store, renewer, config)
    }

    /// One server-side unit of work.
    pub fn server_render(
        store: Arc<dyn CredentialStore>,
        renewer: Arc<dyn SessionRenewer>,
        config: RefreshConfig,
    ) -> Self {
        Self::new(ContextMode::ServerRender, store, renewer, config)
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn notifier(&self) -> &SessionNotifier {
        self.coordinator.notifier()
    }

    /// Lifetime given to credentials written in this context.
    pub fn credential_ttl(&self) -> Duration {
        self.credential_ttl
    }
}
