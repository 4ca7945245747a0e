//! Single-flight credential refresh for one execution context
//!
//! When an access token expires, every request that fails at that moment
//! needs a new token, but only one renewal call may go out. The coordinator
//! owns the `Idle`/`Refreshing` state and a FIFO queue of waiting callers;
//! the first caller starts the renewal, later callers join the queue, and the
//! outcome fans out to all of them.
//!
//! Episode lifecycle:
//! 1. Caller hits `CredentialExpired` → `RefreshCoordinator::request_refresh()`
//! 2. `Idle` → `Refreshing`, renewal task spawned with the stored refresh token
//! 3. Concurrent callers are queued behind the running renewal
//! 4. Success → new pair written to the store, queue resolved in order
//! 5. Failure → `SessionNotifier` fires once (store cleared), then the queue
//!    is rejected in order
//! 6. State back to `Idle`, queue empty, on every exit path
//!
//! Nothing here is process-global: each `ExecutionContext` builds its own
//! coordinator and notifier.

pub mod coordinator;
pub mod error;
pub mod notifier;
pub mod pending;

pub use coordinator::{
    HttpRenewer, RefreshConfig, RefreshCoordinator, RefreshState, RenewFuture, SessionRenewer,
};
pub use error::{RefreshError, Result};
pub use notifier::{ContextMode, SessionEvent, SessionNotifier};
pub use pending::{PendingQueue, Settlement};
