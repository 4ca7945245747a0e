//! Queue of callers waiting on an in-flight refresh
//!
//! Each waiting caller is one `PendingCall`: a ticket number and the sending
//! half of a oneshot channel. Settling drains the queue front to back, so
//! callers are resolved or rejected in the order they were enqueued, and the
//! oneshot guarantees each is settled at most once.

use std::collections::VecDeque;

use session_auth::CredentialPair;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::RefreshError;

/// Outcome delivered to every caller of one refresh episode.
pub type Settlement = Result<CredentialPair, RefreshError>;

struct PendingCall {
    ticket: u64,
    tx: oneshot::Sender<Settlement>,
}

/// FIFO arena of deferred refresh results.
#[derive(Default)]
pub struct PendingQueue {
    next_ticket: u64,
    calls: VecDeque<PendingCall>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a caller to the back of the queue.
    ///
    /// Returns the caller's ticket and the receiver its result arrives on.
    /// Tickets increase monotonically over the queue's lifetime.
    pub fn enqueue(&mut self) -> (u64, oneshot::Receiver<Settlement>) {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.calls.push_back(PendingCall { ticket, tx });
        (ticket, rx)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Settle every queued caller with `outcome`, front to back.
    ///
    /// Leaves the queue empty and returns the tickets in settlement order.
    /// A caller that stopped waiting (receiver dropped) still counts as settled.
    pub fn settle_all(&mut self, outcome: &Settlement) -> Vec<u64> {
        let mut settled = Vec::with_capacity(self.calls.len());
        while let Some(call) = self.calls.pop_front() {
            if call.tx.send(outcome.clone()).is_err() {
                debug!(ticket = call.ticket, "refresh waiter gone before settlement");
            }
            settled.push(call.ticket);
        }
        settled
    }
}
