//! Shutdown coordination for the acceptor.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Observable lifecycle of an acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    /// Accepting connections.
    Live,
    /// Shutdown was triggered; the accept loop may still be unwinding.
    Stopping,
    /// The accept loop has returned.
    Stopped,
}

/// Coordinator for graceful shutdown.
///
/// Holds the cancellation token every dispatched connection derives its
/// scope from, plus a once-only completion signal written by the accept
/// loop when it returns.
#[derive(Debug)]
pub struct Shutdown {
    token: CancellationToken,
    triggered: AtomicBool,
    done_tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            token: CancellationToken::new(),
            triggered: AtomicBool::new(false),
            done_tx,
        }
    }

    /// Derive a scope that is cancelled when shutdown is triggered.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal.
    ///
    /// Returns `true` only for the call that flipped the token.
    pub fn trigger(&self) -> bool {
        let first = !self.triggered.swap(true, Ordering::SeqCst);
        self.token.cancel();
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// Set the completion signal. Only the first call has an effect.
    pub fn mark_done(&self) -> bool {
        self.done_tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    /// A handle on the completion signal.
    pub fn completion(&self) -> Completion {
        Completion {
            rx: self.done_tx.subscribe(),
        }
    }

    pub fn state(&self) -> AcceptorState {
        if *self.done_tx.borrow() {
            AcceptorState::Stopped
        } else if self.token.is_cancelled() {
            AcceptorState::Stopping
        } else {
            AcceptorState::Live
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Once-only notification that the accept loop has returned.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<bool>,
}

impl Completion {
    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the accept loop to return.
    pub async fn wait(&mut self) {
        // The sender lives as long as the acceptor; if it is gone there is
        // nothing left to wait for.
        let _ = self.rx.wait_for(|done| *done).await;
    }
}
