//! Accept, dispatch and graceful shutdown.
//!
//! # Data Flow
//! ```text
//! run():
//!     claim listener → loop {
//!         select(shutdown, accept)
//!             → accept error: report, back off, retry (never fatal while live)
//!             → admission check (hard reject at max_concurrent)
//!             → keep-alive
//!             → spawn task: deadlines → Handler → close → release slot
//!     } → drop listener → completion signal
//!
//! stop(grace):
//!     cancel token → close idle listener → wait(loop exit + live == 0) ≤ grace
//! ```
//!
//! # Design Decisions
//! - One task per connection; the accept loop never waits on handlers
//! - Over-limit connections are closed immediately, never queued
//! - Stop is best-effort: connections still running at the deadline are
//!   left alone and stay counted

pub mod error;
pub mod handler;
pub mod options;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::lifecycle::{AcceptorState, Completion, Shutdown};
use crate::net::connection::ConnectionGuard;
use crate::net::{Connection, ConnectionTracker, Listener};
use crate::observability::metrics;
use crate::resilience::backoff::AcceptBackoff;

pub use error::AcceptorError;
pub use handler::Handler;
pub use options::Options;

/// Where the listening socket currently lives.
enum ListenerSlot<L> {
    /// Built but `run` has not claimed it yet.
    Idle(L),
    /// Owned by the accept loop.
    Running,
    /// Dropped; the socket is closed.
    Closed,
}

/// Owns a listening socket and turns it into independently handled
/// connections, bounded by an admission limit, with a graceful stop.
///
/// Share it behind an `Arc`: one task calls [`Acceptor::run`], any other
/// may call [`Acceptor::stop`].
pub struct Acceptor<L, H> {
    slot: Mutex<ListenerSlot<L>>,
    handler: Arc<H>,
    options: Options,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
}

impl<L, H> Acceptor<L, H>
where
    L: Listener,
    H: Handler<L::Io, L::Addr>,
{
    /// Build an acceptor. Nothing is accepted until [`Acceptor::run`].
    pub fn new(listener: L, handler: H, options: Options) -> Self {
        Self {
            slot: Mutex::new(ListenerSlot::Idle(listener)),
            handler: Arc::new(handler),
            options,
            tracker: ConnectionTracker::new(),
            shutdown: Shutdown::new(),
        }
    }

    /// Accept connections until [`Acceptor::stop`] is called.
    ///
    /// Returns `Ok(())` after a clean stop. Returns [`AcceptorError::Closed`]
    /// immediately if the acceptor was already stopped, and
    /// [`AcceptorError::AlreadyRunning`] if another `run` is in progress.
    /// Dropping the returned future also closes the listener and sets the
    /// completion signal.
    pub async fn run(&self) -> Result<(), AcceptorError> {
        let listener = match self.claim_listener() {
            Ok(listener) => listener,
            Err(AcceptorError::Closed) => {
                self.shutdown.mark_done();
                return Err(AcceptorError::Closed);
            }
            Err(e) => return Err(e),
        };
        let mut exit = LoopExit {
            acceptor: self,
            listener: Some(listener),
        };

        // A stop racing this claim already sees the slot as running and
        // waits for completion; the loop below returns at once.
        let Some(listener) = exit.listener.as_mut() else {
            return Err(AcceptorError::Closed);
        };

        match listener.local_addr() {
            Ok(address) => tracing::info!(
                address = ?address,
                max_concurrent = self.options.max_concurrent,
                "Acceptor started"
            ),
            Err(e) => tracing::info!(error = %e, "Acceptor started (local address unavailable)"),
        }

        self.accept_loop(listener).await;
        drop(exit);

        tracing::info!(active = self.active_connections(), "Acceptor stopped accepting");
        Ok(())
    }

    /// Stop accepting and wait up to `grace` for in-flight connections.
    ///
    /// Safe to call more than once and concurrently with [`Acceptor::run`];
    /// later calls only wait again. On [`AcceptorError::DeadlineExceeded`]
    /// the remaining connections keep running in the background. A zero
    /// `grace` returns `Ok` only if the loop has already exited and nothing
    /// is live.
    pub async fn stop(&self, grace: Duration) -> Result<(), AcceptorError> {
        if self.shutdown.trigger() {
            tracing::info!(
                grace = ?grace,
                active = self.active_connections(),
                "Shutdown triggered"
            );
        }

        let loop_running = {
            let mut slot = self.lock_slot();
            match std::mem::replace(&mut *slot, ListenerSlot::Closed) {
                ListenerSlot::Idle(listener) => {
                    drop(listener);
                    tracing::debug!("Closed listener that was never run");
                    false
                }
                ListenerSlot::Running => {
                    *slot = ListenerSlot::Running;
                    true
                }
                ListenerSlot::Closed => false,
            }
        };

        let mut completion = self.shutdown.completion();
        let drained = async {
            if loop_running {
                completion.wait().await;
            }
            self.tracker.wait_drained().await;
        };

        match tokio::time::timeout(grace, drained).await {
            Ok(()) => {
                tracing::info!("All connections drained");
                Ok(())
            }
            Err(_) => {
                let active = self.active_connections();
                tracing::warn!(
                    grace = ?grace,
                    active,
                    "Shutdown deadline exceeded, leaving connections running"
                );
                Err(AcceptorError::DeadlineExceeded { active, grace })
            }
        }
    }

    /// Point-in-time number of dispatched connections still running.
    pub fn active_connections(&self) -> usize {
        self.tracker.active_count()
    }

    /// Completion signal, set once when the accept loop returns.
    pub fn done(&self) -> Completion {
        self.shutdown.completion()
    }

    pub fn state(&self) -> AcceptorState {
        self.shutdown.state()
    }

    /// A token cancelled when this acceptor stops, for tying other work
    /// to its lifetime.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    fn lock_slot(&self) -> MutexGuard<'_, ListenerSlot<L>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim_listener(&self) -> Result<L, AcceptorError> {
        let mut slot = self.lock_slot();
        match std::mem::replace(&mut *slot, ListenerSlot::Running) {
            ListenerSlot::Idle(listener) => Ok(listener),
            ListenerSlot::Running => Err(AcceptorError::AlreadyRunning),
            ListenerSlot::Closed => {
                *slot = ListenerSlot::Closed;
                Err(AcceptorError::Closed)
            }
        }
    }

    async fn accept_loop(&self, listener: &mut L) {
        let mut backoff = AcceptBackoff::default();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => return,
                result = listener.accept() => result,
            };

            match accepted {
                Ok((io, peer)) => {
                    backoff.reset();
                    self.admit(io, peer);
                }
                Err(e) => {
                    if self.shutdown.is_triggered() {
                        return;
                    }

                    let delay = backoff.on_failure();
                    metrics::record_accept_error();
                    tracing::warn!(
                        error = %e,
                        consecutive_failures = backoff.consecutive_failures(),
                        retry_in = ?delay,
                        "Accept failed"
                    );
                    self.report(&format!("accept error: {}; retrying in {:?}", e, delay));

                    tokio::select! {
                        biased;
                        _ = self.shutdown.triggered() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn admit(&self, io: L::Io, peer: L::Addr) {
        let Some(guard) = self.tracker.try_track(self.options.max_concurrent) else {
            metrics::record_rejected();
            tracing::debug!(
                peer = ?peer,
                max_concurrent = self.options.max_concurrent,
                "Admission limit reached, closing connection"
            );
            drop(io);
            return;
        };

        if self.options.keep_alive {
            if let Err(e) = L::set_keepalive(&io, self.options.keep_alive_period()) {
                tracing::warn!(connection_id = %guard.id(), error = %e, "Failed to enable keep-alive");
                self.report(&format!("keep-alive on {}: {}", guard.id(), e));
            }
        }

        metrics::record_accepted();
        tracing::debug!(
            connection_id = %guard.id(),
            peer = ?peer,
            active = self.tracker.active_count(),
            "Connection accepted"
        );
        self.dispatch(io, peer, guard);
    }

    fn dispatch(&self, io: L::Io, peer: L::Addr, guard: ConnectionGuard) {
        let handler = Arc::clone(&self.handler);
        let scope = self.shutdown.child_token();
        let timeouts = self.options.timeouts();
        let span = tracing::debug_span!("connection", id = %guard.id(), peer = ?peer);

        tokio::spawn(
            async move {
                let mut conn = Connection::new(guard.id(), peer, io, scope.clone());
                conn.apply_timeouts(&timeouts);
                handler.handle(scope, &mut conn).await;
                // Close before releasing the slot so a zero count means
                // every socket is gone.
                conn.close();
                drop(guard);
            }
            .instrument(span),
        );
    }

    fn report(&self, message: &str) {
        if let Some(sink) = &self.options.diagnostics {
            sink.log(message);
        }
    }
}

/// Owns the listener while the accept loop runs. Dropping it, on any exit
/// including a dropped `run` future, closes the socket, marks the slot
/// closed and then sets the completion signal.
struct LoopExit<'a, L, H> {
    acceptor: &'a Acceptor<L, H>,
    listener: Option<L>,
}

impl<L, H> Drop for LoopExit<'_, L, H> {
    fn drop(&mut self) {
        drop(self.listener.take());
        *self
            .acceptor
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = ListenerSlot::Closed;
        self.acceptor.shutdown.mark_done();
    }
}
