//! Connection handles and live-connection tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count live connections and enforce the admission limit
//! - Wake drain waiters when the last connection finishes
//! - Wrap accepted streams with read / write / idle deadlines
//!
//! # Handler contract for idle timeouts
//! The idle deadline is armed once, when the connection is dispatched.
//! A handler that wants "close after N seconds without traffic" must call
//! [`Connection::rearm_idle`] after every successful read. Without that,
//! the idle deadline behaves as an absolute deadline from dispatch.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::resilience::timeouts::{timed_out, Deadline};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicUsize,
    drained: Notify,
}

/// Tracks live connections for admission control and graceful shutdown.
///
/// The counter is the single source of truth for how many dispatched
/// connections are still running. It is only changed through
/// [`ConnectionTracker::try_track`] and [`ConnectionGuard`]'s drop.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new live connection unless `limit` connections are already live.
    ///
    /// A `limit` of zero means unbounded. The check and the increment are a
    /// single compare-exchange, so the count never exceeds a nonzero limit.
    pub fn try_track(&self, limit: usize) -> Option<ConnectionGuard> {
        let mut current = self.inner.active.load(Ordering::SeqCst);
        loop {
            if limit > 0 && current >= limit {
                return None;
            }
            match self.inner.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        metrics::record_connection_opened();
        Some(ConnectionGuard {
            inner: Arc::clone(&self.inner),
            id: ConnectionId::new(),
            opened_at: Instant::now(),
        })
    }

    /// Get current live connection count.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until the live connection count reaches zero.
    ///
    /// Returns immediately if nothing is live. Callers bound the wait
    /// with `tokio::time::timeout`.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check
            // and the await is not missed.
            notified.as_mut().enable();

            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Guard that holds one slot of the live connection count.
/// Releases the slot when dropped, including during a panic unwind.
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<TrackerInner>,
    id: ConnectionId,
    opened_at: Instant,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let previous = self.inner.active.fetch_sub(1, Ordering::SeqCst);
        let remaining = previous.saturating_sub(1);
        metrics::record_connection_closed();
        metrics::record_connection_duration(self.opened_at.elapsed());
        if remaining == 0 {
            self.inner.drained.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, remaining, "Connection slot released");
    }
}

/// Per-connection deadlines applied at dispatch.
///
/// Zero disables the corresponding deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionTimeouts {
    pub read: Duration,
    pub write: Duration,
    pub idle: Duration,
}

/// An accepted connection handed to a handler.
///
/// Reads fail with `TimedOut` once the read or idle deadline has passed;
/// writes, flushes and shutdowns fail once the write or idle deadline has
/// passed. The engine owns the handle and closes it when the handler
/// returns.
pub struct Connection<S, A = SocketAddr> {
    id: ConnectionId,
    peer_addr: A,
    io: S,
    scope: CancellationToken,
    idle_timeout: Duration,
    read_deadline: Deadline,
    write_deadline: Deadline,
    idle_deadline: Deadline,
}

impl<S, A> Connection<S, A> {
    /// Wrap an accepted stream. No deadlines are armed.
    pub fn new(id: ConnectionId, peer_addr: A, io: S, scope: CancellationToken) -> Self {
        Self {
            id,
            peer_addr,
            io,
            scope,
            idle_timeout: Duration::ZERO,
            read_deadline: Deadline::unarmed(),
            write_deadline: Deadline::unarmed(),
            idle_deadline: Deadline::unarmed(),
        }
    }

    /// Arm all deadlines relative to now.
    pub fn apply_timeouts(&mut self, timeouts: &ConnectionTimeouts) {
        self.read_deadline.rearm(timeouts.read);
        self.write_deadline.rearm(timeouts.write);
        self.idle_timeout = timeouts.idle;
        self.idle_deadline.rearm(timeouts.idle);
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> &A {
        &self.peer_addr
    }

    /// The cancellation scope for this connection, cancelled when the acceptor stops.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.io
    }

    /// Mutably borrow the underlying stream. I/O through this reference
    /// bypasses the deadlines.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.io
    }

    /// Push the idle deadline out by the configured idle timeout.
    ///
    /// Handlers call this after each successful read. No-op when no idle
    /// timeout is configured.
    pub fn rearm_idle(&mut self) {
        self.idle_deadline.rearm(self.idle_timeout);
    }

    pub fn set_read_deadline(&mut self, at: Option<Instant>) {
        self.read_deadline.set(at);
    }

    pub fn set_write_deadline(&mut self, at: Option<Instant>) {
        self.write_deadline.set(at);
    }

    pub fn set_idle_deadline(&mut self, at: Option<Instant>) {
        self.idle_deadline.set(at);
    }

    pub fn read_deadline(&self) -> Option<Instant> {
        self.read_deadline.expires_at()
    }

    pub fn write_deadline(&self) -> Option<Instant> {
        self.write_deadline.expires_at()
    }

    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline.expires_at()
    }

    /// Close the connection by dropping the stream.
    pub fn close(self) {
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }

    fn poll_read_deadlines(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        if self.read_deadline.poll_expired(cx).is_ready() {
            return Poll::Ready(timed_out("read"));
        }
        if self.idle_deadline.poll_expired(cx).is_ready() {
            return Poll::Ready(timed_out("idle"));
        }
        Poll::Pending
    }

    fn poll_write_deadlines(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        if self.write_deadline.poll_expired(cx).is_ready() {
            return Poll::Ready(timed_out("write"));
        }
        if self.idle_deadline.poll_expired(cx).is_ready() {
            return Poll::Ready(timed_out("idle"));
        }
        Poll::Pending
    }
}

impl<S, A: fmt::Debug> fmt::Debug for Connection<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("read_deadline", &self.read_deadline.expires_at())
            .field("write_deadline", &self.write_deadline.expires_at())
            .field("idle_deadline", &self.idle_deadline.expires_at())
            .field(
                "expired",
                &(self.read_deadline.has_expired()
                    || self.write_deadline.has_expired()
                    || self.idle_deadline.has_expired()),
            )
            .finish_non_exhaustive()
    }
}

impl<S, A> AsyncRead for Connection<S, A>
where
    S: AsyncRead + Unpin,
    A: Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = Pin::get_mut(self);
        if let Poll::Ready(err) = this.poll_read_deadlines(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.io).poll_read(cx, buf)
    }
}

impl<S, A> AsyncWrite for Connection<S, A>
where
    S: AsyncWrite + Unpin,
    A: Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = Pin::get_mut(self);
        if let Poll::Ready(err) = this.poll_write_deadlines(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = Pin::get_mut(self);
        if let Poll::Ready(err) = this.poll_write_deadlines(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = Pin::get_mut(self);
        if let Poll::Ready(err) = this.poll_write_deadlines(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.io).poll_shutdown(cx)
    }
}
