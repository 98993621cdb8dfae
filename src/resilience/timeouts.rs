//! Timeout enforcement.
//!
//! # Responsibilities
//! - Hold a re-armable deadline for connection reads, writes and idleness
//! - Let I/O wrappers poll the deadline alongside the underlying stream
//!
//! # Design Decisions
//! - Uses Tokio's timer (`Sleep`), reset in place instead of reallocated
//! - A zero duration means "no deadline", never "already expired"
//! - Expiry surfaces as `io::ErrorKind::TimedOut`, distinct from other errors

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};

/// A point in time after which an operation is no longer allowed.
///
/// An unarmed deadline never fires.
#[derive(Debug, Default)]
pub struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    /// A deadline that never fires.
    pub fn unarmed() -> Self {
        Self { sleep: None }
    }

    /// A deadline `timeout` from now, or unarmed when `timeout` is zero.
    pub fn after(timeout: Duration) -> Self {
        let mut deadline = Self::unarmed();
        deadline.rearm(timeout);
        deadline
    }

    /// Set the absolute expiry, or disarm with `None`.
    pub fn set(&mut self, at: Option<Instant>) {
        match (at, self.sleep.as_mut()) {
            (Some(at), Some(sleep)) => sleep.as_mut().reset(at),
            (Some(at), None) => self.sleep = Some(Box::pin(tokio::time::sleep_until(at))),
            (None, _) => self.sleep = None,
        }
    }

    /// Move the expiry to `timeout` from now. Zero disarms.
    pub fn rearm(&mut self, timeout: Duration) {
        if timeout.is_zero() {
            self.set(None);
        } else {
            self.set(Some(Instant::now() + timeout));
        }
    }

    /// The configured expiry, if armed.
    pub fn expires_at(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|sleep| sleep.deadline())
    }

    /// Whether the deadline has already passed.
    pub fn has_expired(&self) -> bool {
        self.expires_at().is_some_and(|at| at <= Instant::now())
    }

    /// Poll the deadline, registering the waker so the task is woken on expiry.
    ///
    /// Returns `Pending` forever when unarmed.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().poll(cx),
            None => Poll::Pending,
        }
    }
}

/// Build the error returned when an I/O operation runs past its deadline.
pub fn timed_out(operation: &'static str) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{} deadline exceeded", operation),
    )
}
