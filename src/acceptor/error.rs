//! Acceptor error types.

use std::time::Duration;

/// Terminal conditions reported by [`Acceptor::run`](super::Acceptor::run)
/// and [`Acceptor::stop`](super::Acceptor::stop).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcceptorError {
    /// `run` was called on an acceptor that has already been stopped.
    #[error("acceptor is closed")]
    Closed,

    /// `run` was called while another `run` is still accepting.
    #[error("acceptor is already running")]
    AlreadyRunning,

    /// `stop` gave up waiting. The listed connections are still running.
    #[error("shutdown deadline of {grace:?} exceeded with {active} connection(s) still active")]
    DeadlineExceeded { active: usize, grace: Duration },
}

impl AcceptorError {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, AcceptorError::DeadlineExceeded { .. })
    }
}
