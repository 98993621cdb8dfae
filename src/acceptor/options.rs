//! Acceptor options.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AcceptorConfig;
use crate::net::ConnectionTimeouts;
use crate::observability::diagnostics::Diagnostics;

/// Settings fixed when the acceptor is built.
///
/// Zero durations and a zero `max_concurrent` disable the corresponding
/// limit. Negative values are unrepresentable here; the config-file path
/// rejects them during parsing.
#[derive(Clone, Default)]
pub struct Options {
    /// Maximum concurrently handled connections (0 = unbounded).
    pub max_concurrent: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Initial idle deadline. Handlers re-arm it with `Connection::rearm_idle`.
    pub idle_timeout: Duration,
    pub keep_alive: bool,
    /// Idle time before the first keep-alive probe (zero = OS default).
    pub keep_alive_period: Duration,
    /// Where recoverable errors are reported. `None` drops them.
    pub diagnostics: Option<Arc<dyn Diagnostics>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enable keep-alive with the given probe period (zero = OS default).
    pub fn with_keep_alive(mut self, period: Duration) -> Self {
        self.keep_alive = true;
        self.keep_alive_period = period;
        self
    }

    pub fn with_diagnostics(mut self, sink: impl Diagnostics) -> Self {
        self.diagnostics = Some(Arc::new(sink));
        self
    }

    pub(crate) fn timeouts(&self) -> ConnectionTimeouts {
        ConnectionTimeouts {
            read: self.read_timeout,
            write: self.write_timeout,
            idle: self.idle_timeout,
        }
    }

    pub(crate) fn keep_alive_period(&self) -> Option<Duration> {
        (!self.keep_alive_period.is_zero()).then_some(self.keep_alive_period)
    }
}

impl From<&AcceptorConfig> for Options {
    fn from(config: &AcceptorConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            idle_timeout: config.idle_timeout(),
            keep_alive: config.keep_alive,
            keep_alive_period: config.keep_alive_period(),
            diagnostics: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("max_concurrent", &self.max_concurrent)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("keep_alive_period", &self.keep_alive_period)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}
