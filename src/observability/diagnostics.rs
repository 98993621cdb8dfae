//! Caller-supplied diagnostic sink.
//!
//! The acceptor reports conditions it recovers from on its own (transient
//! accept errors, keep-alive failures) to an optional [`Diagnostics`]
//! sink. Without a sink those messages are dropped; they are still emitted
//! as `tracing` events.

use std::fmt;

/// Receives human-readable diagnostic messages from the acceptor.
pub trait Diagnostics: Send + Sync + 'static {
    fn log(&self, message: &str);
}

impl<F> Diagnostics for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Forwards diagnostics to `tracing` at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn log(&self, message: &str) {
        tracing::warn!(target: "graceful_acceptor::diagnostics", "{}", message);
    }
}

impl fmt::Debug for dyn Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Diagnostics")
    }
}
