//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Acceptor and dispatched connections produce:
//!     → logging.rs (structured log events, per-connection spans)
//!     → metrics.rs (counters, gauges, histograms)
//!     → diagnostics.rs (caller-supplied sink for recoverable errors)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Connection ID flows through every per-connection event
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod diagnostics;
pub mod logging;
pub mod metrics;
