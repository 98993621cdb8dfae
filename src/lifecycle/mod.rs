//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop() → cancel token → accept loop exits, listener dropped
//!            → completion signal set → wait for live count == 0 (bounded)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller invokes stop(grace)
//! ```
//!
//! # Design Decisions
//! - Cancellation is one-way: Live → Stopping → Stopped
//! - Shutdown has a deadline, but in-flight connections are never aborted

pub mod shutdown;
pub mod signals;

pub use shutdown::{AcceptorState, Completion, Shutdown};
