//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop:
//!     → accept error while live
//!     → backoff.rs (exponential delay with jitter, reset on success)
//!     → retry accept
//!
//! Dispatched connection:
//!     → timeouts.rs (read / write / idle deadlines)
//!     → expired deadline fails the I/O with TimedOut
//! ```
//!
//! # Design Decisions
//! - Accept errors are never fatal while the acceptor is live
//! - Deadlines are per connection and owned by the connection handle

pub mod backoff;
pub mod timeouts;
