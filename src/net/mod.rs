//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming connection
//!     → listener.rs (Listener trait, TCP/Unix impls, keep-alive)
//!     → acceptor admission check (connection.rs tracker)
//!     → connection.rs (Connection handle with deadlines + scope)
//!     → Hand off to the Handler
//! ```
//!
//! # Design Decisions
//! - Admission is a hard reject, never a queue
//! - Each connection is tracked for graceful shutdown
//! - Deadlines live on the connection handle, not on the socket

pub mod connection;
pub mod listener;

pub use connection::{Connection, ConnectionId, ConnectionTimeouts, ConnectionTracker};
pub use listener::Listener;
