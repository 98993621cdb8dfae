//! Connection-accepting service engine.
//!
//! Turns a listening socket into independently handled connections, with
//! an admission limit, per-connection deadlines and a bounded graceful
//! shutdown.
//!
//! ```text
//!   Listener ──accept──▶ Acceptor ──admit──▶ spawn ──▶ Handler(scope, &mut Connection)
//!                           │                              │
//!                     stop(grace)                    close + release slot
//!                           │                              │
//!                           └──────── drain wait ◀─────────┘
//! ```

pub mod acceptor;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use acceptor::{Acceptor, AcceptorError, Handler, Options};
pub use config::ServiceConfig;
pub use lifecycle::{AcceptorState, Completion};
pub use net::{Connection, ConnectionId, Listener};
pub use observability::diagnostics::{Diagnostics, TracingDiagnostics};
pub use tokio_util::sync::CancellationToken;
