//! The per-connection handler capability.

use std::future::Future;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

use crate::net::Connection;

/// Processes one accepted connection to completion.
///
/// The acceptor owns the connection: it is closed and its admission slot
/// released as soon as the returned future completes, whatever the
/// outcome. Errors are the handler's own concern.
///
/// `scope` is cancelled when the acceptor stops. Handlers that ignore it
/// keep `Acceptor::stop` waiting until its deadline.
///
/// For idle-timeout semantics, call [`Connection::rearm_idle`] after every
/// successful read; the acceptor only arms the idle deadline at dispatch.
pub trait Handler<S, A = SocketAddr>: Send + Sync + 'static {
    fn handle(
        &self,
        scope: CancellationToken,
        conn: &mut Connection<S, A>,
    ) -> impl Future<Output = ()> + Send;
}
