//! Listening socket abstraction.
//!
//! # Responsibilities
//! - Accept incoming connections (TCP, Unix, or a custom transport)
//! - Apply TCP keep-alive to accepted streams
//! - Bind TCP listeners from configuration
//!
//! # Design Decisions
//! - `accept` must be cancel-safe; the acceptor races it against shutdown
//! - Dropping the listener closes the socket
//! - Keep-alive is a no-op for transports that have no such option

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;

/// Error type for listener setup.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Bind address could not be parsed.
    #[error("invalid bind address {address:?}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),
}

/// A source of accepted connections.
pub trait Listener: Send + 'static {
    /// The accepted stream.
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// The peer address reported for each accepted stream.
    type Addr: fmt::Debug + Unpin + Send + Sync + 'static;

    /// Wait for the next connection.
    ///
    /// Must be cancel-safe: dropping the future before it completes must
    /// not lose an accepted connection.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Io, Self::Addr)>> + Send;

    /// The address this listener is bound to.
    fn local_addr(&self) -> io::Result<Self::Addr>;

    /// Enable keep-alive probes on an accepted stream.
    ///
    /// `period` is the idle time before the first probe; `None` keeps the
    /// OS default.
    fn set_keepalive(_io: &Self::Io, _period: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

impl Listener for TcpListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(&*self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }

    fn set_keepalive(io: &TcpStream, period: Option<Duration>) -> io::Result<()> {
        let mut keepalive = TcpKeepalive::new();
        if let Some(period) = period {
            keepalive = keepalive.with_time(period);
        }
        SockRef::from(io).set_tcp_keepalive(&keepalive)
    }
}

#[cfg(unix)]
impl Listener for tokio::net::UnixListener {
    type Io = tokio::net::UnixStream;
    type Addr = tokio::net::unix::SocketAddr;

    fn accept(
        &mut self,
    ) -> impl Future<Output = io::Result<(tokio::net::UnixStream, tokio::net::unix::SocketAddr)>> + Send {
        tokio::net::UnixListener::accept(&*self)
    }

    fn local_addr(&self) -> io::Result<tokio::net::unix::SocketAddr> {
        tokio::net::UnixListener::local_addr(self)
    }
}

/// Bind a TCP listener to the configured address.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|source| ListenerError::Address {
            address: config.bind_address.clone(),
            source,
        })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(ListenerError::Bind)?;

    let local_addr = listener
        .local_addr()
        .map_err(ListenerError::Bind)?;

    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}
