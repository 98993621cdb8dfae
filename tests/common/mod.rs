//! Shared utilities for acceptor integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use graceful_acceptor::{Acceptor, AcceptorError, CancellationToken, Connection, Handler, Listener, Options};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bind a loopback listener on an ephemeral port.
pub async fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Build an acceptor and spawn its accept loop.
pub fn start<L, H>(listener: L, handler: H, options: Options) -> (Arc<Acceptor<L, H>>, JoinHandle<Result<(), AcceptorError>>)
where
    L: Listener,
    H: Handler<L::Io, L::Addr>,
{
    let acceptor = Arc::new(Acceptor::new(listener, handler, options));
    let run = tokio::spawn({
        let acceptor = Arc::clone(&acceptor);
        async move { acceptor.run().await }
    });
    (acceptor, run)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Read until EOF or error; returns the bytes received.
///
/// A reset counts as closed.
pub async fn read_to_close<S: tokio::io::AsyncRead + Unpin>(stream: &mut S, timeout: Duration) -> Option<Vec<u8>> {
    let mut received = Vec::new();
    match tokio::time::timeout(timeout, stream.read_to_end(&mut received)).await {
        Ok(Ok(_)) | Ok(Err(_)) => Some(received),
        Err(_) => None,
    }
}

/// Perform a single read; `Some(empty)` means the peer closed (or reset)
/// the connection, `None` that nothing happened within `timeout`.
pub async fn first_read<S: tokio::io::AsyncRead + Unpin>(stream: &mut S, timeout: Duration) -> Option<Vec<u8>> {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) => Some(buf[..n].to_vec()),
        Ok(Err(_)) => Some(Vec::new()),
        Err(_) => None,
    }
}

/// Greeting written by [`SleepyHandler`] as soon as it runs.
pub const GREETING: &[u8] = b"hello";

/// Writes [`GREETING`], then sleeps for a fixed time, ignoring the
/// cancellation scope.
#[derive(Clone, Default)]
pub struct SleepyHandler {
    pub delay: Duration,
    pub invocations: Arc<AtomicUsize>,
}

impl SleepyHandler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl<S, A> Handler<S, A> for SleepyHandler
where
    S: tokio::io::AsyncWrite + Unpin + Send + Sync + 'static,
    A: Unpin + Send + Sync + 'static,
{
    async fn handle(&self, _scope: CancellationToken, conn: &mut Connection<S, A>) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let _ = conn.write_all(GREETING).await;
        let _ = conn.flush().await;
        tokio::time::sleep(self.delay).await;
    }
}

/// Never returns, whatever happens to its scope.
#[derive(Clone, Default)]
pub struct HangingHandler;

impl<S, A> Handler<S, A> for HangingHandler
where
    S: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    async fn handle(&self, _scope: CancellationToken, _conn: &mut Connection<S, A>) {
        std::future::pending::<()>().await;
    }
}

/// Waits for its scope to be cancelled, then records it and returns.
#[derive(Clone, Default)]
pub struct ScopeAwareHandler {
    pub observed_cancel: Arc<AtomicUsize>,
}

impl<S, A> Handler<S, A> for ScopeAwareHandler
where
    S: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    async fn handle(&self, scope: CancellationToken, conn: &mut Connection<S, A>) {
        assert!(!conn.scope().is_cancelled());
        scope.cancelled().await;
        assert!(conn.scope().is_cancelled());
        self.observed_cancel.fetch_add(1, Ordering::SeqCst);
    }
}

/// Echoes bytes back, re-arming the idle deadline after every read.
/// Records how each connection ended.
#[derive(Clone, Default)]
pub struct EchoHandler {
    pub endings: Arc<Mutex<Vec<io::ErrorKind>>>,
}

impl EchoHandler {
    pub fn endings(&self) -> Vec<io::ErrorKind> {
        self.endings.lock().unwrap().clone()
    }
}

impl<S, A> Handler<S, A> for EchoHandler
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + Sync + 'static,
    A: Unpin + Send + Sync + 'static,
{
    async fn handle(&self, _scope: CancellationToken, conn: &mut Connection<S, A>) {
        let mut buf = [0u8; 256];
        let ending = loop {
            match conn.read(&mut buf).await {
                Ok(0) => break io::ErrorKind::UnexpectedEof,
                Ok(n) => {
                    conn.rearm_idle();
                    if let Err(e) = conn.write_all(&buf[..n]).await {
                        break e.kind();
                    }
                }
                Err(e) => break e.kind(),
            }
        };
        self.endings.lock().unwrap().push(ending);
    }
}

/// An in-memory listener fed through a channel.
///
/// Each queued item is returned from `accept` in order; once the queue is
/// drained and the sender dropped, `accept` pends forever.
pub struct ChannelListener {
    rx: mpsc::UnboundedReceiver<io::Result<DuplexStream>>,
}

pub struct ChannelConnector {
    tx: mpsc::UnboundedSender<io::Result<DuplexStream>>,
}

pub fn channel_listener() -> (ChannelListener, ChannelConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelListener { rx }, ChannelConnector { tx })
}

impl ChannelConnector {
    /// Queue a new connection and return the client side.
    pub fn connect(&self) -> DuplexStream {
        let (server, client) = tokio::io::duplex(1024);
        self.tx.send(Ok(server)).unwrap();
        client
    }

    /// Make the next `accept` fail.
    pub fn fail(&self, kind: io::ErrorKind) {
        self.tx.send(Err(io::Error::new(kind, "injected accept failure"))).unwrap();
    }
}

impl Listener for ChannelListener {
    type Io = DuplexStream;
    type Addr = &'static str;

    async fn accept(&mut self) -> io::Result<(DuplexStream, &'static str)> {
        match self.rx.recv().await {
            Some(result) => result.map(|io| (io, "memory")),
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<&'static str> {
        Ok("memory")
    }
}

/// Connect a TCP client and write a byte so the server side is definitely live.
pub async fn connect(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"x").await.unwrap();
    stream
}
