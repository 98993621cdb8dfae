//! Accept-error recovery, per-connection deadlines and keep-alive.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use graceful_acceptor::{CancellationToken, Connection, Handler, Options};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

use common::{bind_local, channel_listener, first_read, read_to_close, start, wait_until, EchoHandler, SleepyHandler, GREETING};

fn collecting_sink() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let messages = Arc::clone(&messages);
        move |message: &str| messages.lock().unwrap().push(message.to_string())
    };
    (messages, sink)
}

#[tokio::test]
async fn test_transient_accept_errors_are_reported_and_loop_continues() {
    let (listener, connector) = channel_listener();
    let (messages, sink) = collecting_sink();
    let handler = SleepyHandler::new(Duration::ZERO);
    let (acceptor, _run) = start(listener, handler.clone(), Options::new().with_diagnostics(sink));

    connector.fail(io::ErrorKind::ConnectionAborted);
    connector.fail(io::ErrorKind::Other);
    let mut client = connector.connect();

    assert_eq!(first_read(&mut client, Duration::from_secs(2)).await.as_deref(), Some(GREETING));
    assert_eq!(handler.invocations(), 1);

    let messages = messages.lock().unwrap().clone();
    assert_eq!(messages.len(), 2, "each failure is reported once: {:?}", messages);
    assert!(messages.iter().all(|m| m.starts_with("accept error")));

    drop(messages);
    acceptor.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_accept_errors_without_sink_are_dropped() {
    let (listener, connector) = channel_listener();
    let handler = SleepyHandler::new(Duration::ZERO);
    let (acceptor, run) = start(listener, handler.clone(), Options::new());

    connector.fail(io::ErrorKind::Other);
    let mut client = connector.connect();
    assert_eq!(first_read(&mut client, Duration::from_secs(2)).await.as_deref(), Some(GREETING));

    acceptor.stop(Duration::from_secs(1)).await.unwrap();
    assert_eq!(run.await.unwrap(), Ok(()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_read_deadline_closes_silent_client() {
    let (listener, addr) = bind_local().await;
    let handler = EchoHandler::default();
    let options = Options::new().with_read_timeout(Duration::from_millis(100));
    let (acceptor, _run) = start(listener, handler.clone(), options);

    let mut client = TcpStream::connect(addr).await.unwrap();
    let received = read_to_close(&mut client, Duration::from_secs(2)).await;

    assert_eq!(received, Some(Vec::new()), "server should close after the read deadline");
    assert!(wait_until(Duration::from_secs(1), || acceptor.active_connections() == 0).await);
    assert_eq!(handler.endings(), vec![io::ErrorKind::TimedOut]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rearmed_idle_deadline_tracks_activity() {
    let (listener, addr) = bind_local().await;
    let handler = EchoHandler::default();
    let options = Options::new().with_idle_timeout(Duration::from_millis(200));
    let (acceptor, _run) = start(listener, handler.clone(), options);

    let mut client = TcpStream::connect(addr).await.unwrap();
    // Active for well past one idle period.
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(60)).await;
        client.write_all(b"k").await.unwrap();
        assert_eq!(first_read(&mut client, Duration::from_secs(1)).await.as_deref(), Some(&b"k"[..]));
    }
    assert_eq!(acceptor.active_connections(), 1);

    // Then silent: the idle deadline closes it.
    let received = read_to_close(&mut client, Duration::from_secs(2)).await;
    assert_eq!(received, Some(Vec::new()));
    assert!(wait_until(Duration::from_secs(1), || acceptor.active_connections() == 0).await);
    assert_eq!(handler.endings(), vec![io::ErrorKind::TimedOut]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_keep_alive_connections_are_served() {
    let (listener, addr) = bind_local().await;
    let (messages, sink) = collecting_sink();
    let handler = EchoHandler::default();
    let options = Options::new()
        .with_keep_alive(Duration::from_secs(30))
        .with_diagnostics(sink);
    let (acceptor, _run) = start(listener, handler.clone(), options);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    assert_eq!(first_read(&mut client, Duration::from_secs(1)).await.as_deref(), Some(&b"ping"[..]));

    drop(client);
    assert!(wait_until(Duration::from_secs(1), || acceptor.active_connections() == 0).await);
    assert!(messages.lock().unwrap().is_empty(), "keep-alive should apply cleanly");
    acceptor.stop(Duration::from_secs(1)).await.unwrap();
}

/// Waits past its write deadline, then tries to write.
#[derive(Clone, Default)]
struct LateWriter {
    results: Arc<Mutex<Vec<io::ErrorKind>>>,
}

impl<S, A> Handler<S, A> for LateWriter
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    A: Unpin + Send + Sync + 'static,
{
    async fn handle(&self, _scope: CancellationToken, conn: &mut Connection<S, A>) {
        tokio::time::sleep(Duration::from_millis(60)).await;
        if let Err(e) = conn.write_all(b"too late").await {
            self.results.lock().unwrap().push(e.kind());
        }
    }
}

#[tokio::test]
async fn test_write_deadline_fails_late_writes() {
    let (listener, connector) = channel_listener();
    let handler = LateWriter::default();
    let options = Options::new().with_write_timeout(Duration::from_millis(20));
    let (acceptor, _run) = start(listener, handler.clone(), options);

    let mut client = connector.connect();
    let received = read_to_close(&mut client, Duration::from_secs(2)).await;

    assert_eq!(received, Some(Vec::new()), "nothing is written after the deadline");
    assert!(wait_until(Duration::from_secs(1), || acceptor.active_connections() == 0).await);
    assert_eq!(*handler.results.lock().unwrap(), vec![io::ErrorKind::TimedOut]);
}
