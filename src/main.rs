//! graceful-acceptor
//!
//! Runs a line-echo service on top of the acceptor engine. Useful for
//! exercising admission limits, deadlines and graceful shutdown against a
//! real socket.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use graceful_acceptor::config::{load_config, ServiceConfig};
use graceful_acceptor::lifecycle::signals::shutdown_signal;
use graceful_acceptor::net::listener;
use graceful_acceptor::observability::{logging, metrics};
use graceful_acceptor::{Acceptor, CancellationToken, Connection, Handler, Options, TracingDiagnostics};

#[derive(Parser)]
#[command(name = "graceful-acceptor")]
#[command(about = "Line-echo service with bounded concurrency and graceful shutdown", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override acceptor.max_concurrent.
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Override shutdown.grace_period_ms.
    #[arg(long)]
    grace_ms: Option<u64>,
}

/// Echoes each line back until EOF, an I/O error, or shutdown.
struct EchoHandler;

impl Handler<TcpStream> for EchoHandler {
    async fn handle(&self, scope: CancellationToken, conn: &mut Connection<TcpStream>) {
        let id = conn.id();
        let mut reader = BufReader::new(conn);
        let mut line = String::new();

        loop {
            line.clear();
            let read = tokio::select! {
                _ = scope.cancelled() => {
                    tracing::debug!(connection_id = %id, "Shutdown observed, closing");
                    return;
                }
                read = reader.read_line(&mut line) => read,
            };

            match read {
                Ok(0) => return,
                Ok(_) => {
                    reader.get_mut().rearm_idle();
                    if let Err(e) = reader.get_mut().write_all(line.as_bytes()).await {
                        tracing::debug!(connection_id = %id, error = %e, "Write failed");
                        return;
                    }
                }
                Err(e) => {
                    tracing::debug!(connection_id = %id, error = %e, "Read failed");
                    return;
                }
            }
        }
    }
}

fn apply_overrides(config: &mut ServiceConfig, cli: &Cli) {
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        config.acceptor.max_concurrent = max_concurrent;
    }
    if let Some(grace_ms) = cli.grace_ms {
        config.shutdown.grace_period_ms = grace_ms;
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    apply_overrides(&mut config, &cli);

    logging::init_logging(&config.observability);
    tracing::info!("graceful-acceptor v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_concurrent = config.acceptor.max_concurrent,
        grace_period_ms = config.shutdown.grace_period_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let tcp = listener::bind(&config.listener).await?;
    let options = Options::from(&config.acceptor).with_diagnostics(TracingDiagnostics);
    let acceptor = Arc::new(Acceptor::new(tcp, EchoHandler, options));

    let mut run = tokio::spawn({
        let acceptor = Arc::clone(&acceptor);
        async move { acceptor.run().await }
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut run => {
            tracing::error!(result = ?result, "Accept loop exited unexpectedly");
        }
    }

    let grace: Duration = config.shutdown.grace_period();
    let outcome = acceptor.stop(grace).await;
    if !run.is_finished() {
        let _ = run.await;
    }

    match outcome {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Exiting with connections still active");
            Ok(ExitCode::FAILURE)
        }
    }
}
