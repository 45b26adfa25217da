//! Realm - Headless Server
//!
//! Reads JSON commands from stdin and writes JSON responses to stdout, one
//! per line. Logs go to stderr.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use realm_server::protocol::parse_command;
use realm_server::{run, Response, Server, ServerConfig, ServerError};

#[derive(Parser)]
#[command(name = "realm_server")]
#[command(about = "Authoritative simulation host for Realm")]
#[command(version)]
struct Cli {
    /// Server config file (RON)
    #[arg(short, long, env = "REALM_CONFIG")]
    config: Option<PathBuf>,

    /// Override the driver period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();
    let mut config = ServerConfig::load_or_default(cli.config.as_deref())?;
    if let Some(tick_ms) = cli.tick_ms {
        config.tick_ms = tick_ms;
    }

    // Initialize tracing to stderr (stdout is for protocol)
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!("Starting Realm server");
    let server = Server::from_config(&config)?;

    let (ingress_tx, ingress_rx) = mpsc::channel(config.ingress_capacity.max(1));
    let (egress_tx, mut egress_rx) = mpsc::unbounded_channel::<Response>();

    let reader_egress = egress_tx.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(%err, "stdin failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(command) => {
                    if ingress_tx.send(command).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = reader_egress.send(Response::error(None, err.to_string()));
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = egress_rx.recv().await {
            let line = match response.to_line() {
                Ok(line) => line,
                Err(err) => {
                    tracing::error!(%err, "failed to encode response");
                    continue;
                }
            };
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let _ = egress_tx.send(Response::Ready {
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    run(server, ingress_rx, egress_tx, shutdown).await?;

    reader.abort();
    let _ = writer.await;
    tracing::info!("Realm server stopped");
    Ok(())
}
