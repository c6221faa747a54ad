//! peershift command-line entry point.

mod progress;
mod storage;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use peershift_session::protocol::SessionId;
use peershift_session::{download, upload};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::storage::Storage;

#[derive(Parser)]
#[command(name = "peershift")]
#[command(about = "Send one file directly to a peer behind NAT", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the TLS certificate
    #[arg(long, global = true, value_name = "DIR")]
    app_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for a peer and receive one file
    #[command(visible_alias = "dl")]
    Download {
        /// Output file or directory (defaults to the sender's file name)
        #[arg(short, long, value_name = "PATH")]
        destination: Option<PathBuf>,
    },
    /// Send one file to the peer holding a session id
    #[command(visible_alias = "ul")]
    Upload {
        /// Session id printed by the downloader
        peer: String,
        /// File to send
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = tokio::runtime::Runtime::new()
        .context("cannot start the async runtime")
        .and_then(|rt| rt.block_on(run(cli)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let storage = Storage::open(cli.app_dir)?;
    let config = storage.config()?;
    let tls = storage.tls_context(&config)?;
    let settings = config.rendezvous();
    let options = config.session_options()?;
    tracing::debug!(app_dir = %storage.dir().display(), host = %settings.host, port = settings.port, "configuration loaded");

    let (events_tx, events_rx) = mpsc::channel(16);

    match cli.command {
        Command::Download { destination } => {
            let reporter = tokio::spawn(progress::report_events(events_rx, true));
            let outcome = download(&settings, &tls, destination.as_deref(), &options, &events_tx).await;
            drop(events_tx);
            let _ = reporter.await;

            let outcome = outcome.context("download failed")?;
            println!(
                "Received {} ({} bytes) into {}",
                outcome.info.name(),
                outcome.info.size(),
                outcome.path.display()
            );
        }
        Command::Upload { peer, file } => {
            let peer: SessionId = peer
                .parse()
                .with_context(|| format!("invalid session id {peer:?}"))?;

            let reporter = tokio::spawn(progress::report_events(events_rx, false));
            let outcome = upload(&settings, &tls, &peer, &file, &options, &events_tx).await;
            drop(events_tx);
            let _ = reporter.await;

            let outcome = outcome.context("upload failed")?;
            println!(
                "Sent {} ({} bytes) in {} chunks",
                outcome.info.name(),
                outcome.info.size(),
                outcome.chunks
            );
        }
    }

    Ok(())
}
