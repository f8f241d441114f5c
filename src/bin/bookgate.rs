//! Bookgate server and maintenance CLI.

use bookgate::{Gateway, GatewayConfig, SearchServer};
use bookgate_search::WarmOutcome;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Caching gateway for book metadata search.
#[derive(Parser)]
#[command(name = "bookgate", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Serve the search API (default).
    Serve {
        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Warm the cache once for the configured targets and exit.
    Warm {
        /// Fetch even when a live entry exists.
        #[arg(long)]
        force: bool,

        /// Extra author names to warm.
        #[arg(long = "author")]
        authors: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bookgate=info,bookgate_search=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        GatewayConfig::from_file(path)?
    } else {
        GatewayConfig::default()
    };

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(config, port).await,
        Command::Warm { force, authors } => warm_once(config, force, authors).await,
    }
}

async fn serve(mut config: GatewayConfig, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    info!("bookgate v{}", env!("CARGO_PKG_VERSION"));

    let gateway = Gateway::from_config(config)?;
    let server = SearchServer::start(
        gateway.router().clone(),
        &gateway.config().server,
        gateway.cancel_token(),
    )
    .await?;
    gateway.start_jobs();

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, shutting down...");

    // Cancelling the gateway token also stops the listener.
    gateway.shutdown().await;
    server.join().await;
    Ok(())
}

async fn warm_once(mut config: GatewayConfig, force: bool, authors: Vec<String>) -> anyhow::Result<()> {
    config.warmer.authors.extend(authors);
    let gateway = Gateway::from_config(config)?;
    let targets = gateway.warm_targets();
    if targets.is_empty() {
        anyhow::bail!("no warm targets: add warmer.authors or warmer.titles, or pass --author");
    }

    let report = gateway.warmer().warm(&targets, force).await;
    for (target, outcome) in &report.results {
        match outcome {
            WarmOutcome::Warmed { items } => println!("warmed  {}:{} ({items} items)", target.context, target.query),
            WarmOutcome::Skipped => println!("cached  {}:{}", target.context, target.query),
            WarmOutcome::Failed { error } => println!("failed  {}:{} ({error})", target.context, target.query),
        }
    }
    gateway.shutdown().await;

    if report.failed() > 0 {
        anyhow::bail!("{} of {} targets failed", report.failed(), report.results.len());
    }
    Ok(())
}
