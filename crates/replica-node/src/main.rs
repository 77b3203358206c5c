//! Replica node
//!
//! Runs the entropy repair listener or the DNS seed poller.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use replica_entropy::{EntropyReceiver, LoopbackUplink};
use replica_node::{listener, seeds, shutdown_signal, NodeConfig};
use replica_seeds::SeedPoller;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "replica-node")]
#[command(about = "Replica node - anti-entropy receiver and seed discovery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "replica.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept repair batches from peers and apply them to local storage
    Receive,
    /// Poll the DNS TXT record for cluster seeds
    Seeds,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = NodeConfig::load(&cli.config)?;
    config.apply_env()?;
    config.validate()?;

    match cli.command {
        Commands::Receive => receive(&config).await,
        Commands::Seeds => poll_seeds(&config).await,
    }
}

async fn receive(config: &NodeConfig) -> Result<()> {
    let cipher = config.entropy.load_cipher()?;
    let uplink = LoopbackUplink::new(config.entropy.uplink_port);
    let receiver = Arc::new(EntropyReceiver::from_config(&config.entropy, cipher, uplink)?);

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind entropy listener on {}", config.listen))?;
    listener::serve(listener, receiver, shutdown_signal()).await?;
    Ok(())
}

async fn poll_seeds(config: &NodeConfig) -> Result<()> {
    let mut poller = SeedPoller::from_config(&config.seeds)?;
    seeds::run_poll_loop(&mut poller, seeds::POLL_TICK, shutdown_signal(), seeds::log_seeds).await;
    Ok(())
}
