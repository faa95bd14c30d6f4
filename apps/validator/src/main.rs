mod config;
mod connection;
mod worker;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use config::Config;
use connection::ConnectionManager;
use watchpost::crypto::load_or_generate_keypair;
use watchpost::probe::Prober;

#[derive(Parser)]
#[command(name = "watchpost-validator", version, about = "Watchpost validator agent: performs uptime probes for the hub")]
struct Cli {
    /// Path to the validator config file (defaults to the XDG config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    logger::init();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref()).context("failed to load config")?;

    let keypair = load_or_generate_keypair(std::path::Path::new(&config.identity.key_path))?;
    info!("Validator identity: {}", keypair.public_key_hex());

    let prober = Prober::new(config.probe.timeout_seconds)?;
    let manager = ConnectionManager::new(
        config.hub.url,
        config.identity.network_address,
        Duration::from_secs(config.hub.reconnect_backoff_seconds),
        keypair,
        prober,
    );

    manager.run().await;
    Ok(())
}
