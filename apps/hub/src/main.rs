mod config;
mod database;
mod dispatch;
mod pool;
mod registry;
mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

use config::Config;
use database::{initialize_database, Database, DatabaseImpl};
use dispatch::DispatchScheduler;
use registry::ConnectionRegistry;
use server::HubState;
use watchpost::callbacks::CallbackMap;

#[derive(Parser)]
#[command(name = "watchpost-hub", version, about = "Watchpost hub: registers validators and schedules uptime checks")]
struct Cli {
    /// Path to the hub config file (defaults to the XDG config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the hub (default)
    Run,
    /// Add a monitored target
    AddTarget { url: String },
    /// Disable a monitored target
    DisableTarget { id: Uuid },
    /// Re-enable a monitored target
    EnableTarget { id: Uuid },
    /// List monitored targets that are currently active
    ListTargets,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    logger::init();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref()).context("failed to load config")?;

    let pool = initialize_database(std::path::Path::new(&config.database.path)).await?;
    let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_hub(config, database).await,
        Command::AddTarget { url } => {
            let target = database.create_target(&url).await?;
            println!("{}  {}", target.id, target.url);
            Ok(())
        }
        Command::DisableTarget { id } => database.set_target_disabled(id, true).await,
        Command::EnableTarget { id } => database.set_target_disabled(id, false).await,
        Command::ListTargets => {
            for target in database.find_active_targets().await? {
                println!("{}  {}", target.id, target.url);
            }
            Ok(())
        }
    }
}

async fn run_hub(config: Config, database: Arc<dyn Database>) -> Result<()> {
    let state = Arc::new(HubState {
        registry: Arc::new(ConnectionRegistry::new()),
        callbacks: Arc::new(CallbackMap::new()),
        database: Arc::clone(&database),
    });

    let scheduler = Arc::new(DispatchScheduler::new(
        Arc::clone(&state.registry),
        Arc::clone(&state.callbacks),
        database,
        config.dispatch.payout_per_check,
        Duration::from_secs(config.dispatch.interval_seconds),
        Duration::from_secs(config.dispatch.callback_ttl_seconds),
    ));
    tokio::spawn(scheduler.run());

    let addr = format!("{}:{}", config.listen.bind, config.listen.port);
    let listener = TcpListener::bind(&addr).await.context("failed to bind listen address")?;
    info!("Starting hub on {}", addr);

    server::run(listener, state).await;
    Ok(())
}
