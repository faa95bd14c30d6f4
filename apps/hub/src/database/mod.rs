//! Persistence gateway for the hub.
//!
//! The hub owns validators, monitored targets, and ticks in a libsql
//! database behind a connection pool. The one contract the protocol core
//! depends on is [`Database::record_tick_and_increment_payout`] being a
//! single transaction.

pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{TargetRecord, TickRecord, ValidatorRecord};
pub use repository::{Database, DatabaseImpl};

use anyhow::Result;
use std::path::Path;

use crate::pool::{LibsqlManager, LibsqlPool};

/// Open (or create) the hub database at `path`, run migrations, and build
/// the connection pool.
pub async fn initialize_database(path: &Path) -> Result<LibsqlPool> {
    let database = libsql::Builder::new_local(path).build().await?;

    let conn = database.connect()?;
    migrations::run_migrations(&conn).await?;

    let manager = LibsqlManager::new(database);
    let pool = LibsqlPool::builder(manager).build()?;
    Ok(pool)
}
