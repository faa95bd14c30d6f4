use anyhow::{anyhow, Result};
use async_trait::async_trait;
use libsql::params;
use uuid::Uuid;

use super::models::{i64_to_timestamp, timestamp_to_i64, TargetRecord, TickRecord, ValidatorRecord};
use crate::pool::LibsqlPool;
use watchpost::wire::TickStatus;

/// Database trait for abstracting the hub's persistence operations
#[async_trait]
pub trait Database: Send + Sync {
    /// Look up a validator by its hex-encoded public key
    async fn find_validator_by_public_key(&self, public_key: &str)
        -> Result<Option<ValidatorRecord>>;

    /// Look up a validator by id
    async fn find_validator(&self, id: Uuid) -> Result<Option<ValidatorRecord>>;

    /// Create a validator on first signup
    async fn create_validator(
        &self,
        public_key: &str,
        network_address: &str,
        location: &str,
    ) -> Result<ValidatorRecord>;

    /// All non-disabled monitored targets, read fresh each scheduler pass
    async fn find_active_targets(&self) -> Result<Vec<TargetRecord>>;

    /// Create a monitored target
    async fn create_target(&self, url: &str) -> Result<TargetRecord>;

    /// Enable or disable a target
    async fn set_target_disabled(&self, id: Uuid, disabled: bool) -> Result<()>;

    /// Insert a tick and credit the validator's pending payout in one
    /// transaction. Partial application is a correctness violation; if
    /// either write fails, neither applies.
    async fn record_tick_and_increment_payout(&self, tick: &TickRecord, amount: i64) -> Result<()>;

    /// Recent ticks for a target, newest first
    async fn recent_ticks(&self, target_id: Uuid, limit: usize) -> Result<Vec<TickRecord>>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

fn validator_from_row(row: &libsql::Row) -> Result<ValidatorRecord> {
    let id: String = row.get(0)?;
    let created_at: i64 = row.get(5)?;
    Ok(ValidatorRecord {
        id: Uuid::parse_str(&id)?,
        public_key: row.get(1)?,
        network_address: row.get(2)?,
        location: row.get(3)?,
        pending_payout_units: row.get(4)?,
        created_at: i64_to_timestamp(created_at),
    })
}

fn target_from_row(row: &libsql::Row) -> Result<TargetRecord> {
    let id: String = row.get(0)?;
    let created_at: i64 = row.get(3)?;
    Ok(TargetRecord {
        id: Uuid::parse_str(&id)?,
        url: row.get(1)?,
        disabled: row.get::<i64>(2)? != 0,
        created_at: i64_to_timestamp(created_at),
    })
}

fn status_from_str(s: &str) -> Result<TickStatus> {
    match s {
        "UP" => Ok(TickStatus::Up),
        "DOWN" => Ok(TickStatus::Down),
        other => Err(anyhow!("unknown tick status in database: {}", other)),
    }
}

const VALIDATOR_COLUMNS: &str =
    "id, public_key, network_address, location, pending_payout_units, created_at";

#[async_trait]
impl Database for DatabaseImpl {
    async fn find_validator_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<ValidatorRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM validators WHERE public_key = ?", VALIDATOR_COLUMNS),
                params![public_key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(validator_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_validator(&self, id: Uuid) -> Result<Option<ValidatorRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM validators WHERE id = ?", VALIDATOR_COLUMNS),
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(validator_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_validator(
        &self,
        public_key: &str,
        network_address: &str,
        location: &str,
    ) -> Result<ValidatorRecord> {
        let conn = self.get_conn().await?;
        let record = ValidatorRecord {
            id: Uuid::new_v4(),
            public_key: public_key.to_string(),
            network_address: network_address.to_string(),
            location: location.to_string(),
            pending_payout_units: 0,
            created_at: std::time::SystemTime::now(),
        };

        conn.execute(
            "INSERT INTO validators (id, public_key, network_address, location, pending_payout_units, created_at)
             VALUES (?, ?, ?, ?, 0, ?)",
            params![
                record.id.to_string(),
                record.public_key.clone(),
                record.network_address.clone(),
                record.location.clone(),
                timestamp_to_i64(record.created_at)
            ],
        )
        .await?;

        Ok(record)
    }

    async fn find_active_targets(&self) -> Result<Vec<TargetRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query("SELECT id, url, disabled, created_at FROM targets WHERE disabled = 0", ())
            .await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            targets.push(target_from_row(&row)?);
        }
        Ok(targets)
    }

    async fn create_target(&self, url: &str) -> Result<TargetRecord> {
        let conn = self.get_conn().await?;
        let record = TargetRecord {
            id: Uuid::new_v4(),
            url: url.to_string(),
            disabled: false,
            created_at: std::time::SystemTime::now(),
        };

        conn.execute(
            "INSERT INTO targets (id, url, disabled, created_at) VALUES (?, ?, 0, ?)",
            params![record.id.to_string(), record.url.clone(), timestamp_to_i64(record.created_at)],
        )
        .await?;

        Ok(record)
    }

    async fn set_target_disabled(&self, id: Uuid, disabled: bool) -> Result<()> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE targets SET disabled = ? WHERE id = ?",
                params![if disabled { 1 } else { 0 }, id.to_string()],
            )
            .await?;

        if changed == 0 {
            return Err(anyhow!("no such target: {}", id));
        }
        Ok(())
    }

    async fn record_tick_and_increment_payout(&self, tick: &TickRecord, amount: i64) -> Result<()> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        tx.execute(
            "INSERT INTO ticks (id, target_id, validator_id, status, latency_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                tick.id.to_string(),
                tick.target_id.to_string(),
                tick.validator_id.to_string(),
                tick.status.to_string(),
                tick.latency_ms as i64,
                timestamp_to_i64(tick.created_at)
            ],
        )
        .await?;

        let changed = tx
            .execute(
                "UPDATE validators SET pending_payout_units = pending_payout_units + ? WHERE id = ?",
                params![amount, tick.validator_id.to_string()],
            )
            .await?;

        // An unknown validator must roll back the tick insert too; dropping
        // the transaction without commit does exactly that.
        if changed == 0 {
            tx.rollback().await?;
            return Err(anyhow!("payout update matched no validator: {}", tick.validator_id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recent_ticks(&self, target_id: Uuid, limit: usize) -> Result<Vec<TickRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, target_id, validator_id, status, latency_ms, created_at
                 FROM ticks WHERE target_id = ? ORDER BY created_at DESC LIMIT ?",
                params![target_id.to_string(), limit as i64],
            )
            .await?;

        let mut ticks = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let target: String = row.get(1)?;
            let validator: String = row.get(2)?;
            let status: String = row.get(3)?;
            let created_at: i64 = row.get(5)?;

            ticks.push(TickRecord {
                id: Uuid::parse_str(&id)?,
                target_id: Uuid::parse_str(&target)?,
                validator_id: Uuid::parse_str(&validator)?,
                status: status_from_str(&status)?,
                latency_ms: row.get::<i64>(4)? as u64,
                created_at: i64_to_timestamp(created_at),
            });
        }
        Ok(ticks)
    }
}
