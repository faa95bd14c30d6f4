use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use watchpost::wire::TickStatus;

/// A validator as the hub knows it durably. Created on first successful
/// signup, never deleted; `pending_payout_units` is mutated only by the
/// hub on verified replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub id: Uuid,
    /// Hex-encoded 32-byte Ed25519 public key, unique per validator
    pub public_key: String,
    pub network_address: String,
    pub location: String,
    pub pending_payout_units: i64,
    pub created_at: SystemTime,
}

/// A monitored target. Read-only to the protocol core; only non-disabled
/// targets are dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: Uuid,
    pub url: String,
    pub disabled: bool,
    pub created_at: SystemTime,
}

/// One persisted health-check outcome. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickRecord {
    pub id: Uuid,
    pub target_id: Uuid,
    pub validator_id: Uuid,
    pub status: TickStatus,
    pub latency_ms: u64,
    pub created_at: SystemTime,
}

impl TickRecord {
    pub fn new(target_id: Uuid, validator_id: Uuid, status: TickStatus, latency_ms: u64) -> Self {
        Self {
            id: Uuid::now_v7(),
            target_id,
            validator_id,
            status,
            latency_ms,
            created_at: SystemTime::now(),
        }
    }
}

/// Convert SystemTime to Unix timestamp for storage
pub fn timestamp_to_i64(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Convert Unix timestamp back to SystemTime
pub fn i64_to_timestamp(timestamp: i64) -> SystemTime {
    UNIX_EPOCH + std::time::Duration::from_secs(timestamp.max(0) as u64)
}
