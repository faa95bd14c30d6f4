//! Wire protocol for hub/validator traffic.
//!
//! Every frame is one JSON-encoded envelope `{type, data}` carried in one
//! WebSocket text message. Field names follow the wire's camelCase
//! convention. The canonical signing strings live here too so signer and
//! verifier can never drift apart.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one health check as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TickStatus {
    Up,
    Down,
}

impl std::fmt::Display for TickStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickStatus::Up => write!(f, "UP"),
            TickStatus::Down => write!(f, "DOWN"),
        }
    }
}

/// Signup request: a validator proving ownership of its public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub callback_id: Uuid,
    pub network_address: String,
    /// Hex-encoded 32-byte Ed25519 public key
    pub public_key: String,
    /// Hex-encoded detached signature over [`signup_message`]
    pub signature: String,
}

/// Signup acknowledgement carrying the assigned/confirmed validator id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupAck {
    pub validator_id: Uuid,
    pub callback_id: Uuid,
}

/// One health-check task dispatched to a validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub url: String,
    pub callback_id: Uuid,
    pub target_id: Uuid,
}

/// A validator's signed reply to one dispatched check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReply {
    pub callback_id: Uuid,
    pub status: TickStatus,
    pub latency_ms: u64,
    pub target_id: Uuid,
    /// Absent when the validator has not completed signup yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator_id: Option<Uuid>,
    /// Hex-encoded detached signature over [`reply_message`]
    pub signature: String,
}

/// Frames received by the hub (validator → hub).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum HubFrame {
    Signup(SignupRequest),
    Validate(ValidateReply),
}

/// Frames received by a validator (hub → validator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ValidatorFrame {
    Signup(SignupAck),
    Validate(ValidateRequest),
}

/// Canonical string signed during signup. Must match byte-for-byte on
/// both sides; `public_key` is the hex form as it appears on the wire.
pub fn signup_message(callback_id: Uuid, public_key: &str) -> String {
    format!("Signed message for {}, {}", callback_id, public_key)
}

/// Canonical string signed on every validation reply.
pub fn reply_message(callback_id: Uuid) -> String {
    format!("Replying to {}", callback_id)
}
