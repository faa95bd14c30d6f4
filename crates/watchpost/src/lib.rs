//! Watchpost - hub/validator uptime check coordination for Watchpost
//!
//! This library provides the shared protocol pieces for the hub and its
//! validator agents: wire message types, canonical signing strings, Ed25519
//! key management and verification, callback correlation, and the HTTP
//! probe primitive.

pub mod callbacks;
pub mod crypto;
pub mod probe;
pub mod wire;

// Re-export main types
pub use callbacks::CallbackMap;
pub use crypto::keys::{generate_keypair, load_or_generate_keypair, KeyPair};
pub use probe::{ProbeOutcome, Prober};
pub use wire::{HubFrame, SignupAck, SignupRequest, TickStatus, ValidateReply, ValidateRequest, ValidatorFrame};

/// Re-export common error types
pub use anyhow;

/// Watchpost result type using anyhow for error handling
pub type Result<T> = anyhow::Result<T>;

/// The version of the Watchpost protocol
pub const PROTOCOL_VERSION: &str = "1.0";

/// Payout units credited per verified validation reply.
pub const DEFAULT_PAYOUT_PER_CHECK: i64 = 100;
