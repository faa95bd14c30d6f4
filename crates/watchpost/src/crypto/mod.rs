//! Cryptographic operations for the Watchpost protocol.
//!
//! Ed25519 keypairs identify validators; every signup and every validation
//! reply carries a detached signature over a canonical message string.

pub mod keys;
pub mod signing;
pub mod verification;

pub use keys::{generate_keypair, load_keypair, load_or_generate_keypair, save_keypair, KeyPair};
pub use signing::{sign_bytes, sign_message};
pub use verification::verify_message;
