//! Ed25519 signing operations.
//!
//! Byte-level and canonical-string signing. The canonical signup and reply
//! strings themselves are built in [`crate::wire`] so signer and verifier
//! share one construction.

use super::keys::KeyPair;
use ed25519_dalek::Signer;

/// Sign raw bytes with a keypair. Returns 64-byte Ed25519 signature.
pub fn sign_bytes(data: &[u8], keypair: &KeyPair) -> Vec<u8> {
    let signature = keypair.signing_key.sign(data);
    signature.to_bytes().to_vec()
}

/// Sign a canonical message string, returning the hex-encoded detached
/// signature as it travels on the wire.
pub fn sign_message(message: &str, keypair: &KeyPair) -> String {
    hex::encode(sign_bytes(message.as_bytes(), keypair))
}
