//! Ed25519 signature verification.
//!
//! Verification never errors: malformed hex, wrong-length keys or
//! signatures, and decode failures all report `false`. The hub drops
//! unverifiable messages without responding, so there is no caller that
//! could do anything useful with a distinction between "forged" and
//! "garbled".

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Verify a hex-encoded detached Ed25519 signature over a canonical
/// message string against a hex-encoded public key.
pub fn verify_message(message: &str, public_key_hex: &str, signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_arr) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_arr) else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_arr) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_arr);

    verifying_key.verify(message.as_bytes(), &signature).is_ok()
}
