//! Content hashes.
//!
//! Two independent digests:
//! - the envelope **signature**, SHA-256 over the plaintext, hex encoded;
//!   recomputed after decryption to detect tampering;
//! - the update **checksum**, BLAKE2s over the canonical JSON of an update's
//!   `(action, payload)`, carried inside the update itself.

use blake2::Blake2s256;
use sha2::{Digest, Sha256};

/// Compute the hex SHA-256 signature of a plaintext.
pub fn sign(plaintext: &[u8]) -> String {
    hex::encode(Sha256::digest(plaintext))
}

/// Check a signature against a plaintext.
pub fn verify(signature: &str, plaintext: &[u8]) -> bool {
    let expected = sign(plaintext);
    // Constant-time comparison over equal-length hex strings.
    expected.len() == signature.len()
        && expected
            .bytes()
            .zip(signature.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Compute the hex BLAKE2s checksum of arbitrary content.
pub fn checksum(content: &[u8]) -> String {
    hex::encode(Blake2s256::digest(content))
}
