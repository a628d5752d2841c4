//! Cryptographic primitives for the secure channel:
//! - XChaCha20-Poly1305 AEAD with random, prepended nonces
//! - SHA-256 plaintext signatures and BLAKE2s update checksums
//! - Symmetric link keys and X25519 key agreement

mod aead;
mod keys;
mod signature;

pub use aead::{construct_aad, open, seal};
pub use keys::{StaticKeypair, SymmetricKey};
pub use signature::{checksum, sign, verify};
