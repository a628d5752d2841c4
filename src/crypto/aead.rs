//! XChaCha20-Poly1305 AEAD with random nonces.
//!
//! Every call draws a fresh 24-byte nonce from the OS RNG; the extended nonce
//! makes random nonces safe without a per-link counter. Sealed output is:
//!
//! ```text
//! [ nonce (24) | ciphertext (n) | tag (16) ]
//! ```
//!
//! The AAD binds the envelope header (`from`, `to`, message type) so a
//! ciphertext cannot be replayed under a different header.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::core::{ChannelError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE};

use super::SymmetricKey;

/// Construct AAD for an envelope.
///
/// Each field is length-prefixed (u32 big-endian), so no two distinct
/// headers share an encoding:
///
/// ```text
/// len(from) || from || len(to) || to || len(type) || type
/// ```
pub fn construct_aad(from: &str, to: &str, message_type: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(from.len() + to.len() + message_type.len() + 12);
    put_field(&mut aad, from.as_bytes());
    put_field(&mut aad, to.as_bytes());
    put_field(&mut aad, message_type.as_bytes());
    aad
}

/// Append `field` to `buf` behind its u32 big-endian length.
pub(crate) fn put_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u32).to_be_bytes());
    buf.extend_from_slice(field);
}

/// Encrypt `plaintext`, returning `nonce || ciphertext || tag`.
pub fn seal(key: &SymmetricKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|_| ChannelError::EncryptFailed)?;

    let mut sealed = Vec::with_capacity(AEAD_NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt the output of [`seal`].
pub fn open(key: &SymmetricKey, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, ChannelError> {
    if sealed.len() < AEAD_NONCE_SIZE + AEAD_TAG_SIZE {
        return Err(ChannelError::DecryptFailed);
    }
    let (nonce, ciphertext) = sealed.split_at(AEAD_NONCE_SIZE);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| ChannelError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SYMMETRIC_KEY_SIZE;
    use proptest::prelude::*;

    fn key() -> SymmetricKey {
        SymmetricKey::from_bytes([0x42; SYMMETRIC_KEY_SIZE])
    }

    #[test]
    fn test_aad_construction() {
        let aad = construct_aad("A", "B", "game_sync");
        assert_eq!(aad, b"\0\0\0\x01A\0\0\0\x01B\0\0\0\x09game_sync");
    }

    #[test]
    fn test_aad_fields_cannot_shift() {
        // With plain separators both headers would read "A\0B\0\0C\0t".
        assert_ne!(construct_aad("A\0B", "\0C", "t"), construct_aad("A", "B\0\0C", "t"));
        assert_ne!(construct_aad("AB", "C", "t"), construct_aad("A", "BC", "t"));
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let aad = construct_aad("A", "B", "heartbeat");
        let plaintext = b"Hello, LAN!";

        let sealed = seal(&key(), &aad, plaintext).unwrap();
        assert_eq!(sealed.len(), AEAD_NONCE_SIZE + plaintext.len() + AEAD_TAG_SIZE);

        let opened = open(&key(), &aad, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let a = seal(&key(), b"", b"same").unwrap();
        let b = seal(&key(), b"", b"same").unwrap();
        assert_ne!(a[..AEAD_NONCE_SIZE], b[..AEAD_NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_wrong_key_fails() {
        let other = SymmetricKey::from_bytes([0x43; SYMMETRIC_KEY_SIZE]);
        let sealed = seal(&key(), b"", b"secret").unwrap();
        assert_eq!(open(&other, b"", &sealed), Err(ChannelError::DecryptFailed));
    }

    #[test]
    fn test_open_wrong_aad_fails() {
        let sealed = seal(&key(), &construct_aad("A", "B", "game_sync"), b"secret").unwrap();
        let result = open(&key(), &construct_aad("A", "B", "heartbeat"), &sealed);
        assert_eq!(result, Err(ChannelError::DecryptFailed));
    }

    #[test]
    fn test_open_truncated_fails() {
        assert_eq!(open(&key(), b"", &[0u8; 10]), Err(ChannelError::DecryptFailed));
    }

    #[test]
    fn test_empty_plaintext() {
        let sealed = seal(&key(), b"", b"").unwrap();
        assert_eq!(sealed.len(), AEAD_NONCE_SIZE + AEAD_TAG_SIZE);
        assert!(open(&key(), b"", &sealed).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_size(plaintext in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let sealed = seal(&key(), b"aad", &plaintext).unwrap();
            prop_assert_eq!(open(&key(), b"aad", &sealed).unwrap(), plaintext);
        }

        #[test]
        fn prop_any_bit_flip_is_rejected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..256),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut sealed = seal(&key(), b"aad", &plaintext).unwrap();
            let i = index.index(sealed.len());
            sealed[i] ^= 1 << bit;
            prop_assert_eq!(open(&key(), b"aad", &sealed), Err(ChannelError::DecryptFailed));
        }
    }
}
