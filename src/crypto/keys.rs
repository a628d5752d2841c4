//! Channel keys and X25519 key agreement.
//!
//! A [`SymmetricKey`] protects one peer link. It either comes from
//! [`SymmetricKey::generate`] (local only, no exchange), from an out-of-band
//! source, or from [`StaticKeypair::agree`], which runs X25519 against the
//! peer's static public key and expands the shared secret with HKDF-SHA256.

use std::fmt;

use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use super::aead::put_field;
use crate::core::{
    ChannelError, PeerId, KEY_AGREEMENT_LABEL, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE,
    SYMMETRIC_KEY_SIZE,
};

/// A symmetric AEAD key for one peer link.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    key: [u8; SYMMETRIC_KEY_SIZE],
}

impl SymmetricKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; SYMMETRIC_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// A static X25519 keypair identifying the local peer.
///
/// The private key is zeroized on drop.
#[derive(Clone)]
pub struct StaticKeypair {
    private: [u8; PRIVATE_KEY_SIZE],
    public: [u8; PUBLIC_KEY_SIZE],
}

impl StaticKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            private: secret.to_bytes(),
            public: public.to_bytes(),
        }
    }

    /// Rebuild a keypair from a stored private key; the public half is derived.
    pub fn from_private_bytes(private: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);
        Self {
            private,
            public: public.to_bytes(),
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public
    }

    /// Compute the static DH shared secret with a remote public key.
    pub fn diffie_hellman(&self, remote_public: &[u8; PUBLIC_KEY_SIZE]) -> [u8; 32] {
        let secret = StaticSecret::from(self.private);
        let public = PublicKey::from(*remote_public);
        *secret.diffie_hellman(&public).as_bytes()
    }

    /// Derive the link key shared with `remote`.
    ///
    /// ```text
    /// key = HKDF-SHA256(
    ///     ikm  = DH(local_static, remote_static),
    ///     info = "lansync v1 channel key" || len(min(id)) || min(id)
    ///                                     || len(max(id)) || max(id),
    /// )
    /// ```
    ///
    /// Both ends sort the peer ids, so they derive the same key.
    pub fn agree(
        &self,
        local: &PeerId,
        remote: &PeerId,
        remote_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> Result<SymmetricKey, ChannelError> {
        let mut shared = self.diffie_hellman(remote_public);
        if shared.iter().all(|b| *b == 0) {
            return Err(ChannelError::SetupFailed(
                "low-order remote public key".into(),
            ));
        }

        let (first, second) = if local <= remote {
            (local, remote)
        } else {
            (remote, local)
        };
        let mut info = Vec::with_capacity(
            KEY_AGREEMENT_LABEL.len() + first.as_str().len() + second.as_str().len() + 8,
        );
        info.extend_from_slice(KEY_AGREEMENT_LABEL);
        put_field(&mut info, first.as_str().as_bytes());
        put_field(&mut info, second.as_str().as_bytes());

        let hk = Hkdf::<Sha256>::new(None, &shared);
        let mut key = [0u8; SYMMETRIC_KEY_SIZE];
        let expanded = hk.expand(&info, &mut key);
        shared.zeroize();
        expanded.map_err(|_| ChannelError::SetupFailed("key derivation failed".into()))?;

        Ok(SymmetricKey::from_bytes(key))
    }
}

impl Drop for StaticKeypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl fmt::Debug for StaticKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeypair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_keys_are_random() {
        let k1 = SymmetricKey::generate();
        let k2 = SymmetricKey::generate();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_keypair_generation() {
        let kp1 = StaticKeypair::generate();
        let kp2 = StaticKeypair::generate();
        assert_ne!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_from_private_bytes_derives_same_public() {
        let kp = StaticKeypair::generate();
        let restored = StaticKeypair::from_private_bytes(kp.private);
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn test_agreement_is_symmetric() {
        let alice = StaticKeypair::generate();
        let bob = StaticKeypair::generate();
        let a = PeerId::from("alice");
        let b = PeerId::from("bob");

        let ka = alice.agree(&a, &b, bob.public_key()).unwrap();
        let kb = bob.agree(&b, &a, alice.public_key()).unwrap();
        assert_eq!(ka.as_bytes(), kb.as_bytes());
    }

    #[test]
    fn test_agreement_binds_peer_ids() {
        let alice = StaticKeypair::generate();
        let bob = StaticKeypair::generate();
        let a = PeerId::from("alice");
        let b = PeerId::from("bob");
        let c = PeerId::from("carol");

        let kab = alice.agree(&a, &b, bob.public_key()).unwrap();
        let kac = alice.agree(&a, &c, bob.public_key()).unwrap();
        assert_ne!(kab.as_bytes(), kac.as_bytes());
    }

    #[test]
    fn test_agreement_ids_do_not_run_together() {
        let alice = StaticKeypair::generate();
        let bob = StaticKeypair::generate();

        let k1 = alice
            .agree(&PeerId::from("a\0b"), &PeerId::from("c"), bob.public_key())
            .unwrap();
        let k2 = alice
            .agree(&PeerId::from("a"), &PeerId::from("b\0c"), bob.public_key())
            .unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_agreement_rejects_zero_public_key() {
        let alice = StaticKeypair::generate();
        let result = alice.agree(&PeerId::from("a"), &PeerId::from("b"), &[0u8; 32]);
        assert!(matches!(result, Err(ChannelError::SetupFailed(_))));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = SymmetricKey::from_bytes([0xAB; SYMMETRIC_KEY_SIZE]);
        assert_eq!(format!("{key:?}"), "SymmetricKey(..)");
    }
}
