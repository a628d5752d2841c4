//! Protocol constants.
//!
//! Timing defaults can be overridden through [`EngineConfig`](crate::sync::EngineConfig)
//! and [`ChannelConfig`](crate::channel::ChannelConfig); the cryptographic sizes
//! are fixed by the wire format.

use std::time::Duration;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// XChaCha20 nonce size. A fresh random nonce is prepended to every ciphertext.
pub const AEAD_NONCE_SIZE: usize = 24;

/// Symmetric channel key size (XChaCha20).
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 private key size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// SHA-256 output size (envelope signature).
pub const SIGNATURE_SIZE: usize = 32;

/// BLAKE2s output size (update checksum).
pub const CHECKSUM_SIZE: usize = 32;

/// HKDF info label for keys derived by X25519 agreement.
pub const KEY_AGREEMENT_LABEL: &[u8] = b"lansync v1 channel key";

// =============================================================================
// TIMING CONSTANTS - SECURE CHANNEL
// =============================================================================

/// Interval between heartbeats sent to every connected peer.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A connection with no authenticated inbound traffic for this long is
/// marked disconnected.
pub const CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// =============================================================================
// TIMING CONSTANTS - SYNC ENGINE
// =============================================================================

/// Retention horizon of the per-session conflict-detection window.
pub const PENDING_RETENTION: Duration = Duration::from_secs(5 * 60);

/// A session with no activity for this long is torn down by maintenance.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Interval of the maintenance loop (window purge + session heartbeats).
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the engine/connection event broadcast channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Maximum datagram accepted by the UDP adapter.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
