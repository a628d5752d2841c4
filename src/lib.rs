//! # lansync
//!
//! Peer-to-peer game-state synchronization for clients on a local network.
//!
//! Every peer runs a [`SyncEngine`](sync::SyncEngine) on top of a
//! [`SecureChannel`](channel::SecureChannel). There is no central authority:
//! each peer applies its own updates immediately, broadcasts them to the other
//! participants over encrypted links, and reconciles what it receives so that
//! all peers converge on the same state.
//!
//! - **Security**: XChaCha20-Poly1305 per link, SHA-256 content signatures,
//!   optional X25519 key agreement
//! - **Convergence**: conflicting updates resolve the same way in any arrival
//!   order (last-write-wins or field-level transform)
//! - **Late joiners**: full-state transfer
//! - **Transport-agnostic**: in-memory hub for tests, UDP datagrams on a LAN
//!
//! ## Feature Flags
//!
//! - `udp` (default): [`UdpTransport`](transport::UdpTransport) adapter
//!
//! ## Modules
//!
//! - [`core`]: ids, constants, errors and the clock seam
//! - [`crypto`]: AEAD, signatures, checksums, keys
//! - [`transport`]: envelope and transport adapters
//! - [`channel`]: per-peer secure links
//! - [`sync`]: sessions, updates, reconciliation, the engine
//! - [`logging`]: subscriber setup
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use lansync::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), SyncError> {
//! let hub = MemoryHub::new();
//! let (transport, _inbox) = hub.attach("alice");
//! let channel = Arc::new(SecureChannel::new("alice", transport));
//! let engine = SyncEngine::new(channel, EngineConfig::default());
//!
//! let lobby = SessionId::from("lobby");
//! engine.create_session(lobby.clone(), [PeerId::from("bob")])?;
//! engine.apply_update(&lobby, "player_move", json!({ "x": 1 }))?;
//!
//! assert_eq!(
//!     engine.get_state(&lobby),
//!     Some(json!({ "players": { "alice": { "x": 1 } } }))
//! );
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod channel;
pub mod core;
pub mod crypto;
pub mod logging;
pub mod sync;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::channel::{
        ChannelConfig, ChannelMessage, ConnectionEvent, ConnectionPhase, SecureChannel,
    };
    pub use crate::crypto::{StaticKeypair, SymmetricKey};
    pub use crate::sync::{
        Action, ConflictStrategy, EndReason, EngineConfig, EngineConfigBuilder, EngineEvent,
        MaintenanceReport, ProcessResult, ReconcileOutcome, StateUpdate, SubscriptionId,
        SyncEngine, SyncSession,
    };
    #[cfg(feature = "udp")]
    pub use crate::transport::UdpTransport;
    pub use crate::transport::{Envelope, MemoryHub, MemoryTransport, MessageType, Transport};
}

// Re-export commonly used items at crate root
pub use core::{PeerId, SessionId, SyncError, SyncResult};
pub use sync::{StateUpdate, SyncEngine};
