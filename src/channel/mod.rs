//! Secure channel layer.
//!
//! - [`SecureChannel`]: per-peer keys, seal/open of [`Envelope`](crate::transport::Envelope)s,
//!   idle sweep and heartbeats
//! - [`SecureConnection`]: the per-peer record and its [`ConnectionPhase`]
//! - [`SecureChannel::spawn_heartbeat`]: the periodic liveness task

mod connection;
mod heartbeat;
mod secure;

pub use connection::{ConnectionPhase, SecureConnection};
pub use secure::{ChannelConfig, ChannelMessage, ConnectionEvent, SecureChannel};
