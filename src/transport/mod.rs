//! Transport adapters.
//!
//! The secure channel hands sealed [`Envelope`]s to a [`Transport`]; how they
//! reach the peer is the adapter's business.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Sync Engine                  │
//! ├─────────────────────────────────────────┤
//! │          Secure Channel                 │
//! ├─────────────────────────────────────────┤
//! │        Transport Adapter                │  ← This module
//! │   envelope, memory hub, UDP             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Inbound envelopes are not pulled through the trait: each adapter exposes
//! its own receive side (an mpsc inbox for [`MemoryHub`], a socket reader for
//! [`UdpTransport`]) and the application feeds them to the engine.

use std::future::Future;

mod envelope;
mod error;
mod memory;
#[cfg(feature = "udp")]
mod socket;

pub use envelope::{Envelope, MessageType};
pub use error::TransportError;
pub use memory::{MemoryHub, MemoryTransport};
#[cfg(feature = "udp")]
pub use socket::UdpTransport;

/// Outbound half of a byte transport between peers.
///
/// Delivery is best-effort; the channel never retries.
pub trait Transport: Send + Sync + 'static {
    /// Deliver one envelope to `envelope.to`.
    fn send(&self, envelope: Envelope) -> impl Future<Output = Result<(), TransportError>> + Send;
}
