//! Transport adapter error types.

use std::io;

use thiserror::Error;

use crate::core::PeerId;

/// Errors raised by a [`Transport`](super::Transport) adapter.
///
/// The channel logs these and drops the envelope; nothing is retried.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No route to the addressed peer.
    #[error("no route to peer {0}")]
    UnknownPeer(PeerId),

    /// The peer's inbox or the socket has been closed.
    #[error("transport closed")]
    Closed,

    /// I/O error (socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Envelope could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Encoded envelope does not fit in a datagram.
    #[error("envelope too large: {size} bytes (max {max})")]
    TooLarge {
        /// Encoded size.
        size: usize,
        /// Adapter limit.
        max: usize,
    },
}
