//! Error types for the sync engine and secure channel.

use thiserror::Error;

use super::types::{PeerId, SessionId};

/// Errors in the secure channel layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Key generation or agreement failed; the connection is marked failed.
    #[error("channel setup failed: {0}")]
    SetupFailed(String),

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptFailed,

    /// AEAD decryption failed (bad encoding, invalid tag or corrupted).
    #[error("AEAD decryption failed")]
    DecryptFailed,

    /// Recomputed plaintext signature does not match the transmitted one.
    #[error("signature mismatch - possible tampering")]
    SignatureMismatch,

    /// The peer has a connection record but it is not connected.
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),

    /// No connection (and thus no key) exists for the peer.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// The envelope is addressed to another peer.
    #[error("envelope addressed to {to}, not to this peer")]
    Misdirected {
        /// Addressee named in the envelope.
        to: PeerId,
    },

    /// Message (de)serialization failed.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Errors about session bookkeeping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session with this id exists on this peer.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// A session with this id already exists.
    #[error("session {0} already exists")]
    AlreadyExists(SessionId),

    /// The peer is not a participant of the session.
    #[error("peer {peer} is not a participant of session {session}")]
    PeerNotParticipant {
        /// Session id.
        session: SessionId,
        /// Offending peer.
        peer: PeerId,
    },
}

/// Errors raised while building or applying an update.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Action kind outside the closed set.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Payload is malformed for the action.
    #[error("apply failed: {0}")]
    ApplyFailed(String),

    /// Content checksum does not match the payload.
    #[error("checksum mismatch for update {id}")]
    ChecksumMismatch {
        /// Update id.
        id: String,
    },

    /// Update claims an origin other than the peer that sent it.
    #[error("update from {sender} claims origin {origin}")]
    OriginMismatch {
        /// Authenticated sender.
        sender: PeerId,
        /// Claimed origin.
        origin: PeerId,
    },
}

/// A connection was idle beyond the configured timeout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("connection to {peer} timed out after {idle_ms} ms idle")]
pub struct ConnectionTimeout {
    /// Peer whose connection went idle.
    pub peer: PeerId,
    /// How long the connection had been idle.
    pub idle_ms: i64,
}

/// Top-level errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Secure channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Update error.
    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    /// Connection timeout.
    #[error(transparent)]
    Timeout(#[from] ConnectionTimeout),
}

/// Result alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;
