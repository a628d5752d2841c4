//! Engine lifecycle events for the application layer.

use crate::core::{PeerId, SessionId};

/// Something happened to a session that was not caused by a local call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A peer announced a session that includes us.
    SessionCreated {
        /// Session id.
        session: SessionId,
        /// Announcing peer.
        by: PeerId,
    },
    /// A participant was added to a session.
    ParticipantJoined {
        /// Session id.
        session: SessionId,
        /// New participant.
        peer: PeerId,
    },
    /// The session state was replaced by a full-state sync.
    StateSynchronized {
        /// Session id.
        session: SessionId,
        /// Peer that sent the snapshot.
        from: PeerId,
    },
    /// The session was torn down locally.
    SessionEnded {
        /// Session id.
        session: SessionId,
        /// Why it ended.
        reason: EndReason,
    },
    /// A participant left the session.
    PeerDisconnected {
        /// Session id.
        session: SessionId,
        /// Peer that left.
        peer: PeerId,
    },
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// `end_session` was called locally.
    Local,
    /// A participant ended it.
    Remote(PeerId),
    /// Every other participant left.
    Abandoned,
    /// No activity within the idle timeout.
    Idle,
}
