//! Wire envelope exchanged between peers.
//!
//! ```text
//! { id, from, to, type, payload: base64(nonce || ciphertext),
//!   timestamp: ms, signature: hex(sha256(plaintext)) }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::PeerId;

/// Kind of message carried by an [`Envelope`].
///
/// The kind travels in clear and is bound into the AEAD associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A [`StateUpdate`](crate::sync::StateUpdate) for some session.
    GameSync,
    /// Session announcement with its participants.
    SessionCreated,
    /// A peer joined a session.
    ParticipantJoined,
    /// Complete session snapshot for a late joiner.
    FullStateSync,
    /// The session was ended by a participant.
    SessionEnded,
    /// A participant left or dropped.
    PlayerDisconnected,
    /// Session-level liveness.
    SyncHeartbeat,
    /// Channel-level liveness.
    Heartbeat,
}

impl MessageType {
    /// Wire name of the message type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GameSync => "game_sync",
            Self::SessionCreated => "session_created",
            Self::ParticipantJoined => "participant_joined",
            Self::FullStateSync => "full_state_sync",
            Self::SessionEnded => "session_ended",
            Self::PlayerDisconnected => "player_disconnected",
            Self::SyncHeartbeat => "sync_heartbeat",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encrypted, signed message addressed to one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message id.
    pub id: String,
    /// Sending peer.
    pub from: PeerId,
    /// Addressed peer.
    pub to: PeerId,
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Base64 of `nonce || ciphertext || tag`.
    pub payload: String,
    /// Sender's clock at sealing time, ms since epoch.
    pub timestamp: i64,
    /// Hex SHA-256 of the plaintext.
    pub signature: String,
}

impl Envelope {
    /// Allocate a fresh message id.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            id: Envelope::new_id(),
            from: PeerId::from("A"),
            to: PeerId::from("B"),
            kind: MessageType::FullStateSync,
            payload: "AAAA".into(),
            timestamp: 1_700_000_000_000,
            signature: "00".into(),
        }
    }

    #[test]
    fn test_type_field_uses_wire_names() {
        let json: serde_json::Value = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "full_state_sync");
        assert_eq!(json["from"], "A");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_as_str_matches_serde() {
        for kind in [
            MessageType::GameSync,
            MessageType::SessionCreated,
            MessageType::ParticipantJoined,
            MessageType::FullStateSync,
            MessageType::SessionEnded,
            MessageType::PlayerDisconnected,
            MessageType::SyncHeartbeat,
            MessageType::Heartbeat,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn test_bytes_roundtrip() {
        let envelope = sample();
        let decoded = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = r#"{"id":"1","from":"A","to":"B","type":"teleport","payload":"","timestamp":0,"signature":""}"#;
        assert!(Envelope::from_bytes(raw.as_bytes()).is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Envelope::new_id(), Envelope::new_id());
    }
}
