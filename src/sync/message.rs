//! Bodies of the engine's messages.
//!
//! The envelope's [`MessageType`] says which body follows, so bodies are
//! serialized bare (no tag).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Action, ConflictStrategy, StateUpdate};
use crate::channel::ChannelMessage;
use crate::core::{ChannelError, PeerId, SessionId, SyncError};
use crate::transport::MessageType;

/// Announces a session and its participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnnouncement {
    /// Session id.
    pub session_id: SessionId,
    /// Every participant, the announcer included.
    pub participants: Vec<PeerId>,
    /// Strategy all participants must use.
    pub conflict_strategy: ConflictStrategy,
}

/// A participant joined or left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipChange {
    /// Session id.
    pub session_id: SessionId,
    /// The peer concerned.
    pub peer_id: PeerId,
}

/// Complete session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Session id.
    pub session_id: SessionId,
    /// Whole state.
    pub state: Value,
    /// Sender's sequence counter, informational.
    pub sequence_counter: u64,
    /// Sender's participant set.
    pub participants: Vec<PeerId>,
    /// Sender's conflict strategy.
    pub conflict_strategy: ConflictStrategy,
}

/// A message that names only its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionNotice {
    /// Session id.
    pub session_id: SessionId,
    /// Sender's clock (ms).
    pub timestamp: i64,
}

/// Every engine-level message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SyncMessage {
    /// `game_sync`
    Update(StateUpdate),
    /// `session_created`
    SessionCreated(SessionAnnouncement),
    /// `participant_joined`
    ParticipantJoined(MembershipChange),
    /// `full_state_sync`
    FullState(StateSnapshot),
    /// `session_ended`
    SessionEnded(SessionNotice),
    /// `player_disconnected`
    PlayerDisconnected(MembershipChange),
    /// `sync_heartbeat`
    Heartbeat(SessionNotice),
}

impl SyncMessage {
    /// Envelope type carrying this message.
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Update(_) => MessageType::GameSync,
            Self::SessionCreated(_) => MessageType::SessionCreated,
            Self::ParticipantJoined(_) => MessageType::ParticipantJoined,
            Self::FullState(_) => MessageType::FullStateSync,
            Self::SessionEnded(_) => MessageType::SessionEnded,
            Self::PlayerDisconnected(_) => MessageType::PlayerDisconnected,
            Self::Heartbeat(_) => MessageType::SyncHeartbeat,
        }
    }

    /// Session the message concerns.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Update(u) => &u.session_id,
            Self::SessionCreated(a) => &a.session_id,
            Self::ParticipantJoined(m) | Self::PlayerDisconnected(m) => &m.session_id,
            Self::FullState(s) => &s.session_id,
            Self::SessionEnded(n) | Self::Heartbeat(n) => &n.session_id,
        }
    }

    /// Decode a verified channel message.
    ///
    /// Channel heartbeats carry no engine message and yield `None`.
    pub fn decode(message: &ChannelMessage) -> Result<Option<Self>, SyncError> {
        let decoded = match message.kind {
            MessageType::Heartbeat => return Ok(None),
            MessageType::GameSync => {
                let raw: Value = message.decode()?;
                if let Some(action) = raw.get("action").and_then(Value::as_str) {
                    action.parse::<Action>()?;
                }
                Self::Update(from_value(raw)?)
            }
            MessageType::SessionCreated => Self::SessionCreated(message.decode()?),
            MessageType::ParticipantJoined => Self::ParticipantJoined(message.decode()?),
            MessageType::FullStateSync => Self::FullState(message.decode()?),
            MessageType::SessionEnded => Self::SessionEnded(message.decode()?),
            MessageType::PlayerDisconnected => Self::PlayerDisconnected(message.decode()?),
            MessageType::SyncHeartbeat => Self::Heartbeat(message.decode()?),
        };
        Ok(Some(decoded))
    }
}

fn from_value<M: serde::de::DeserializeOwned>(raw: Value) -> Result<M, ChannelError> {
    serde_json::from_value(raw).map_err(|e| ChannelError::Encoding(e.to_string()))
}
