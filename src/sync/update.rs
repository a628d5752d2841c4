//! State updates and the closed set of actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::{PeerId, SessionId, UpdateError};
use crate::crypto;

/// Kind of change an update makes to the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Shallow-merge `data` into `state.players[origin]`.
    PlayerMove,
    /// Append `data` to `state.events`.
    GameEvent,
    /// Set `state.scores[origin] = data.score`.
    ScoreUpdate,
    /// Shallow-merge `data` into the whole state.
    GameState,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 4] = [
        Action::PlayerMove,
        Action::GameEvent,
        Action::ScoreUpdate,
        Action::GameState,
    ];

    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlayerMove => "player_move",
            Self::GameEvent => "game_event",
            Self::ScoreUpdate => "score_update",
            Self::GameState => "game_state",
        }
    }

    /// Whether conflicting updates of this action can be merged field by field.
    pub fn has_transform(self) -> bool {
        matches!(self, Self::PlayerMove | Self::GameState)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UpdateError::UnknownAction(s.to_string()))
    }
}

/// An immutable, stamped change to one session's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Unique update id.
    pub id: String,
    /// Target session.
    pub session_id: SessionId,
    /// Peer that proposed the update.
    pub origin_peer: PeerId,
    /// What the update does.
    pub action: Action,
    /// Action data.
    pub payload: Value,
    /// Position in the origin's per-session sequence (1-based).
    pub sequence_number: u64,
    /// Origin's wall clock at creation (ms).
    pub timestamp: i64,
    /// BLAKE2s of `(action, payload)`.
    pub checksum: String,
}

impl StateUpdate {
    /// Build and checksum a new update.
    pub fn new(
        session_id: SessionId,
        origin_peer: PeerId,
        action: Action,
        payload: Value,
        sequence_number: u64,
        timestamp: i64,
    ) -> Self {
        let checksum = Self::compute_checksum(action, &payload);
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            origin_peer,
            action,
            payload,
            sequence_number,
            timestamp,
            checksum,
        }
    }

    /// Checksum over the canonical JSON of `(action, payload)`.
    ///
    /// Object keys serialize in sorted order, so equal payloads hash equally
    /// on every peer.
    pub fn compute_checksum(action: Action, payload: &Value) -> String {
        let canonical = serde_json::json!([action.as_str(), payload]).to_string();
        crypto::checksum(canonical.as_bytes())
    }

    /// Check the carried checksum against the content.
    pub fn verify_checksum(&self) -> Result<(), UpdateError> {
        if Self::compute_checksum(self.action, &self.payload) == self.checksum {
            Ok(())
        } else {
            Err(UpdateError::ChecksumMismatch {
                id: self.id.clone(),
            })
        }
    }

    /// The same update carrying a different payload.
    ///
    /// Used for the transformed form of an update; identity, ordering and
    /// timing fields are kept.
    pub fn with_payload(&self, payload: Value) -> Self {
        Self {
            checksum: Self::compute_checksum(self.action, &payload),
            payload,
            ..self.clone()
        }
    }

    /// `(origin_peer, sequence_number)`, unique within a session.
    pub fn key(&self) -> (&PeerId, u64) {
        (&self.origin_peer, self.sequence_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(payload: Value) -> StateUpdate {
        StateUpdate::new(
            SessionId::from("s1"),
            PeerId::from("A"),
            Action::PlayerMove,
            payload,
            1,
            100,
        )
    }

    #[test]
    fn test_action_names() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
            assert_eq!(serde_json::to_value(action).unwrap(), action.as_str());
        }
        assert_eq!(
            "fly".parse::<Action>(),
            Err(UpdateError::UnknownAction("fly".into()))
        );
    }

    #[test]
    fn test_transformable_actions() {
        assert!(Action::PlayerMove.has_transform());
        assert!(Action::GameState.has_transform());
        assert!(!Action::GameEvent.has_transform());
        assert!(!Action::ScoreUpdate.has_transform());
    }

    #[test]
    fn test_checksum_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        assert_eq!(
            StateUpdate::compute_checksum(Action::PlayerMove, &a),
            StateUpdate::compute_checksum(Action::PlayerMove, &b)
        );
        assert_ne!(
            StateUpdate::compute_checksum(Action::PlayerMove, &a),
            StateUpdate::compute_checksum(Action::GameState, &a)
        );
    }

    #[test]
    fn test_verify_checksum() {
        let mut u = update(json!({"x": 1}));
        assert!(u.verify_checksum().is_ok());

        u.payload = json!({"x": 2});
        assert!(matches!(
            u.verify_checksum(),
            Err(UpdateError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_with_payload_keeps_identity() {
        let u = update(json!({"x": 1, "y": 2}));
        let t = u.with_payload(json!({"y": 2}));
        assert_eq!(t.id, u.id);
        assert_eq!(t.key(), u.key());
        assert!(t.verify_checksum().is_ok());
        assert_ne!(t.checksum, u.checksum);
    }

    #[test]
    fn test_wire_field_names() {
        let u = update(json!({"x": 1}));
        let json = serde_json::to_value(&u).unwrap();
        assert_eq!(json["origin_peer"], "A");
        assert_eq!(json["action"], "player_move");
        assert_eq!(json["sequence_number"], 1);

        let back: StateUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(back, u);
    }
}
