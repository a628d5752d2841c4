//! Session state owned by the engine.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::apply::empty_object;
use super::log::UpdateLog;
use crate::core::{PeerId, SessionId};

/// How concurrent updates sharing a sequence number are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Later timestamp wins; ties go to the smaller origin id.
    #[default]
    LastWriteWins,
    /// Merge field-disjoint parts of same-action updates, else last write wins.
    OperationalTransform,
}

/// One synchronization session.
///
/// `state` only changes through reconciliation or a full-state sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSession {
    /// Session id.
    pub session_id: SessionId,
    /// Peers taking part, the local peer included.
    pub participants: BTreeSet<PeerId>,
    /// Shared state (a JSON object).
    pub state: Value,
    /// Last local activity on the session (ms).
    pub last_update_time: i64,
    /// Last sequence number allocated locally.
    pub sequence_counter: u64,
    /// Conflict strategy.
    pub conflict_strategy: ConflictStrategy,
    pub(crate) log: UpdateLog,
}

impl SyncSession {
    /// Create an empty session.
    pub fn new(
        session_id: SessionId,
        participants: impl IntoIterator<Item = PeerId>,
        conflict_strategy: ConflictStrategy,
        now: i64,
    ) -> Self {
        Self {
            session_id,
            participants: participants.into_iter().collect(),
            state: empty_object(),
            last_update_time: now,
            sequence_counter: 0,
            conflict_strategy,
            log: UpdateLog::new(empty_object()),
        }
    }

    /// Allocate the next local sequence number.
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence_counter += 1;
        self.sequence_counter
    }

    /// Whether `peer` takes part in the session.
    pub fn is_participant(&self, peer: &PeerId) -> bool {
        self.participants.contains(peer)
    }

    /// Add a participant. Returns whether it was new.
    pub fn add_participant(&mut self, peer: PeerId) -> bool {
        self.participants.insert(peer)
    }

    /// Remove a participant. Returns whether it was present.
    pub fn remove_participant(&mut self, peer: &PeerId) -> bool {
        self.participants.remove(peer)
    }

    /// Participants other than `local`.
    pub fn others(&self, local: &PeerId) -> Vec<PeerId> {
        self.participants
            .iter()
            .filter(|p| *p != local)
            .cloned()
            .collect()
    }

    /// Record activity.
    pub fn touch(&mut self, now: i64) {
        self.last_update_time = self.last_update_time.max(now);
    }

    /// Whether the session saw activity within `timeout`.
    pub fn is_active(&self, now: i64, timeout: Duration) -> bool {
        now.saturating_sub(self.last_update_time) <= timeout.as_millis() as i64
    }

    /// Replace the state wholesale and restart the conflict window from it.
    ///
    /// The local sequence counter is left alone: it numbers this peer's own
    /// updates and must keep increasing.
    pub fn replace_state(&mut self, state: Value, now: i64) {
        self.log.reset(state.clone());
        self.state = state;
        self.touch(now);
    }

    /// Fold entries recorded more than `retention` ago into the checkpoint.
    pub fn purge(&mut self, now: i64, retention: Duration) -> usize {
        self.log.purge(now.saturating_sub(retention.as_millis() as i64))
    }

    /// Number of updates in the conflict window.
    pub fn window_len(&self) -> usize {
        self.log.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> SyncSession {
        SyncSession::new(
            SessionId::from("s1"),
            [PeerId::from("A"), PeerId::from("B")],
            ConflictStrategy::default(),
            1_000,
        )
    }

    #[test]
    fn test_new_session() {
        let s = session();
        assert_eq!(s.sequence_counter, 0);
        assert_eq!(s.state, json!({}));
        assert_eq!(s.conflict_strategy, ConflictStrategy::LastWriteWins);
        assert!(s.is_participant(&PeerId::from("B")));
    }

    #[test]
    fn test_sequence_has_no_gaps() {
        let mut s = session();
        let seqs: Vec<u64> = (0..5).map(|_| s.next_sequence()).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_others_excludes_local() {
        let mut s = session();
        s.add_participant(PeerId::from("C"));
        assert_eq!(
            s.others(&PeerId::from("A")),
            vec![PeerId::from("B"), PeerId::from("C")]
        );
        assert!(s.remove_participant(&PeerId::from("C")));
        assert!(!s.remove_participant(&PeerId::from("C")));
    }

    #[test]
    fn test_replace_state_keeps_counter() {
        let mut s = session();
        s.next_sequence();
        s.next_sequence();
        s.replace_state(json!({"round": 2}), 2_000);
        assert_eq!(s.sequence_counter, 2);
        assert_eq!(s.state, json!({"round": 2}));
        assert_eq!(s.window_len(), 0);
        assert_eq!(s.last_update_time, 2_000);
    }

    #[test]
    fn test_activity_window() {
        let mut s = session();
        let timeout = Duration::from_secs(300);
        assert!(s.is_active(301_000, timeout));
        assert!(!s.is_active(301_001, timeout));
        s.touch(500);
        assert_eq!(s.last_update_time, 1_000);
    }

    #[test]
    fn test_strategy_wire_names() {
        assert_eq!(
            serde_json::to_value(ConflictStrategy::OperationalTransform).unwrap(),
            "operational_transform"
        );
        assert_eq!(
            serde_json::to_value(ConflictStrategy::LastWriteWins).unwrap(),
            "last_write_wins"
        );
    }
}
