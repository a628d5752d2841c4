//! Per-session retention window of applied updates.
//!
//! The log keeps every update recorded within the retention horizon, local
//! and remote, together with the form in which it currently contributes to
//! the state. Everything older has been folded into the checkpoint, so the
//! session state can always be rebuilt as
//!
//! ```text
//! state = checkpoint ⊕ effective(active entries, arrival order)
//! ```

use std::collections::VecDeque;

use serde_json::Value;
use tracing::warn;

use super::{apply, StateUpdate};
use crate::core::{PeerId, UpdateError};

/// Whether an entry contributes to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Its effective form is part of the state.
    Active,
    /// It lost a conflict and is retracted.
    Superseded,
}

/// One recorded update.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// The update as proposed by its origin.
    pub update: StateUpdate,
    /// The form applied to the state (transformed under OT).
    pub effective: StateUpdate,
    /// Current status.
    pub status: EntryStatus,
    /// Local time the entry was recorded (ms).
    pub recorded_at: i64,
}

impl LogEntry {
    /// An active entry applied as proposed.
    pub fn active(update: StateUpdate, recorded_at: i64) -> Self {
        Self {
            effective: update.clone(),
            update,
            status: EntryStatus::Active,
            recorded_at,
        }
    }

    /// Whether the entry contributes to the state.
    pub fn is_active(&self) -> bool {
        self.status == EntryStatus::Active
    }
}

/// Checkpoint plus the retention window.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateLog {
    checkpoint: Value,
    entries: VecDeque<LogEntry>,
}

impl UpdateLog {
    /// Start a log from a checkpoint state.
    pub fn new(checkpoint: Value) -> Self {
        Self {
            checkpoint,
            entries: VecDeque::new(),
        }
    }

    /// Whether `(origin, sequence)` is in the window.
    pub fn contains(&self, origin: &PeerId, sequence: u64) -> bool {
        self.entries
            .iter()
            .any(|e| e.update.sequence_number == sequence && &e.update.origin_peer == origin)
    }

    /// Indices of entries sharing a sequence number, in arrival order.
    pub fn slot(&self, sequence: u64) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.update.sequence_number == sequence)
            .map(|(i, _)| i)
            .collect()
    }

    /// Entry by index.
    pub fn get(&self, index: usize) -> Option<&LogEntry> {
        self.entries.get(index)
    }

    /// Mutable entry by index.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut LogEntry> {
        self.entries.get_mut(index)
    }

    /// Record an entry at the end of the window.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
    }

    /// Entries in arrival order.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of entries in the window.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The folded state of everything purged so far.
    pub fn checkpoint(&self) -> &Value {
        &self.checkpoint
    }

    /// Rebuild the state from the checkpoint and the active entries.
    pub fn replay(&self) -> Result<Value, UpdateError> {
        let mut state = self.checkpoint.clone();
        for entry in self.entries.iter().filter(|e| e.is_active()) {
            let u = &entry.effective;
            apply::apply(&mut state, &u.origin_peer, u.action, &u.payload)?;
        }
        Ok(state)
    }

    /// Fold every entry recorded before `horizon` into the checkpoint.
    ///
    /// Returns how many entries left the window. Entries are recorded in
    /// local time order, so only a prefix is ever purged.
    pub fn purge(&mut self, horizon: i64) -> usize {
        let mut purged = 0;
        while self
            .entries
            .front()
            .is_some_and(|e| e.recorded_at < horizon)
        {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            purged += 1;
            if entry.is_active() {
                let u = &entry.effective;
                if let Err(e) = apply::apply(&mut self.checkpoint, &u.origin_peer, u.action, &u.payload)
                {
                    warn!(update = %u.id, error = %e, "skipping malformed entry at purge");
                }
            }
        }
        purged
    }

    /// Drop the window and restart from a new checkpoint.
    pub fn reset(&mut self, checkpoint: Value) {
        self.checkpoint = checkpoint;
        self.entries.clear();
    }
}
