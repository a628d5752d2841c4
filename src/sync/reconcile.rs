//! Conflict detection and resolution.
//!
//! Updates from different origins may share a sequence number, since each
//! origin numbers its own updates. All window entries with the same
//! sequence number form a *slot*; when an update lands in an occupied slot
//! the whole slot is re-resolved from the original updates and the state is
//! rebuilt from the checkpoint. The result depends only on the set of
//! updates in the slot, never on the order they arrived in, so every peer
//! converges once it has seen the same updates.
//!
//! Ranking is last-write-wins: later timestamp first, exact ties broken by
//! the lexicographically smaller origin.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::apply;
use super::log::{EntryStatus, LogEntry};
use super::{ConflictStrategy, StateUpdate, SyncSession};
use crate::core::UpdateError;

/// Result of reconciling one update into a session.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The update contributes to the state, in this (possibly transformed) form.
    Applied(StateUpdate),
    /// The update lost its conflict; `winner` holds the slot.
    Superseded {
        /// The highest-ranked update of the slot.
        winner: StateUpdate,
    },
    /// The same `(origin, sequence)` is already in the window.
    Duplicate,
}

impl ReconcileOutcome {
    /// The update subscribers should see, if any.
    pub fn visible(&self) -> Option<&StateUpdate> {
        match self {
            Self::Applied(update) => Some(update),
            Self::Superseded { winner } => Some(winner),
            Self::Duplicate => None,
        }
    }
}

/// Last-write-wins order: `Less` means `a` outranks `b`.
pub fn lww_order(a: &StateUpdate, b: &StateUpdate) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.origin_peer.cmp(&b.origin_peer))
}

impl SyncSession {
    /// Reconcile an update (local or remote) into the session.
    ///
    /// The update is recorded in the window unless it is a duplicate or its
    /// payload is malformed; malformed updates leave the session untouched.
    pub fn reconcile(
        &mut self,
        update: StateUpdate,
        now: i64,
    ) -> Result<ReconcileOutcome, UpdateError> {
        if self.log.contains(&update.origin_peer, update.sequence_number) {
            return Ok(ReconcileOutcome::Duplicate);
        }
        apply::validate(update.action, &update.payload)?;
        self.touch(now);

        let slot = self.log.slot(update.sequence_number);
        if slot.is_empty() {
            apply::apply(
                &mut self.state,
                &update.origin_peer,
                update.action,
                &update.payload,
            )?;
            self.log.push(LogEntry::active(update.clone(), now));
            return Ok(ReconcileOutcome::Applied(update));
        }

        let mut contenders: Vec<StateUpdate> = slot
            .iter()
            .filter_map(|&i| self.log.get(i))
            .map(|entry| entry.update.clone())
            .collect();
        contenders.push(update.clone());

        let (mut resolved, winner) = resolve(self.conflict_strategy, &contenders);
        let Some((status, effective)) = resolved.pop() else {
            return Err(UpdateError::ApplyFailed("empty conflict slot".into()));
        };
        for (&index, (status, effective)) in slot.iter().zip(resolved) {
            if let Some(entry) = self.log.get_mut(index) {
                entry.status = status;
                entry.effective = effective;
            }
        }
        self.log.push(LogEntry {
            update,
            effective: effective.clone(),
            status,
            recorded_at: now,
        });
        self.state = self.log.replay()?;

        Ok(match status {
            EntryStatus::Active => ReconcileOutcome::Applied(effective),
            EntryStatus::Superseded => ReconcileOutcome::Superseded { winner },
        })
    }
}

/// Resolve a slot. Returns, per contender and in input order, its status and
/// effective form, plus the top-ranked original.
fn resolve(
    strategy: ConflictStrategy,
    contenders: &[StateUpdate],
) -> (Vec<(EntryStatus, StateUpdate)>, StateUpdate) {
    let mut ranked: Vec<usize> = (0..contenders.len()).collect();
    ranked.sort_by(|&a, &b| lww_order(&contenders[a], &contenders[b]));

    let mut resolved: Vec<(EntryStatus, StateUpdate)> = contenders
        .iter()
        .map(|u| (EntryStatus::Superseded, u.clone()))
        .collect();
    let winner = contenders[ranked[0]].clone();

    let first_action = contenders[0].action;
    let transformable = strategy == ConflictStrategy::OperationalTransform
        && first_action.has_transform()
        && contenders.iter().all(|u| u.action == first_action);

    if transformable {
        let mut taken = Map::new();
        for &i in &ranked {
            let original = &contenders[i];
            let effective = original.with_payload(apply::strip_keys(&original.payload, &taken));
            if let Value::Object(fields) = &original.payload {
                taken.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            resolved[i] = (EntryStatus::Active, effective);
        }
    } else {
        resolved[ranked[0]].0 = EntryStatus::Active;
    }

    (resolved, winner)
}
