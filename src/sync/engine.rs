//! Sync engine
//!
//! Coordinates session state between peers. Every update, local or remote,
//! goes through the same reconciliation path, so all peers that have seen
//! the same updates hold the same state.
//!
//! Outbound messages for a session are queued while its mutex is held;
//! together with the channel's per-peer FIFO this keeps each origin's
//! updates in sequence order on the wire.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::apply;
use super::config::EngineConfig;
use super::events::{EndReason, EngineEvent};
use super::listeners::{ListenerRegistry, SubscriptionId};
use super::message::{
    MembershipChange, SessionAnnouncement, SessionNotice, StateSnapshot, SyncMessage,
};
use super::reconcile::ReconcileOutcome;
use super::registry::SessionRegistry;
use super::{Action, ConflictStrategy, StateUpdate, SyncSession};
use crate::channel::SecureChannel;
use crate::core::{
    PeerId, SessionError, SessionId, SyncError, SyncResult, TaskHandle, UpdateError,
    PUBLIC_KEY_SIZE,
};
use crate::transport::{Envelope, MessageType, Transport};

/// Result of processing one inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    /// A state update was reconciled.
    Update(ReconcileOutcome),
    /// A session control message was handled.
    Control(MessageType),
    /// A channel heartbeat; only the connection was refreshed.
    Heartbeat,
    /// The message names a session this peer does not know; dropped.
    UnknownSession(SessionId),
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Updates folded out of conflict windows.
    pub purged: usize,
    /// Session heartbeats queued.
    pub heartbeats: usize,
    /// Sessions torn down for inactivity.
    pub expired: Vec<SessionId>,
}

/// State synchronization engine for one local peer.
pub struct SyncEngine<T: Transport> {
    local: PeerId,
    channel: Arc<SecureChannel<T>>,
    config: EngineConfig,
    sessions: SessionRegistry,
    listeners: ListenerRegistry,
    events: broadcast::Sender<EngineEvent>,
}

impl<T: Transport> SyncEngine<T> {
    /// Create an engine on top of a secure channel.
    pub fn new(channel: Arc<SecureChannel<T>>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            local: channel.local_peer().clone(),
            channel,
            config,
            sessions: SessionRegistry::new(),
            listeners: ListenerRegistry::new(),
            events,
        }
    }

    /// Local peer id.
    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// The underlying channel.
    pub fn channel(&self) -> &Arc<SecureChannel<T>> {
        &self.channel
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to engine lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn now(&self) -> i64 {
        self.channel.clock().now_millis()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Open a placeholder link to a peer (local random key, no agreement).
    pub fn establish_connection(&self, peer: impl Into<PeerId>) -> SyncResult<()> {
        self.channel.establish(peer)?;
        Ok(())
    }

    /// Open a link keyed by X25519 agreement with the peer's public key.
    pub fn establish_authenticated_connection(
        &self,
        peer: impl Into<PeerId>,
        remote_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> SyncResult<()> {
        self.channel.establish_authenticated(peer, remote_public)?;
        Ok(())
    }

    /// Send an arbitrary message over the secure channel.
    pub fn send_message<M: Serialize + ?Sized>(
        &self,
        peer: &PeerId,
        kind: MessageType,
        message: &M,
    ) -> SyncResult<bool> {
        Ok(self.channel.send(peer, kind, message)?)
    }

    fn broadcast(&self, recipients: &[PeerId], message: &SyncMessage) -> usize {
        let kind = message.kind();
        let mut sent = 0;
        for peer in recipients {
            match self.channel.send(peer, kind, message) {
                Ok(true) => sent += 1,
                Ok(false) => debug!(peer = %peer, %kind, "peer not connected, skipped"),
                Err(e) => warn!(peer = %peer, %kind, error = %e, "broadcast failed"),
            }
        }
        sent
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Create a session with the configured conflict strategy and announce it.
    pub fn create_session(
        &self,
        session_id: impl Into<SessionId>,
        participants: impl IntoIterator<Item = PeerId>,
    ) -> SyncResult<SyncSession> {
        self.create_session_with_strategy(session_id, participants, self.config.conflict_strategy)
    }

    /// Create a session with an explicit conflict strategy and announce it.
    pub fn create_session_with_strategy(
        &self,
        session_id: impl Into<SessionId>,
        participants: impl IntoIterator<Item = PeerId>,
        strategy: ConflictStrategy,
    ) -> SyncResult<SyncSession> {
        let session_id = session_id.into();
        let mut session = SyncSession::new(session_id.clone(), participants, strategy, self.now());
        session.add_participant(self.local.clone());

        let handle = self.sessions.insert(session)?;
        let session = handle.lock();
        let announcement = SyncMessage::SessionCreated(SessionAnnouncement {
            session_id: session_id.clone(),
            participants: session.participants.iter().cloned().collect(),
            conflict_strategy: strategy,
        });
        let sent = self.broadcast(&session.others(&self.local), &announcement);

        info!(
            session = %session_id,
            participants = session.participants.len(),
            announced = sent,
            "session created"
        );
        Ok(session.clone())
    }

    /// Add a peer to a session.
    ///
    /// Existing members learn about the peer through `participant_joined`;
    /// the peer itself receives the session announcement. No state is
    /// transferred; follow up with [`synchronize_full_state`](Self::synchronize_full_state).
    pub fn join_session(&self, session_id: &SessionId, peer: impl Into<PeerId>) -> SyncResult<()> {
        let peer = peer.into();
        let handle = self.sessions.require(session_id)?;
        let mut session = handle.lock();

        let existing: Vec<PeerId> = session
            .others(&self.local)
            .into_iter()
            .filter(|p| *p != peer)
            .collect();
        let added = session.add_participant(peer.clone());
        session.touch(self.now());

        self.broadcast(
            &existing,
            &SyncMessage::ParticipantJoined(MembershipChange {
                session_id: session_id.clone(),
                peer_id: peer.clone(),
            }),
        );
        if peer != self.local {
            self.broadcast(
                std::slice::from_ref(&peer),
                &SyncMessage::SessionCreated(SessionAnnouncement {
                    session_id: session_id.clone(),
                    participants: session.participants.iter().cloned().collect(),
                    conflict_strategy: session.conflict_strategy,
                }),
            );
        }
        drop(session);

        if added {
            info!(session = %session_id, peer = %peer, "participant joined");
        }
        Ok(())
    }

    /// Apply an update named by its wire action.
    ///
    /// Unknown actions fail with [`UpdateError::UnknownAction`].
    pub fn apply_update(
        &self,
        session_id: &SessionId,
        action: &str,
        data: Value,
    ) -> SyncResult<StateUpdate> {
        let action = action.parse::<Action>().inspect_err(|e| {
            warn!(session = %session_id, error = %e, "rejected local update");
        })?;
        self.apply_action(session_id, action, data)
    }

    /// Stamp, apply and broadcast a local update.
    ///
    /// Window entries past the retention horizon are folded away first, so
    /// they no longer take part in conflicts. The update is reconciled
    /// locally before anything is sent; broadcast
    /// failures are logged and never roll the local state back. Returns the
    /// stamped update.
    pub fn apply_action(
        &self,
        session_id: &SessionId,
        action: Action,
        data: Value,
    ) -> SyncResult<StateUpdate> {
        apply::validate(action, &data)?;
        let handle = self.sessions.require(session_id)?;

        let (update, outcome) = {
            let mut session = handle.lock();
            let now = self.now();
            session.purge(now, self.config.retention);
            let sequence = session.next_sequence();
            let update = StateUpdate::new(
                session_id.clone(),
                self.local.clone(),
                action,
                data,
                sequence,
                now,
            );
            let outcome = session.reconcile(update.clone(), now)?;
            let sent = self.broadcast(
                &session.others(&self.local),
                &SyncMessage::Update(update.clone()),
            );
            debug!(session = %session_id, %action, sequence, sent, "local update applied");
            (update, outcome)
        };

        if let Some(visible) = outcome.visible() {
            self.listeners.notify(session_id, visible);
        }
        Ok(update)
    }

    /// Register a callback for every update applied to a session.
    pub fn subscribe<F>(&self, session_id: &SessionId, listener: F) -> SubscriptionId
    where
        F: Fn(&StateUpdate) + Send + Sync + 'static,
    {
        self.listeners.subscribe(session_id, Arc::new(listener))
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Current state of a session.
    pub fn get_state(&self, session_id: &SessionId) -> Option<Value> {
        self.sessions
            .get(session_id)
            .map(|handle| handle.lock().state.clone())
    }

    /// Snapshot of a whole session.
    pub fn session(&self, session_id: &SessionId) -> Option<SyncSession> {
        self.sessions
            .get(session_id)
            .map(|handle| handle.lock().clone())
    }

    /// Ids of every known session.
    pub fn sessions(&self) -> Vec<SessionId> {
        self.sessions.ids()
    }

    /// Sessions with activity within the idle timeout.
    pub fn active_sessions(&self) -> Vec<SessionId> {
        let now = self.now();
        let timeout = self.config.session_idle_timeout;
        let mut active: Vec<SessionId> = self
            .sessions
            .handles()
            .into_iter()
            .filter_map(|handle| {
                let session = handle.lock();
                session
                    .is_active(now, timeout)
                    .then(|| session.session_id.clone())
            })
            .collect();
        active.sort();
        active
    }

    /// Send the complete session state to one peer.
    ///
    /// Returns whether the snapshot was queued.
    pub fn synchronize_full_state(
        &self,
        session_id: &SessionId,
        target: &PeerId,
    ) -> SyncResult<bool> {
        let handle = self.sessions.require(session_id)?;
        let session = handle.lock();
        let snapshot = SyncMessage::FullState(StateSnapshot {
            session_id: session_id.clone(),
            state: session.state.clone(),
            sequence_counter: session.sequence_counter,
            participants: session.participants.iter().cloned().collect(),
            conflict_strategy: session.conflict_strategy,
        });
        let sent = self.broadcast(std::slice::from_ref(target), &snapshot) == 1;
        info!(session = %session_id, peer = %target, sent, "full state sent");
        Ok(sent)
    }

    /// Notify participants and tear the session down.
    ///
    /// Returns whether the session existed.
    pub fn end_session(&self, session_id: &SessionId) -> bool {
        let Some(handle) = self.sessions.get(session_id) else {
            return false;
        };
        {
            let session = handle.lock();
            self.broadcast(
                &session.others(&self.local),
                &SyncMessage::SessionEnded(SessionNotice {
                    session_id: session_id.clone(),
                    timestamp: self.now(),
                }),
            );
        }
        self.teardown(session_id, EndReason::Local)
    }

    /// Remove a peer that dropped out of a session.
    ///
    /// When nobody else is left the session is torn down; otherwise the
    /// remaining participants are told with `player_disconnected`.
    pub fn handle_peer_disconnection(
        &self,
        session_id: &SessionId,
        peer: &PeerId,
    ) -> SyncResult<()> {
        let handle = self.sessions.require(session_id)?;
        let (removed, remaining) = {
            let mut session = handle.lock();
            let removed = session.remove_participant(peer);
            session.touch(self.now());
            let remaining = session.others(&self.local);
            if removed && !remaining.is_empty() {
                self.broadcast(
                    &remaining,
                    &SyncMessage::PlayerDisconnected(MembershipChange {
                        session_id: session_id.clone(),
                        peer_id: peer.clone(),
                    }),
                );
            }
            (removed, remaining)
        };

        if removed {
            info!(session = %session_id, peer = %peer, "participant disconnected");
            self.emit(EngineEvent::PeerDisconnected {
                session: session_id.clone(),
                peer: peer.clone(),
            });
        }
        if remaining.is_empty() {
            self.teardown(session_id, EndReason::Abandoned);
        }
        Ok(())
    }

    fn teardown(&self, session_id: &SessionId, reason: EndReason) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        let listeners = self.listeners.remove_session(session_id);
        if removed {
            info!(session = %session_id, ?reason, listeners, "session ended");
            self.emit(EngineEvent::SessionEnded {
                session: session_id.clone(),
                reason,
            });
        }
        removed
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Open, verify and process one inbound envelope.
    ///
    /// Errors mean the message was dropped without touching any state.
    pub fn handle_envelope(&self, envelope: &Envelope) -> SyncResult<ProcessResult> {
        let message = self.channel.receive(envelope)?;
        let Some(sync) = SyncMessage::decode(&message)? else {
            return Ok(ProcessResult::Heartbeat);
        };
        self.handle_message(&message.from, sync)
    }

    /// Process envelopes until the inbox closes.
    ///
    /// Rejected messages are logged and dropped.
    pub async fn pump(&self, mut inbox: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = inbox.recv().await {
            match self.handle_envelope(&envelope) {
                Ok(ProcessResult::UnknownSession(session)) => {
                    debug!(from = %envelope.from, session = %session, "message for unknown session dropped");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(from = %envelope.from, kind = %envelope.kind, error = %e, "dropping message");
                }
            }
        }
    }

    /// Spawn [`pump`](Self::pump) on the runtime.
    pub fn spawn_pump(self: &Arc<Self>, inbox: mpsc::UnboundedReceiver<Envelope>) -> TaskHandle {
        let engine = Arc::clone(self);
        TaskHandle::new(tokio::spawn(async move { engine.pump(inbox).await }))
    }

    fn handle_message(&self, from: &PeerId, message: SyncMessage) -> SyncResult<ProcessResult> {
        let kind = message.kind();
        let session_id = message.session_id().clone();
        let handled = match message {
            SyncMessage::Update(update) => return self.receive_update(from, update),
            SyncMessage::SessionCreated(announcement) => {
                self.on_session_created(from, announcement)?;
                true
            }
            SyncMessage::ParticipantJoined(change) => self.on_participant_joined(from, change)?,
            SyncMessage::FullState(snapshot) => {
                self.on_full_state(from, snapshot)?;
                true
            }
            SyncMessage::SessionEnded(notice) => self.on_session_ended(from, notice)?,
            SyncMessage::PlayerDisconnected(change) => self.on_player_disconnected(from, change)?,
            SyncMessage::Heartbeat(notice) => self.on_sync_heartbeat(from, notice)?,
        };
        Ok(if handled {
            ProcessResult::Control(kind)
        } else {
            ProcessResult::UnknownSession(session_id)
        })
    }

    fn receive_update(&self, from: &PeerId, update: StateUpdate) -> SyncResult<ProcessResult> {
        if update.origin_peer != *from {
            return Err(UpdateError::OriginMismatch {
                sender: from.clone(),
                origin: update.origin_peer,
            }
            .into());
        }
        update.verify_checksum()?;

        let session_id = update.session_id.clone();
        let Some(handle) = self.sessions.get(&session_id) else {
            return Ok(ProcessResult::UnknownSession(session_id));
        };

        let outcome = {
            let mut session = handle.lock();
            self.require_participant(&session, from)?;
            let now = self.now();
            session.purge(now, self.config.retention);
            session.reconcile(update, now)?
        };

        match &outcome {
            ReconcileOutcome::Applied(update) => {
                debug!(session = %session_id, from = %from, sequence = update.sequence_number, "remote update applied");
            }
            ReconcileOutcome::Superseded { winner } => {
                info!(session = %session_id, from = %from, winner = %winner.origin_peer, "conflict resolved against remote update");
            }
            ReconcileOutcome::Duplicate => {
                debug!(session = %session_id, from = %from, "duplicate update ignored");
            }
        }

        if let Some(visible) = outcome.visible() {
            self.listeners.notify(&session_id, visible);
        }
        Ok(ProcessResult::Update(outcome))
    }

    fn require_participant(&self, session: &SyncSession, peer: &PeerId) -> Result<(), SyncError> {
        if session.is_participant(peer) {
            Ok(())
        } else {
            Err(SessionError::PeerNotParticipant {
                session: session.session_id.clone(),
                peer: peer.clone(),
            }
            .into())
        }
    }

    fn on_session_created(
        &self,
        from: &PeerId,
        announcement: SessionAnnouncement,
    ) -> SyncResult<()> {
        let now = self.now();
        let session_id = announcement.session_id;
        let mut participants = announcement.participants;
        participants.push(from.clone());
        participants.push(self.local.clone());

        let (handle, created) = self.sessions.get_or_insert_with(&session_id, || {
            SyncSession::new(
                session_id.clone(),
                participants.iter().cloned(),
                announcement.conflict_strategy,
                now,
            )
        });

        if created {
            info!(session = %session_id, by = %from, "joined session announced by peer");
            self.emit(EngineEvent::SessionCreated {
                session: session_id,
                by: from.clone(),
            });
            return Ok(());
        }

        let mut session = handle.lock();
        self.require_participant(&session, from)?;
        for peer in participants {
            session.add_participant(peer);
        }
        session.touch(now);
        Ok(())
    }

    fn on_participant_joined(&self, from: &PeerId, change: MembershipChange) -> SyncResult<bool> {
        let Some(handle) = self.sessions.get(&change.session_id) else {
            return Ok(false);
        };
        let added = {
            let mut session = handle.lock();
            self.require_participant(&session, from)?;
            session.touch(self.now());
            session.add_participant(change.peer_id.clone())
        };
        if added {
            info!(session = %change.session_id, peer = %change.peer_id, "participant joined");
            self.emit(EngineEvent::ParticipantJoined {
                session: change.session_id,
                peer: change.peer_id,
            });
        }
        Ok(true)
    }

    fn on_full_state(&self, from: &PeerId, snapshot: StateSnapshot) -> SyncResult<()> {
        let now = self.now();
        let session_id = snapshot.session_id;
        let mut participants = snapshot.participants;
        participants.push(from.clone());
        participants.push(self.local.clone());

        let (handle, created) = self.sessions.get_or_insert_with(&session_id, || {
            SyncSession::new(
                session_id.clone(),
                participants.iter().cloned(),
                snapshot.conflict_strategy,
                now,
            )
        });
        {
            let mut session = handle.lock();
            if !created {
                self.require_participant(&session, from)?;
            }
            for peer in participants {
                session.add_participant(peer);
            }
            session.replace_state(snapshot.state, now);
        }

        info!(session = %session_id, from = %from, "state synchronized");
        self.emit(EngineEvent::StateSynchronized {
            session: session_id,
            from: from.clone(),
        });
        Ok(())
    }

    fn on_session_ended(&self, from: &PeerId, notice: SessionNotice) -> SyncResult<bool> {
        let Some(handle) = self.sessions.get(&notice.session_id) else {
            return Ok(false);
        };
        self.require_participant(&handle.lock(), from)?;
        self.teardown(&notice.session_id, EndReason::Remote(from.clone()));
        Ok(true)
    }

    fn on_player_disconnected(&self, from: &PeerId, change: MembershipChange) -> SyncResult<bool> {
        let Some(handle) = self.sessions.get(&change.session_id) else {
            return Ok(false);
        };
        let (removed, alone) = {
            let mut session = handle.lock();
            self.require_participant(&session, from)?;
            let removed = session.remove_participant(&change.peer_id);
            session.touch(self.now());
            (removed, session.others(&self.local).is_empty())
        };

        if removed {
            info!(session = %change.session_id, peer = %change.peer_id, "participant left");
            self.emit(EngineEvent::PeerDisconnected {
                session: change.session_id.clone(),
                peer: change.peer_id,
            });
        }
        if alone {
            self.teardown(&change.session_id, EndReason::Abandoned);
        }
        Ok(true)
    }

    fn on_sync_heartbeat(&self, from: &PeerId, notice: SessionNotice) -> SyncResult<bool> {
        let Some(handle) = self.sessions.get(&notice.session_id) else {
            return Ok(false);
        };
        let mut session = handle.lock();
        self.require_participant(&session, from)?;
        session.touch(self.now());
        Ok(true)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// One maintenance pass.
    ///
    /// Folds expired window entries into each session's checkpoint, tears
    /// down sessions idle past the timeout and sends a `sync_heartbeat` for
    /// every other session.
    pub fn tick(&self) -> MaintenanceReport {
        let now = self.now();
        let mut report = MaintenanceReport::default();

        for handle in self.sessions.handles() {
            let mut session = handle.lock();
            report.purged += session.purge(now, self.config.retention);

            if !session.is_active(now, self.config.session_idle_timeout) {
                report.expired.push(session.session_id.clone());
                continue;
            }
            report.heartbeats += self.broadcast(
                &session.others(&self.local),
                &SyncMessage::Heartbeat(SessionNotice {
                    session_id: session.session_id.clone(),
                    timestamp: now,
                }),
            );
        }

        for session_id in &report.expired {
            self.teardown(session_id, EndReason::Idle);
        }
        report
    }

    /// Spawn the periodic maintenance loop.
    pub fn spawn_maintenance(self: &Arc<Self>) -> TaskHandle {
        let engine = Arc::downgrade(self);
        let period = self.config.maintenance_interval;

        TaskHandle::new(tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let report = engine.tick();
                if report.purged > 0 || !report.expired.is_empty() {
                    debug!(
                        purged = report.purged,
                        expired = report.expired.len(),
                        "maintenance tick"
                    );
                }
            }
        }))
    }
}
