//! The secure channel: one encrypted link per peer.
//!
//! Sending never blocks on the network. [`SecureChannel::send`] seals the
//! message and pushes it onto the peer's outbound queue; a writer task per
//! peer drains that queue into the [`Transport`]. A slow peer only delays
//! itself, and envelopes to one peer leave in the order they were sent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::connection::{ConnectionPhase, SecureConnection};
use crate::core::{
    ChannelError, Clock, ConnectionTimeout, PeerId, SystemClock, CONNECTION_IDLE_TIMEOUT,
    EVENT_CHANNEL_CAPACITY, HEARTBEAT_INTERVAL, PUBLIC_KEY_SIZE,
};
use crate::crypto::{self, StaticKeypair, SymmetricKey};
use crate::transport::{Envelope, MessageType, Transport};

/// Secure channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Interval between heartbeats to every connected peer.
    pub heartbeat_interval: Duration,
    /// Idle time after which a connection is marked disconnected.
    pub idle_timeout: Duration,
    /// Capacity of the connection event channel.
    pub event_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            idle_timeout: CONNECTION_IDLE_TIMEOUT,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A link key was installed.
    Established {
        /// Remote peer.
        peer: PeerId,
    },
    /// The link was closed locally.
    Disconnected {
        /// Remote peer.
        peer: PeerId,
    },
    /// The link went idle past the timeout.
    TimedOut(ConnectionTimeout),
    /// Key setup failed.
    Failed {
        /// Remote peer.
        peer: PeerId,
        /// Failure description.
        reason: String,
    },
}

/// A decrypted, verified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Envelope id.
    pub id: String,
    /// Authenticated sender.
    pub from: PeerId,
    /// Message kind.
    pub kind: MessageType,
    /// Sender's timestamp (ms).
    pub timestamp: i64,
    /// JSON plaintext.
    pub body: Vec<u8>,
}

impl ChannelMessage {
    /// Deserialize the plaintext body.
    pub fn decode<M: DeserializeOwned>(&self) -> Result<M, ChannelError> {
        serde_json::from_slice(&self.body).map_err(|e| ChannelError::Encoding(e.to_string()))
    }
}

/// Per-peer encrypted links over a [`Transport`].
pub struct SecureChannel<T: Transport> {
    local: PeerId,
    identity: StaticKeypair,
    transport: Arc<T>,
    config: ChannelConfig,
    clock: Arc<dyn Clock>,
    connections: RwLock<HashMap<PeerId, Arc<Mutex<SecureConnection>>>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl<T: Transport> SecureChannel<T> {
    /// Create a channel with a fresh identity, default config and the system clock.
    pub fn new(local: impl Into<PeerId>, transport: T) -> Self {
        let config = ChannelConfig::default();
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            local: local.into(),
            identity: StaticKeypair::generate(),
            transport: Arc::new(transport),
            config,
            clock: Arc::new(SystemClock),
            connections: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        self.events = events;
        self.config = config;
        self
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the static identity used by [`establish_authenticated`](Self::establish_authenticated).
    pub fn with_identity(mut self, identity: StaticKeypair) -> Self {
        self.identity = identity;
        self
    }

    /// Local peer id.
    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// Local static public key, for exchange through discovery.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.identity.public_key()
    }

    /// The channel's clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The channel's configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Subscribe to connection lifecycle events.
    pub fn subscribe_connections(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Establishment
    // =========================================================================

    /// Open a link with a locally generated random key.
    ///
    /// # Security
    /// Placeholder only. No key agreement takes place, so the remote end
    /// cannot decrypt this link unless the same key reaches it through
    /// [`establish_with_key`](Self::establish_with_key). Use
    /// [`establish_authenticated`](Self::establish_authenticated) for real links.
    pub fn establish(&self, peer: impl Into<PeerId>) -> Result<(), ChannelError> {
        self.install(peer.into(), Ok(SymmetricKey::generate()))
    }

    /// Open a link with a key obtained out of band.
    pub fn establish_with_key(
        &self,
        peer: impl Into<PeerId>,
        key: SymmetricKey,
    ) -> Result<(), ChannelError> {
        self.install(peer.into(), Ok(key))
    }

    /// Open a link keyed by X25519 agreement with the peer's static public key.
    ///
    /// Both ends derive the same key without exchanging messages.
    pub fn establish_authenticated(
        &self,
        peer: impl Into<PeerId>,
        remote_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> Result<(), ChannelError> {
        let peer = peer.into();
        let key = self.identity.agree(&self.local, &peer, remote_public);
        self.install(peer, key)
    }

    fn install(
        &self,
        peer: PeerId,
        key: Result<SymmetricKey, ChannelError>,
    ) -> Result<(), ChannelError> {
        let now = self.clock.now_millis();
        let record = self.record_or_insert(&peer, now);
        let mut conn = record.lock();
        conn.begin(now);

        let setup = key.and_then(|key| {
            let runtime = Handle::try_current()
                .map_err(|e| ChannelError::SetupFailed(format!("no async runtime: {e}")))?;
            Ok((key, runtime))
        });
        let (key, runtime) = match setup {
            Ok(setup) => setup,
            Err(e) => {
                conn.fail();
                warn!(peer = %peer, error = %e, "connection setup failed");
                let _ = self.events.send(ConnectionEvent::Failed {
                    peer,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(write_loop(Arc::clone(&self.transport), peer.clone(), rx));
        conn.connect(key, tx, now);
        drop(conn);

        info!(peer = %peer, "secure connection established");
        let _ = self.events.send(ConnectionEvent::Established { peer });
        Ok(())
    }

    // =========================================================================
    // Traffic
    // =========================================================================

    /// Seal `message` for `peer` and queue it.
    ///
    /// Returns `Ok(false)` when there is no connected link to the peer.
    pub fn send<M: Serialize + ?Sized>(
        &self,
        peer: &PeerId,
        kind: MessageType,
        message: &M,
    ) -> Result<bool, ChannelError> {
        let Some(record) = self.record(peer) else {
            debug!(peer = %peer, %kind, "send skipped: no connection");
            return Ok(false);
        };
        let (key, outbound) = {
            let conn = record.lock();
            match (conn.key(), conn.outbound()) {
                (Some(key), Some(outbound)) => (key.clone(), outbound.clone()),
                _ => {
                    debug!(peer = %peer, %kind, phase = %conn.phase, "send skipped: not connected");
                    return Ok(false);
                }
            }
        };

        let plaintext =
            serde_json::to_vec(message).map_err(|e| ChannelError::Encoding(e.to_string()))?;
        let aad = crypto::construct_aad(self.local.as_str(), peer.as_str(), kind.as_str());
        let sealed = crypto::seal(&key, &aad, &plaintext)?;

        let envelope = Envelope {
            id: Envelope::new_id(),
            from: self.local.clone(),
            to: peer.clone(),
            kind,
            payload: STANDARD.encode(sealed),
            timestamp: self.clock.now_millis(),
            signature: crypto::sign(&plaintext),
        };
        Ok(outbound.send(envelope).is_ok())
    }

    /// Open and verify an inbound envelope.
    ///
    /// Only a connected link accepts traffic. Success refreshes the link's
    /// activity; failures leave the connection untouched.
    pub fn receive(&self, envelope: &Envelope) -> Result<ChannelMessage, ChannelError> {
        if envelope.to != self.local {
            return Err(ChannelError::Misdirected {
                to: envelope.to.clone(),
            });
        }
        let record = self
            .record(&envelope.from)
            .ok_or_else(|| ChannelError::UnknownPeer(envelope.from.clone()))?;
        let key = record
            .lock()
            .key()
            .cloned()
            .ok_or_else(|| ChannelError::NotConnected(envelope.from.clone()))?;

        let sealed = STANDARD
            .decode(&envelope.payload)
            .map_err(|_| ChannelError::DecryptFailed)?;
        let aad = crypto::construct_aad(
            envelope.from.as_str(),
            envelope.to.as_str(),
            envelope.kind.as_str(),
        );
        let plaintext = crypto::open(&key, &aad, &sealed)?;
        if !crypto::verify(&envelope.signature, &plaintext) {
            return Err(ChannelError::SignatureMismatch);
        }

        {
            let mut conn = record.lock();
            if conn.is_connected() {
                conn.touch(self.clock.now_millis());
            }
        }

        Ok(ChannelMessage {
            id: envelope.id.clone(),
            from: envelope.from.clone(),
            kind: envelope.kind,
            timestamp: envelope.timestamp,
            body: plaintext,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the link to a peer. Returns whether it was connected.
    pub fn disconnect(&self, peer: &PeerId) -> bool {
        let Some(record) = self.record(peer) else {
            return false;
        };
        let was_connected = {
            let mut conn = record.lock();
            let was_connected = conn.is_connected();
            conn.disconnect();
            was_connected
        };
        if was_connected {
            info!(peer = %peer, "secure connection closed");
            let _ = self
                .events
                .send(ConnectionEvent::Disconnected { peer: peer.clone() });
        }
        was_connected
    }

    /// Mark connections idle past the timeout as disconnected.
    pub fn sweep_idle(&self) -> Vec<ConnectionTimeout> {
        let now = self.clock.now_millis();
        let limit = self.config.idle_timeout.as_millis() as i64;
        let mut expired = Vec::new();

        for record in self.records() {
            let mut conn = record.lock();
            let idle_ms = conn.idle_for(now);
            if conn.is_connected() && idle_ms > limit {
                conn.disconnect();
                expired.push(ConnectionTimeout {
                    peer: conn.peer_id.clone(),
                    idle_ms,
                });
            }
        }

        for timeout in &expired {
            warn!(peer = %timeout.peer, idle_ms = timeout.idle_ms, "connection timed out");
            let _ = self.events.send(ConnectionEvent::TimedOut(timeout.clone()));
        }
        expired
    }

    /// Send a heartbeat to every connected peer. Returns how many were queued.
    pub fn heartbeat_tick(&self) -> usize {
        let body = serde_json::json!({ "timestamp": self.clock.now_millis() });
        let mut sent = 0;
        for peer in self.active_connections() {
            match self.send(&peer, MessageType::Heartbeat, &body) {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => warn!(peer = %peer, error = %e, "heartbeat failed"),
            }
        }
        sent
    }

    /// Peers with a connected link.
    pub fn active_connections(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .records()
            .into_iter()
            .filter_map(|record| {
                let conn = record.lock();
                conn.is_connected().then(|| conn.peer_id.clone())
            })
            .collect();
        peers.sort();
        peers
    }

    /// Phase of the link to a peer, if one was ever set up.
    pub fn connection_phase(&self, peer: &PeerId) -> Option<ConnectionPhase> {
        self.record(peer).map(|record| record.lock().phase)
    }

    /// Whether the link to a peer is connected.
    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connection_phase(peer) == Some(ConnectionPhase::Connected)
    }

    fn record(&self, peer: &PeerId) -> Option<Arc<Mutex<SecureConnection>>> {
        self.connections.read().get(peer).cloned()
    }

    fn record_or_insert(&self, peer: &PeerId, now: i64) -> Arc<Mutex<SecureConnection>> {
        if let Some(record) = self.record(peer) {
            return record;
        }
        Arc::clone(
            self.connections
                .write()
                .entry(peer.clone())
                .or_insert_with(|| Arc::new(Mutex::new(SecureConnection::new(peer.clone(), now)))),
        )
    }

    fn records(&self) -> Vec<Arc<Mutex<SecureConnection>>> {
        self.connections.read().values().cloned().collect()
    }
}

/// Drain one peer's outbound queue into the transport.
async fn write_loop<T: Transport>(
    transport: Arc<T>,
    peer: PeerId,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(envelope) = rx.recv().await {
        let kind = envelope.kind;
        if let Err(e) = transport.send(envelope).await {
            warn!(peer = %peer, %kind, error = %e, "transport send failed");
        }
    }
    debug!(peer = %peer, "writer task finished");
}
