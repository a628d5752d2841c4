//! Per-peer connection record.
//!
//! ```text
//! Connecting ──► Connected ──► Disconnected ──► (establish again)
//!      │                 │
//!      └──► Failed ◄─────┘        (explicit retry only)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::PeerId;
use crate::crypto::SymmetricKey;
use crate::transport::Envelope;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Key setup in progress.
    Connecting,
    /// Key installed, traffic flows.
    Connected,
    /// Closed or timed out; may be re-established.
    Disconnected,
    /// Key setup failed; requires an explicit retry.
    Failed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of the secure link to one peer.
pub struct SecureConnection {
    /// Remote peer.
    pub peer_id: PeerId,
    /// Current phase.
    pub phase: ConnectionPhase,
    /// Link key; present only while connected.
    key: Option<SymmetricKey>,
    /// Last authenticated inbound traffic (ms).
    pub last_activity: i64,
    /// Queue drained by this peer's writer task.
    outbound: Option<mpsc::UnboundedSender<Envelope>>,
}

impl SecureConnection {
    /// Create a record in the `Connecting` phase.
    pub fn new(peer_id: PeerId, now: i64) -> Self {
        Self {
            peer_id,
            phase: ConnectionPhase::Connecting,
            key: None,
            last_activity: now,
            outbound: None,
        }
    }

    /// Restart setup on an existing record.
    pub fn begin(&mut self, now: i64) {
        self.close();
        self.phase = ConnectionPhase::Connecting;
        self.last_activity = now;
    }

    /// Install the link key and writer queue.
    pub fn connect(
        &mut self,
        key: SymmetricKey,
        outbound: mpsc::UnboundedSender<Envelope>,
        now: i64,
    ) {
        self.key = Some(key);
        self.outbound = Some(outbound);
        self.phase = ConnectionPhase::Connected;
        self.last_activity = now;
    }

    /// Whether traffic may flow.
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// The link key, if connected.
    pub fn key(&self) -> Option<&SymmetricKey> {
        if self.is_connected() {
            self.key.as_ref()
        } else {
            None
        }
    }

    /// The writer queue, if connected.
    pub fn outbound(&self) -> Option<&mpsc::UnboundedSender<Envelope>> {
        if self.is_connected() {
            self.outbound.as_ref()
        } else {
            None
        }
    }

    /// Record authenticated inbound traffic.
    pub fn touch(&mut self, now: i64) {
        self.last_activity = now;
    }

    /// Milliseconds since the last authenticated inbound traffic.
    pub fn idle_for(&self, now: i64) -> i64 {
        now.saturating_sub(self.last_activity)
    }

    /// Move to `Disconnected`, dropping the key and writer queue.
    ///
    /// Envelopes already queued are still flushed by the writer task.
    pub fn disconnect(&mut self) {
        self.close();
        self.phase = ConnectionPhase::Disconnected;
    }

    /// Move to `Failed`.
    pub fn fail(&mut self) {
        self.close();
        self.phase = ConnectionPhase::Failed;
    }

    fn close(&mut self) {
        self.key = None;
        self.outbound = None;
    }
}

impl fmt::Debug for SecureConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureConnection")
            .field("peer_id", &self.peer_id)
            .field("phase", &self.phase)
            .field("last_activity", &self.last_activity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut conn = SecureConnection::new(PeerId::from("B"), 0);
        assert_eq!(conn.phase, ConnectionPhase::Connecting);
        assert!(conn.key().is_none());

        let (tx, _rx) = mpsc::unbounded_channel();
        conn.connect(SymmetricKey::generate(), tx, 10);
        assert!(conn.is_connected());
        assert!(conn.key().is_some());
        assert!(conn.outbound().is_some());
        assert_eq!(conn.last_activity, 10);

        conn.disconnect();
        assert_eq!(conn.phase, ConnectionPhase::Disconnected);
        assert!(conn.key().is_none());
        assert!(conn.outbound().is_none());

        conn.begin(20);
        assert_eq!(conn.phase, ConnectionPhase::Connecting);
        conn.fail();
        assert_eq!(conn.phase, ConnectionPhase::Failed);
    }

    #[test]
    fn test_disconnect_closes_writer_queue() {
        let mut conn = SecureConnection::new(PeerId::from("B"), 0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.connect(SymmetricKey::generate(), tx, 0);
        conn.disconnect();
        assert_eq!(
            rx.try_recv().unwrap_err(),
            mpsc::error::TryRecvError::Disconnected
        );
    }

    #[test]
    fn test_idle_tracking() {
        let mut conn = SecureConnection::new(PeerId::from("B"), 1_000);
        assert_eq!(conn.idle_for(4_000), 3_000);
        conn.touch(4_000);
        assert_eq!(conn.idle_for(4_500), 500);
        assert_eq!(conn.idle_for(0), -4_000);
    }

    #[test]
    fn test_debug_hides_key() {
        let mut conn = SecureConnection::new(PeerId::from("B"), 0);
        let (tx, _rx) = mpsc::unbounded_channel();
        conn.connect(SymmetricKey::from_bytes([7; 32]), tx, 0);
        let debug = format!("{conn:?}");
        assert!(debug.contains("Connected"));
        assert!(!debug.contains("key"));
    }
}
