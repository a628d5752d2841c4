//! In-process transport.
//!
//! A [`MemoryHub`] routes envelopes between [`MemoryTransport`]s attached to
//! it, each with its own unbounded inbox. Used by tests and the demo to wire
//! several engines together without sockets.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::{Envelope, Transport, TransportError};
use crate::core::PeerId;

/// Routing table shared by every attached transport.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    inboxes: Arc<RwLock<HashMap<PeerId, mpsc::UnboundedSender<Envelope>>>>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a peer, returning its transport and inbox.
    ///
    /// Re-attaching a peer replaces its previous inbox.
    pub fn attach(
        &self,
        peer: impl Into<PeerId>,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<Envelope>) {
        let peer = peer.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.write().insert(peer.clone(), tx);
        let transport = MemoryTransport {
            hub: self.clone(),
            local: peer,
        };
        (transport, rx)
    }

    /// Detach a peer; envelopes addressed to it fail with `UnknownPeer`.
    pub fn detach(&self, peer: &PeerId) {
        self.inboxes.write().remove(peer);
    }

    /// Whether a peer is attached.
    pub fn is_attached(&self, peer: &PeerId) -> bool {
        self.inboxes.read().contains_key(peer)
    }

    fn deliver(&self, envelope: Envelope) -> Result<(), TransportError> {
        let inbox = self
            .inboxes
            .read()
            .get(&envelope.to)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeer(envelope.to.clone()))?;
        inbox.send(envelope).map_err(|_| TransportError::Closed)
    }
}

/// One peer's handle onto a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    hub: MemoryHub,
    local: PeerId,
}

impl MemoryTransport {
    /// The peer this transport was attached as.
    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }
}

impl Transport for MemoryTransport {
    fn send(&self, envelope: Envelope) -> impl Future<Output = Result<(), TransportError>> + Send {
        let result = self.hub.deliver(envelope);
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MessageType;

    fn envelope(from: &str, to: &str) -> Envelope {
        Envelope {
            id: Envelope::new_id(),
            from: PeerId::from(from),
            to: PeerId::from(to),
            kind: MessageType::Heartbeat,
            payload: String::new(),
            timestamp: 0,
            signature: String::new(),
        }
    }

    #[tokio::test]
    async fn test_routes_to_addressee() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.attach("A");
        let (_b, mut b_rx) = hub.attach("B");

        a.send(envelope("A", "B")).await.unwrap();
        let received = b_rx.recv().await.unwrap();
        assert_eq!(received.from, PeerId::from("A"));
        assert_eq!(a.local_peer(), &PeerId::from("A"));
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let hub = MemoryHub::new();
        let (a, _rx) = hub.attach("A");
        let err = a.send(envelope("A", "Z")).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer(p) if p.as_str() == "Z"));
    }

    #[tokio::test]
    async fn test_detach_and_closed_inbox() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.attach("A");
        let (_b, b_rx) = hub.attach("B");

        drop(b_rx);
        assert!(matches!(
            a.send(envelope("A", "B")).await,
            Err(TransportError::Closed)
        ));

        hub.detach(&PeerId::from("B"));
        assert!(!hub.is_attached(&PeerId::from("B")));
        assert!(matches!(
            a.send(envelope("A", "B")).await,
            Err(TransportError::UnknownPeer(_))
        ));
    }

    #[tokio::test]
    async fn test_per_sender_order_is_preserved() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.attach("A");
        let (_b, mut b_rx) = hub.attach("B");

        for i in 0..10 {
            let mut e = envelope("A", "B");
            e.timestamp = i;
            a.send(e).await.unwrap();
        }
        for i in 0..10 {
            assert_eq!(b_rx.recv().await.unwrap().timestamp, i);
        }
    }
}
