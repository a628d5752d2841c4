//! Shared harness for the multi-peer scenarios.

#![allow(dead_code)]

use std::sync::Arc;

use lansync::prelude::*;
use tokio::sync::mpsc;

pub type Engine = SyncEngine<MemoryTransport>;

/// One peer wired to the shared in-memory hub.
pub struct Node {
    pub engine: Arc<Engine>,
    pub clock: Arc<ManualClock>,
    pub inbox: mpsc::UnboundedReceiver<Envelope>,
}

impl Node {
    pub fn id(&self) -> PeerId {
        self.engine.local_peer().clone()
    }

    /// Let writer tasks flush, then process everything queued for this node.
    pub async fn drain(&mut self) -> Vec<SyncResult<ProcessResult>> {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        let mut results = Vec::new();
        while let Ok(envelope) = self.inbox.try_recv() {
            results.push(self.engine.handle_envelope(&envelope));
        }
        results
    }

    /// Collect queued envelopes without processing them.
    pub async fn take(&mut self) -> Vec<Envelope> {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        let mut envelopes = Vec::new();
        while let Ok(envelope) = self.inbox.try_recv() {
            envelopes.push(envelope);
        }
        envelopes
    }
}

/// Build one node per name, each with its own clock starting at `start`,
/// and connect every pair through X25519 agreement.
pub fn mesh(names: &[&str], start: i64, config: EngineConfig) -> Vec<Node> {
    let hub = MemoryHub::new();
    let nodes: Vec<Node> = names
        .iter()
        .map(|name| {
            let clock = Arc::new(ManualClock::new(start));
            let (transport, inbox) = hub.attach(*name);
            let channel = SecureChannel::new(*name, transport)
                .with_clock(clock.clone())
                .with_identity(StaticKeypair::generate());
            Node {
                engine: Arc::new(SyncEngine::new(Arc::new(channel), config.clone())),
                clock,
                inbox,
            }
        })
        .collect();

    let keys: Vec<(PeerId, [u8; 32])> = nodes
        .iter()
        .map(|n| (n.id(), *n.engine.channel().public_key()))
        .collect();
    for node in &nodes {
        for (peer, public) in &keys {
            if *peer != node.id() {
                node.engine
                    .establish_authenticated_connection(peer.clone(), public)
                    .unwrap();
            }
        }
    }
    nodes
}

pub fn peers(names: &[&str]) -> Vec<PeerId> {
    names.iter().map(|n| PeerId::from(*n)).collect()
}
