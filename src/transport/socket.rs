//! UDP transport adapter.
//!
//! Each envelope travels as one JSON datagram. Peers are addressed through a
//! small address book filled in by discovery (or by hand in tests).

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Envelope, Transport, TransportError};
use crate::core::{PeerId, TaskHandle, MAX_DATAGRAM_SIZE};

/// Async UDP transport.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    /// The underlying UDP socket.
    socket: Arc<UdpSocket>,
    /// Known peer endpoints.
    peers: Arc<RwLock<HashMap<PeerId, SocketAddr>>>,
    /// Largest datagram we will send.
    max_datagram_size: usize,
}

impl UdpTransport {
    /// Bind a transport to the given address.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    /// Wrap an existing UDP socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket: Arc::new(socket),
            peers: Arc::new(RwLock::new(HashMap::new())),
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }

    /// Set the maximum datagram size (for MTU considerations).
    pub fn set_max_datagram_size(&mut self, size: usize) {
        self.max_datagram_size = size;
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Record (or update) a peer's endpoint.
    pub fn add_peer(&self, peer: impl Into<PeerId>, addr: SocketAddr) {
        self.peers.write().insert(peer.into(), addr);
    }

    /// Forget a peer's endpoint.
    pub fn remove_peer(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.peers.write().remove(peer)
    }

    /// Look up a peer's endpoint.
    pub fn peer_addr(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.peers.read().get(peer).copied()
    }

    /// Receive one envelope and the sender's address.
    pub async fn recv(&self) -> Result<(Envelope, SocketAddr), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        self.recv_into(&mut buf).await
    }

    /// Receive one envelope using a caller-owned buffer.
    async fn recv_into(&self, buf: &mut [u8]) -> Result<(Envelope, SocketAddr), TransportError> {
        let (len, addr) = self.socket.recv_from(buf).await?;
        let envelope = Envelope::from_bytes(&buf[..len])?;
        Ok((envelope, addr))
    }

    /// Spawn a task that forwards every well-formed inbound envelope.
    ///
    /// Malformed datagrams are logged and dropped. The task ends when the
    /// inbox is dropped, the socket fails or the handle is dropped.
    pub fn spawn_receiver(&self) -> (mpsc::UnboundedReceiver<Envelope>, TaskHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = self.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                match transport.recv_into(&mut buf).await {
                    Ok((envelope, addr)) => {
                        debug!(from = %envelope.from, %addr, kind = %envelope.kind, "datagram received");
                        if tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(TransportError::Encode(e)) => {
                        warn!(error = %e, "dropping malformed datagram");
                    }
                    Err(e) => {
                        warn!(error = %e, "udp receive failed");
                        break;
                    }
                }
            }
        });
        (rx, TaskHandle::new(task))
    }

    fn encode_for(&self, envelope: &Envelope) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let addr = self
            .peer_addr(&envelope.to)
            .ok_or_else(|| TransportError::UnknownPeer(envelope.to.clone()))?;
        let bytes = envelope.to_bytes()?;
        if bytes.len() > self.max_datagram_size {
            return Err(TransportError::TooLarge {
                size: bytes.len(),
                max: self.max_datagram_size,
            });
        }
        Ok((bytes, addr))
    }
}

impl Transport for UdpTransport {
    fn send(&self, envelope: Envelope) -> impl Future<Output = Result<(), TransportError>> + Send {
        let encoded = self.encode_for(&envelope);
        let socket = Arc::clone(&self.socket);
        async move {
            let (bytes, addr) = encoded?;
            socket.send_to(&bytes, addr).await?;
            Ok(())
        }
    }
}
