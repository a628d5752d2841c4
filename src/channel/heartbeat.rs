//! Periodic liveness task for a [`SecureChannel`].

use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use super::SecureChannel;
use crate::core::TaskHandle;
use crate::transport::Transport;

impl<T: Transport> SecureChannel<T> {
    /// Spawn the heartbeat loop.
    ///
    /// Every `heartbeat_interval` the loop first marks idle links
    /// disconnected, then sends a heartbeat to every link still connected.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> TaskHandle {
        let channel = Arc::downgrade(self);
        let period = self.config().heartbeat_interval;

        let task = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(channel) = channel.upgrade() else {
                    break;
                };
                let expired = channel.sweep_idle();
                let sent = channel.heartbeat_tick();
                debug!(sent, expired = expired.len(), "heartbeat tick");
            }
        });

        TaskHandle::new(task)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::ConnectionEvent;
    use crate::core::{ManualClock, PeerId};
    use crate::crypto::SymmetricKey;
    use crate::transport::{MemoryHub, MessageType};

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_reaches_connected_peers() {
        let hub = MemoryHub::new();
        let clock = Arc::new(ManualClock::new(0));
        let (ta, _a_rx) = hub.attach("A");
        let (_tb, mut b_rx) = hub.attach("B");
        let a = Arc::new(SecureChannel::new("A", ta).with_clock(clock));
        a.establish_with_key("B", SymmetricKey::generate()).unwrap();

        let handle = a.spawn_heartbeat();
        let envelope = b_rx.recv().await.unwrap();
        assert_eq!(envelope.kind, MessageType::Heartbeat);
        assert_eq!(envelope.to, PeerId::from("B"));
        assert!(!handle.is_finished());

        handle.stop();
        time::sleep(Duration::from_secs(120)).await;
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_sweeps_idle_links() {
        let hub = MemoryHub::new();
        let clock = Arc::new(ManualClock::new(0));
        let (ta, _a_rx) = hub.attach("A");
        let (_tb, _b_rx) = hub.attach("B");
        let a = Arc::new(SecureChannel::new("A", ta).with_clock(clock.clone()));
        a.establish_with_key("B", SymmetricKey::generate()).unwrap();
        let mut events = a.subscribe_connections();

        let _handle = a.spawn_heartbeat();
        clock.advance(Duration::from_secs(301));

        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectionEvent::TimedOut(t) if t.peer == PeerId::from("B")));
        assert!(!a.is_connected(&PeerId::from("B")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_ends_when_channel_dropped() {
        let hub = MemoryHub::new();
        let (ta, _a_rx) = hub.attach("A");
        let a = Arc::new(SecureChannel::new("A", ta));
        let handle = a.spawn_heartbeat();

        drop(a);
        time::sleep(Duration::from_secs(31)).await;
        assert!(handle.is_finished());
    }
}
