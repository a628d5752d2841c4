//! Per-session update subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::StateUpdate;
use crate::core::SessionId;

/// Callback invoked with every update applied to a session.
pub type UpdateListener = Arc<dyn Fn(&StateUpdate) + Send + Sync>;

/// Token returned by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Listener lists keyed by session.
///
/// Delivery works on a snapshot of the list and runs outside the lock, so a
/// listener may subscribe or unsubscribe while being called.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<SessionId, Vec<(SubscriptionId, UpdateListener)>>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for a session.
    pub fn subscribe(&self, session: &SessionId, listener: UpdateListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(session.clone())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let mut removed = false;
        listeners.retain(|_, list| {
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Call every listener of a session. Returns how many were called.
    pub fn notify(&self, session: &SessionId, update: &StateUpdate) -> usize {
        let snapshot: Vec<UpdateListener> = match self.listeners.read().get(session) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };
        for listener in &snapshot {
            listener(update);
        }
        snapshot.len()
    }

    /// Drop every listener of a session.
    pub fn remove_session(&self, session: &SessionId) -> usize {
        self.listeners
            .write()
            .remove(session)
            .map_or(0, |list| list.len())
    }

    /// Number of listeners on a session.
    pub fn count(&self, session: &SessionId) -> usize {
        self.listeners.read().get(session).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::core::PeerId;
    use crate::sync::Action;
    use serde_json::json;

    fn update() -> StateUpdate {
        StateUpdate::new(
            SessionId::from("s1"),
            PeerId::from("A"),
            Action::GameEvent,
            json!("x"),
            1,
            0,
        )
    }

    #[test]
    fn test_notify_only_matching_session() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        registry.subscribe(
            &SessionId::from("s1"),
            Arc::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(registry.notify(&SessionId::from("s1"), &update()), 1);
        assert_eq!(registry.notify(&SessionId::from("s2"), &update()), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = ListenerRegistry::new();
        let id = registry.subscribe(&SessionId::from("s1"), Arc::new(|_| {}));
        let other = registry.subscribe(&SessionId::from("s1"), Arc::new(|_| {}));
        assert_ne!(id, other);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert_eq!(registry.count(&SessionId::from("s1")), 1);
    }

    #[test]
    fn test_unsubscribe_during_delivery() {
        let registry = Arc::new(ListenerRegistry::new());
        let slot: Arc<parking_lot::Mutex<Option<SubscriptionId>>> = Arc::default();

        let r = Arc::clone(&registry);
        let s = Arc::clone(&slot);
        let id = registry.subscribe(
            &SessionId::from("s1"),
            Arc::new(move |_| {
                if let Some(id) = s.lock().take() {
                    r.unsubscribe(id);
                }
            }),
        );
        *slot.lock() = Some(id);

        assert_eq!(registry.notify(&SessionId::from("s1"), &update()), 1);
        assert_eq!(registry.notify(&SessionId::from("s1"), &update()), 0);
    }

    #[test]
    fn test_remove_session() {
        let registry = ListenerRegistry::new();
        registry.subscribe(&SessionId::from("s1"), Arc::new(|_| {}));
        registry.subscribe(&SessionId::from("s1"), Arc::new(|_| {}));
        assert_eq!(registry.remove_session(&SessionId::from("s1")), 2);
        assert_eq!(registry.count(&SessionId::from("s1")), 0);
    }
}
