//! Session registry.
//!
//! The map lock is held only to look up, insert or remove a session; all
//! work on a session happens under that session's own mutex, so operations
//! on different sessions never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::SyncSession;
use crate::core::{SessionError, SessionId};

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<SyncSession>>;

/// All sessions known to the local engine.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().get(id).cloned()
    }

    /// Look up a session or fail with `NotFound`.
    pub fn require(&self, id: &SessionId) -> Result<SessionHandle, SessionError> {
        self.get(id).ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// Register a new session.
    pub fn insert(&self, session: SyncSession) -> Result<SessionHandle, SessionError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.session_id) {
            return Err(SessionError::AlreadyExists(session.session_id));
        }
        let id = session.session_id.clone();
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Return the existing session, or register the one `create` builds.
    ///
    /// The flag is `true` when the session was created by this call.
    pub fn get_or_insert_with(
        &self,
        id: &SessionId,
        create: impl FnOnce() -> SyncSession,
    ) -> (SessionHandle, bool) {
        if let Some(handle) = self.get(id) {
            return (handle, false);
        }
        let mut sessions = self.sessions.write();
        if let Some(handle) = sessions.get(id) {
            return (Arc::clone(handle), false);
        }
        let handle = Arc::new(Mutex::new(create()));
        sessions.insert(id.clone(), Arc::clone(&handle));
        (handle, true)
    }

    /// Remove a session.
    pub fn remove(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.write().remove(id)
    }

    /// Snapshot of every session handle.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.read().values().cloned().collect()
    }

    /// Ids of every session, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PeerId;
    use crate::sync::ConflictStrategy;

    fn session(id: &str) -> SyncSession {
        SyncSession::new(
            SessionId::from(id),
            [PeerId::from("A")],
            ConflictStrategy::default(),
            0,
        )
    }

    #[test]
    fn test_insert_and_duplicate() {
        let registry = SessionRegistry::new();
        registry.insert(session("s1")).unwrap();
        assert_eq!(
            registry.insert(session("s1")).unwrap_err(),
            SessionError::AlreadyExists(SessionId::from("s1"))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_require_missing() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.require(&SessionId::from("nope")).unwrap_err(),
            SessionError::NotFound(SessionId::from("nope"))
        );
    }

    #[test]
    fn test_get_or_insert_with() {
        let registry = SessionRegistry::new();
        let (first, created) = registry.get_or_insert_with(&SessionId::from("s1"), || session("s1"));
        assert!(created);
        first.lock().next_sequence();

        let (second, created) =
            registry.get_or_insert_with(&SessionId::from("s1"), || panic!("must not rebuild"));
        assert!(!created);
        assert_eq!(second.lock().sequence_counter, 1);
    }

    #[test]
    fn test_remove_and_ids() {
        let registry = SessionRegistry::new();
        registry.insert(session("b")).unwrap();
        registry.insert(session("a")).unwrap();
        assert_eq!(registry.ids(), vec![SessionId::from("a"), SessionId::from("b")]);

        assert!(registry.remove(&SessionId::from("a")).is_some());
        assert!(registry.remove(&SessionId::from("a")).is_none());
        assert_eq!(registry.handles().len(), 1);
        assert!(!registry.is_empty());
    }
}
