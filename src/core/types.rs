//! Identifier newtypes shared by every layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, stable identifier of a participant.
///
/// Ordering is lexicographic on the underlying string; conflict resolution
/// relies on it as the deterministic tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Name of a synchronization session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_ordering_is_lexicographic() {
        let a = PeerId::from("alice");
        let b = PeerId::from("bob");
        let a2 = PeerId::from("alice2");

        assert!(a < b);
        assert!(a < a2);
        assert!(a2 < b);
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let peer = PeerId::from("A");
        let session = SessionId::from("lobby-1");

        assert_eq!(serde_json::to_string(&peer).unwrap(), "\"A\"");
        assert_eq!(serde_json::to_string(&session).unwrap(), "\"lobby-1\"");

        let back: PeerId = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(back, peer);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", SessionId::from("s1")), "s1");
        assert_eq!(PeerId::from("C").as_str(), "C");
    }
}
