//! Identity and scoping types for driftkv.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The identity of a replica (writer) in the sync network.
///
/// Actor ids break timestamp ties in conflict resolution, so their ordering
/// must be total and identical on every replica: comparison is plain
/// lexicographic order on the string form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Create an ActorId from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random ActorId.
    ///
    /// 16 bytes of random data, displayed as URL-safe base64.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the string form of this ActorId.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

/// A unique identifier for a relay peer connection.
///
/// Chosen by the client on join, or generated by the relay (UUID v4)
/// when absent. Unique per connection, not per device.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a PeerId from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random PeerId (UUID v4).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the string form of this PeerId.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

/// A topic scoping which peers may exchange traffic through a relay.
///
/// Peers in different topics never observe each other's traffic. Topics are
/// opaque strings; [`Topic::from_secret`] derives one from a shared secret
/// so the relay never learns the secret itself.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Create a Topic from an existing string.
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    /// Derive a Topic from a secret passphrase.
    ///
    /// SHA-256 over a domain-separated input, displayed as URL-safe base64.
    pub fn from_secret(secret: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"driftkv-topic-v1");
        hasher.update(secret);
        Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    /// Get the string form of this Topic.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = if self.0.len() > 8 { &self.0[..8] } else { &self.0 };
        write!(f, "Topic({})", short)
    }
}
