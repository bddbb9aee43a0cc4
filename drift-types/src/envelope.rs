//! The relay wire envelope.
//!
//! Every message on a relay socket is one [`Envelope`], JSON-encoded and
//! length-prefix framed. The envelope is a tagged sum type matched
//! exhaustively, so a new message kind is a compile-time-checked addition.
//! Payload bytes travel base64-encoded in the `data` field; the relay never
//! inspects them.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::WireError;

/// A relay protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Envelope {
    /// Client -> relay: enter a topic. First message on every connection.
    Join {
        /// The topic to join. Set exactly once per connection. Defaults to
        /// empty when absent so the relay can answer with a proper error
        /// envelope instead of a parse failure.
        #[serde(default)]
        topic: String,
        /// Self-chosen peer id; the relay generates one when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },
    /// Opaque payload. Client -> relay without `peer_id` (scoped to the
    /// sender's topic); relay -> client stamped with the originating peer.
    Data {
        /// Originating peer, filled in by the relay on fan-out.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
        /// Base64-encoded payload bytes.
        data: String,
    },
    /// Relay -> client: a peer entered the topic.
    PeerJoined {
        /// The peer that joined.
        peer_id: String,
        /// The topic it joined.
        topic: String,
    },
    /// Relay -> client: a peer left the topic.
    PeerLeft {
        /// The peer that left.
        peer_id: String,
        /// The topic it left.
        topic: String,
    },
    /// Relay -> client: a request could not be honored.
    Error {
        /// Human-readable reason.
        payload: String,
    },
}

impl Envelope {
    /// Build a `data` envelope from raw payload bytes.
    pub fn data_from_bytes(peer_id: Option<String>, bytes: &[u8]) -> Self {
        Envelope::Data {
            peer_id,
            data: STANDARD.encode(bytes),
        }
    }

    /// Decode the base64 payload of a `data` envelope.
    pub fn decode_data(data: &str) -> Result<Vec<u8>, WireError> {
        Ok(STANDARD.decode(data)?)
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Deserialization)
    }
}
