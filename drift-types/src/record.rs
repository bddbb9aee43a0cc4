//! The replicated data model: records and their version snapshots.

use crate::{ActorId, VectorClock};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One version of a record: the unit of conflict resolution and replication.
///
/// Versions are compared by `(timestamp, actor)` only; the vector clock is
/// carried as causal metadata and never decides a winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// The opaque value tree carried by this version. Null for tombstones.
    pub data: serde_json::Value,
    /// Writer-assigned wall-clock timestamp in milliseconds since epoch.
    pub timestamp: u64,
    /// The replica that produced this version.
    pub actor: ActorId,
    /// True when this version logically deletes the record.
    pub tombstone: bool,
    /// Causal history known to the writer at write time.
    pub clock: VectorClock,
}

impl Version {
    /// Attach an id to this version, producing a full record.
    pub fn into_record(self, id: impl Into<String>) -> Record {
        Record {
            id: id.into(),
            data: self.data,
            timestamp: self.timestamp,
            actor: self.actor,
            tombstone: self.tombstone,
            clock: self.clock,
        }
    }
}

/// A record: the current winning version of an id, plus the id itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Globally unique identifier, stable for the record's lifetime.
    pub id: String,
    /// The opaque value tree. Null and externally invisible for tombstones.
    pub data: serde_json::Value,
    /// Writer-assigned wall-clock timestamp in milliseconds since epoch.
    pub timestamp: u64,
    /// The replica that produced this version.
    pub actor: ActorId,
    /// True when the record is logically deleted but retained for
    /// conflict resolution and history.
    pub tombstone: bool,
    /// Causal history known to the writer at write time.
    pub clock: VectorClock,
}

impl Record {
    /// The version snapshot of this record, without the id.
    pub fn version(&self) -> Version {
        Version {
            data: self.data.clone(),
            timestamp: self.timestamp,
            actor: self.actor.clone(),
            tombstone: self.tombstone,
            clock: self.clock.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn now_millis_is_recent() {
        let t = now_millis();
        // 2020-01-01 in ms; anything earlier means a broken clock source.
        assert!(t > 1_577_836_800_000);
    }

    #[test]
    fn version_record_roundtrip() {
        let version = Version {
            data: json!({"name": "Alice"}),
            timestamp: 42,
            actor: ActorId::new("a"),
            tombstone: false,
            clock: VectorClock::new(),
        };

        let record = version.clone().into_record("user:1");
        assert_eq!(record.id, "user:1");
        assert_eq!(record.version(), version);
    }

    #[test]
    fn record_serde_roundtrip() {
        let record = Record {
            id: "doc:1".into(),
            data: json!([1, 2, {"nested": true}]),
            timestamp: 1_700_000_000_000,
            actor: ActorId::new("replica-1"),
            tombstone: false,
            clock: VectorClock::new(),
        };

        let bytes = serde_json::to_vec(&record).unwrap();
        let restored: Record = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn tombstone_version_carries_null_data() {
        let version = Version {
            data: serde_json::Value::Null,
            timestamp: 1,
            actor: ActorId::new("a"),
            tombstone: true,
            clock: VectorClock::new(),
        };
        assert!(version.tombstone);
        assert!(version.data.is_null());
    }
}
