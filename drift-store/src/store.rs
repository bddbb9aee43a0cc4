//! The record store: id -> winning record, with per-id version history.
//!
//! All mutation runs to completion under one mutex and never suspends;
//! network I/O lives entirely in the sync layer. Local and remote writes
//! share the same resolution path ([`crate::resolve`]), so replicas that
//! have observed the same versions hold the same state.

use crate::error::{StoreError, StoreResult};
use crate::resolve;
use crate::subscribe::{Subscription, SubscriptionHub};
use drift_types::{now_millis, ActorId, Record, Version, VectorClock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Hook invoked with every locally created version, used by the
/// replication driver to propagate writes. Remote applies never fire it,
/// which is what keeps replicas from echoing each other's updates forever.
pub type ReplicationHook = Box<dyn Fn(&str, &Version) + Send + Sync>;

#[derive(Default)]
struct StoreInner {
    records: HashMap<String, Record>,
    history: HashMap<String, Vec<Version>>,
    clock: VectorClock,
    /// Highest timestamp this store has assigned. Local writes never reuse
    /// it, so two writes inside one millisecond still apply in order.
    last_timestamp: u64,
}

/// On-disk snapshot shape for the optional persistence hooks.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    records: HashMap<String, Record>,
    history: HashMap<String, Vec<Version>>,
    clock: VectorClock,
}

/// A replica's record store.
pub struct RecordStore {
    actor: ActorId,
    inner: Mutex<StoreInner>,
    hub: SubscriptionHub,
    outbound: Mutex<Option<ReplicationHook>>,
}

impl RecordStore {
    /// Create an empty store owned by the given actor.
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            inner: Mutex::new(StoreInner::default()),
            hub: SubscriptionHub::new(),
            outbound: Mutex::new(None),
        }
    }

    /// The actor identity of this replica.
    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// Write a value. Resolves against the current version, appends to
    /// history, notifies subscribers with the winning record, and hands the
    /// new version to the replication hook. Returns the id.
    pub fn put(&self, id: &str, data: serde_json::Value) -> StoreResult<String> {
        self.write_local(id, data, false)?;
        Ok(id.to_string())
    }

    /// Logically delete a record: a `put` of a tombstone. The tombstone
    /// competes in conflict resolution exactly like a write.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        self.write_local(id, serde_json::Value::Null, true)
    }

    /// The current winning record, or `None` when absent or tombstoned.
    pub fn get(&self, id: &str) -> Option<Record> {
        let inner = self.inner.lock().unwrap();
        inner.records.get(id).filter(|r| !r.tombstone).cloned()
    }

    /// Snapshot of all current non-tombstoned records. Order unspecified;
    /// every call restarts from live state.
    pub fn list(&self) -> Vec<Record> {
        let inner = self.inner.lock().unwrap();
        inner
            .records
            .values()
            .filter(|r| !r.tombstone)
            .cloned()
            .collect()
    }

    /// Retained versions of a record, oldest first. Empty for unknown ids.
    pub fn history(&self, id: &str) -> Vec<Version> {
        let inner = self.inner.lock().unwrap();
        inner.history.get(id).cloned().unwrap_or_default()
    }

    /// Replay the version nearest at-or-before `timestamp` as a fresh write
    /// at the current time. The restore itself becomes a new, propagatable
    /// version; history is never rewritten.
    pub fn restore(&self, id: &str, timestamp: u64) -> StoreResult<()> {
        if id.is_empty() {
            return Err(StoreError::InvalidArgument {
                reason: "empty id".into(),
            });
        }

        let target = {
            let inner = self.inner.lock().unwrap();
            inner.history.get(id).and_then(|versions| {
                versions.iter().rev().find(|v| v.timestamp <= timestamp).cloned()
            })
        };

        match target {
            Some(version) => self.write_local(id, version.data, version.tombstone),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    /// Register a listener for one id. See [`SubscriptionHub`].
    pub fn on(
        &self,
        id: impl Into<String>,
        listener: impl Fn(&str, Option<&Record>) + Send + Sync + 'static,
    ) -> Subscription {
        self.hub.on(id, listener)
    }

    /// Register a wildcard listener invoked for every id.
    pub fn on_any(
        &self,
        listener: impl Fn(&str, Option<&Record>) + Send + Sync + 'static,
    ) -> Subscription {
        self.hub.on_any(listener)
    }

    /// Install the replication hook. At most one; replaces any previous.
    pub fn set_replication_hook(
        &self,
        hook: impl Fn(&str, &Version) + Send + Sync + 'static,
    ) {
        *self.outbound.lock().unwrap() = Some(Box::new(hook));
    }

    /// Apply a version received from another replica.
    ///
    /// Same resolution as a local write, but subscribers are only notified
    /// when the winner actually changes, and the replication hook never
    /// fires (remote writes are not re-broadcast).
    pub fn apply_remote(&self, id: &str, version: Version) -> StoreResult<()> {
        if id.is_empty() {
            return Err(StoreError::InvalidArgument {
                reason: "empty id".into(),
            });
        }

        let (changed, winner) = {
            let mut inner = self.inner.lock().unwrap();
            inner.clock.merge(&version.clock);
            let changed = apply_version(&mut inner, id, version);
            (changed, inner.records.get(id).cloned())
        };

        if changed {
            tracing::debug!(id, "remote write accepted");
            self.notify_winner(id, winner);
        }
        Ok(())
    }

    /// Current winning versions of every id, tombstones included: the state
    /// summary sent to a newly joined peer.
    pub fn export_versions(&self) -> Vec<(String, Version)> {
        let inner = self.inner.lock().unwrap();
        inner
            .records
            .iter()
            .map(|(id, record)| (id.clone(), record.version()))
            .collect()
    }

    /// Persist a snapshot (records, history, clock) as JSON.
    pub fn save_to(&self, path: &Path) -> StoreResult<()> {
        let snapshot = {
            let inner = self.inner.lock().unwrap();
            Snapshot {
                records: inner.records.clone(),
                history: inner.history.clone(),
                clock: inner.clock.clone(),
            }
        };

        let file = std::fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), &snapshot)?;
        Ok(())
    }

    /// Load a snapshot previously written by [`RecordStore::save_to`].
    pub fn load_from(path: &Path, actor: ActorId) -> StoreResult<Self> {
        let file = std::fs::File::open(path)?;
        let snapshot: Snapshot = serde_json::from_reader(std::io::BufReader::new(file))?;

        let last_timestamp = snapshot
            .history
            .values()
            .flatten()
            .map(|v| v.timestamp)
            .max()
            .unwrap_or(0);

        Ok(Self {
            actor,
            inner: Mutex::new(StoreInner {
                records: snapshot.records,
                history: snapshot.history,
                clock: snapshot.clock,
                last_timestamp,
            }),
            hub: SubscriptionHub::new(),
            outbound: Mutex::new(None),
        })
    }

    /// The shared local write path for put, delete, and restore.
    fn write_local(
        &self,
        id: &str,
        data: serde_json::Value,
        tombstone: bool,
    ) -> StoreResult<()> {
        if id.is_empty() {
            return Err(StoreError::InvalidArgument {
                reason: "empty id".into(),
            });
        }

        let (version, winner) = {
            let mut inner = self.inner.lock().unwrap();
            let timestamp = now_millis().max(inner.last_timestamp + 1);
            inner.last_timestamp = timestamp;

            let actor = self.actor.clone();
            inner.clock.increment(&actor);
            let version = Version {
                data,
                timestamp,
                actor,
                tombstone,
                clock: inner.clock.clone(),
            };

            apply_version(&mut inner, id, version.clone());
            (version, inner.records.get(id).cloned())
        };

        if let Some(hook) = &*self.outbound.lock().unwrap() {
            hook(id, &version);
        }
        self.notify_winner(id, winner);
        Ok(())
    }

    fn notify_winner(&self, id: &str, winner: Option<Record>) {
        match winner {
            Some(record) if !record.tombstone => self.hub.notify(id, Some(&record)),
            _ => self.hub.notify(id, None),
        }
    }
}

/// Insert `version` into the id's history (ordered by `(timestamp, actor)`,
/// duplicates skipped) and update the winning record. Returns whether the
/// winner changed.
fn apply_version(inner: &mut StoreInner, id: &str, version: Version) -> bool {
    let history = inner.history.entry(id.to_string()).or_default();
    let seen = history
        .iter()
        .any(|v| v.timestamp == version.timestamp && v.actor == version.actor);
    if !seen {
        let pos = history.partition_point(|v| {
            (v.timestamp, &v.actor) <= (version.timestamp, &version.actor)
        });
        history.insert(pos, version.clone());
    }

    if resolve::wins_record(&version, inner.records.get(id)) {
        inner
            .records
            .insert(id.to_string(), version.into_record(id));
        true
    } else {
        false
    }
}
