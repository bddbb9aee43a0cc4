//! Vector clocks - causal metadata attached to record versions.
//!
//! Clocks record which writes each version's author had observed. They are
//! informational: the conflict resolver never consults them, but they are
//! carried, merged, and exposed through history so callers can tell genuine
//! concurrency from causal ordering.

use crate::ActorId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-actor logical counters recording causal history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    clock: HashMap<ActorId, u64>,
}

impl VectorClock {
    /// Create a new empty vector clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for an actor.
    pub fn increment(&mut self, actor: &ActorId) {
        *self.clock.entry(actor.clone()).or_insert(0) += 1;
    }

    /// Get the counter for an actor (0 if unknown).
    pub fn get(&self, actor: &ActorId) -> u64 {
        self.clock.get(actor).copied().unwrap_or(0)
    }

    /// Merge another clock into this one (pointwise maximum).
    pub fn merge(&mut self, other: &VectorClock) {
        for (actor, &count) in &other.clock {
            let entry = self.clock.entry(actor.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    /// True if every entry in `self` is <= the matching entry in `other`
    /// and at least one is strictly less.
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        let mut strictly_less = false;

        for (actor, &own) in &self.clock {
            let theirs = other.get(actor);
            if own > theirs {
                return false;
            }
            if own < theirs {
                strictly_less = true;
            }
        }

        for (actor, &theirs) in &other.clock {
            if theirs > 0 && !self.clock.contains_key(actor) {
                strictly_less = true;
            }
        }

        strictly_less
    }

    /// True if neither clock happened before the other.
    pub fn is_concurrent(&self, other: &VectorClock) -> bool {
        self != other && !self.happened_before(other) && !other.happened_before(self)
    }

    /// Number of actors tracked.
    pub fn len(&self) -> usize {
        self.clock.len()
    }

    /// True if no actor has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.clock.is_empty()
    }
}
