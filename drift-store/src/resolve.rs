//! The conflict resolver: pure last-writer-wins with a total tie-break.
//!
//! Applied identically to local and remote writes. The comparison key is
//! `(timestamp, actor)`: a strictly greater timestamp wins, and equal
//! timestamps fall back to lexicographic order on the actor id. Tombstones
//! compete exactly like normal writes. The ordering is total and
//! deterministic, so replicas converge regardless of arrival order.

use drift_types::Version;

/// True when `incoming` supersedes `current`.
///
/// An absent `current` always loses. A version never supersedes itself,
/// which makes re-application of an already-seen version a no-op.
pub fn wins(incoming: &Version, current: Option<&Version>) -> bool {
    match current {
        None => true,
        Some(current) => {
            (incoming.timestamp, &incoming.actor) > (current.timestamp, &current.actor)
        }
    }
}

/// True when `incoming` supersedes the current record, if any.
///
/// Same comparison as [`wins`], against the record's winning version.
pub fn wins_record(incoming: &Version, current: Option<&drift_types::Record>) -> bool {
    match current {
        None => true,
        Some(record) => {
            (incoming.timestamp, &incoming.actor) > (record.timestamp, &record.actor)
        }
    }
}

/// Pick the winner among two versions of the same record.
///
/// Commutative, associative, and idempotent: folding any permutation of a
/// version set through this function yields the same winner.
pub fn resolve<'a>(current: &'a Version, incoming: &'a Version) -> &'a Version {
    if wins(incoming, Some(current)) {
        incoming
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_types::{ActorId, VectorClock};
    use serde_json::json;

    fn version(timestamp: u64, actor: &str, tombstone: bool) -> Version {
        Version {
            data: if tombstone { serde_json::Value::Null } else { json!({"t": timestamp}) },
            timestamp,
            actor: ActorId::new(actor),
            tombstone,
            clock: VectorClock::new(),
        }
    }

    #[test]
    fn absent_current_loses() {
        let incoming = version(1, "a", false);
        assert!(wins(&incoming, None));
    }

    #[test]
    fn later_timestamp_wins_regardless_of_order() {
        let a = version(100, "a", false);
        let b = version(200, "b", false);

        assert_eq!(resolve(&a, &b), &b);
        assert_eq!(resolve(&b, &a), &b);
    }

    #[test]
    fn equal_timestamps_break_on_actor() {
        let a = version(100, "actor-a", false);
        let b = version(100, "actor-b", false);

        // Symmetric: the same winner whichever side is "current".
        assert_eq!(resolve(&a, &b), &b);
        assert_eq!(resolve(&b, &a), &b);
    }

    #[test]
    fn identical_version_does_not_supersede_itself() {
        let a = version(100, "a", false);
        assert!(!wins(&a, Some(&a)));
    }

    #[test]
    fn tombstone_competes_like_a_write() {
        let write = version(100, "a", false);
        let later_delete = version(200, "b", true);
        let earlier_delete = version(50, "b", true);

        assert_eq!(resolve(&write, &later_delete), &later_delete);
        assert_eq!(resolve(&write, &earlier_delete), &write);
    }

    #[test]
    fn fold_is_order_independent() {
        let versions = vec![
            version(300, "c", false),
            version(100, "a", true),
            version(300, "a", false),
            version(200, "b", false),
        ];

        // Fold every rotation of the set; all must agree on the winner.
        let mut winners = Vec::new();
        for start in 0..versions.len() {
            let mut order: Vec<&Version> = Vec::new();
            for i in 0..versions.len() {
                order.push(&versions[(start + i) % versions.len()]);
            }
            let winner = order[1..]
                .iter()
                .copied()
                .fold(order[0], |acc, v| resolve(acc, v));
            winners.push(winner.clone());
        }

        for w in &winners[1..] {
            assert_eq!(w, &winners[0]);
        }
        assert_eq!(winners[0].timestamp, 300);
        assert_eq!(winners[0].actor, ActorId::new("c"));
    }

    #[test]
    fn fold_is_idempotent() {
        let a = version(100, "a", false);
        let b = version(200, "b", false);

        let once = resolve(&a, &b);
        let twice = resolve(once, &b);
        assert_eq!(once, twice);
    }
}
