//! Background tasks: liveness sweep and periodic stats emission.
//!
//! The sweep force-disconnects peers whose sockets are gone, so ungraceful
//! client exits cannot leak topic membership. Stats emission is read-only:
//! it enumerates topic and peer counts for operational visibility and
//! mutates nothing.

use crate::config::{StatsConfig, SweepConfig};
use crate::server::RelayServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Spawn the liveness sweep task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_sweep_task(
    relay: Arc<RelayServer>,
    config: SweepConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("sweep task disabled");
            return;
        }

        tracing::info!("sweep task started (interval: {}s)", config.interval_secs);
        let mut timer = interval(Duration::from_secs(config.interval_secs));

        loop {
            timer.tick().await;
            let removed = relay.sweep();
            if removed > 0 {
                tracing::info!("sweep: removed {} dead connections", removed);
            } else {
                tracing::debug!("sweep: all connections alive");
            }
        }
    })
}

/// Spawn the periodic stats task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_stats_task(
    relay: Arc<RelayServer>,
    config: StatsConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("stats task disabled");
            return;
        }

        tracing::info!("stats task started (interval: {}s)", config.interval_secs);
        let mut timer = interval(Duration::from_secs(config.interval_secs));

        loop {
            timer.tick().await;
            let stats = relay.topic_stats();
            let peers: usize = stats.iter().map(|(_, count)| count).sum();
            tracing::info!(topics = stats.len(), peers, "relay stats");
            for (topic, count) in &stats {
                tracing::debug!(topic = %topic, peers = count, "topic stats");
            }
        }
    })
}
