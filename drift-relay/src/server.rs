//! Relay server state and message routing.
//!
//! A [`RelayServer`] is a constructed instance, not a singleton: it owns the
//! topic and peer registries and is handed by `Arc` to every session. State
//! lives in memory only; a restart loses all membership and clients rejoin.

use crate::config::Config;
use crate::session::Session;
use dashmap::DashMap;
use drift_types::{Envelope, PeerId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64` - no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total connections accepted (before join).
    pub connections_total: AtomicU64,
    /// Total successful topic joins.
    pub joins_total: AtomicU64,
    /// Total data envelopes fanned out.
    pub envelopes_relayed: AtomicU64,
    /// Total payload bytes fanned out (base64 form, per recipient).
    pub bytes_relayed: AtomicU64,
    /// Total protocol errors (malformed envelopes, join violations).
    pub protocol_errors: AtomicU64,
}

/// Outbound channel plus topic membership for one connected peer.
#[derive(Debug, Clone)]
pub(crate) struct PeerHandle {
    pub(crate) topic: String,
    pub(crate) sender: mpsc::UnboundedSender<Envelope>,
}

/// The relay server.
pub struct RelayServer {
    config: Config,
    /// Topic -> member set.
    topics: DashMap<String, HashSet<PeerId>>,
    /// Peer -> outbound handle.
    peers: DashMap<PeerId, PeerHandle>,
    metrics: RelayMetrics,
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("config", &self.config)
            .field("topics", &self.topics.len())
            .field("peers", &self.peers.len())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl RelayServer {
    /// Create a relay server with the given config.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            topics: DashMap::new(),
            peers: DashMap::new(),
            metrics: RelayMetrics::default(),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Accept connections forever, one [`Session`] per socket.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> crate::error::Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%addr, "connection accepted");

            let relay = Arc::clone(&self);
            tokio::spawn(async move {
                Session::new(relay, addr.to_string()).run(stream).await;
            });
        }
    }

    /// Add a peer to a topic, creating the topic if absent.
    ///
    /// Announces the newcomer to every existing member, and sends the
    /// newcomer a single consolidated `peer-joined` about one existing
    /// member (the protocol is symmetric join-broadcast, not a roster dump).
    /// Returns the peer id, generated when the client chose none.
    pub(crate) fn join(
        &self,
        topic: String,
        requested: Option<PeerId>,
        sender: mpsc::UnboundedSender<Envelope>,
    ) -> PeerId {
        let peer = requested.unwrap_or_else(PeerId::random);

        // A reconnect reusing a peer id displaces the stale registration.
        if self.peers.contains_key(&peer) {
            self.disconnect(&peer);
        }

        self.peers.insert(
            peer.clone(),
            PeerHandle {
                topic: topic.clone(),
                sender,
            },
        );

        let existing: Vec<PeerId> = {
            let mut members = self.topics.entry(topic.clone()).or_default();
            let existing = members.iter().cloned().collect();
            members.insert(peer.clone());
            existing
        };

        for member in &existing {
            self.send_to(
                member,
                Envelope::PeerJoined {
                    peer_id: peer.to_string(),
                    topic: topic.clone(),
                },
            );
        }
        if let Some(first) = existing.first() {
            self.send_to(
                &peer,
                Envelope::PeerJoined {
                    peer_id: first.to_string(),
                    topic: topic.clone(),
                },
            );
        }

        self.metrics.joins_total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(peer = %peer, topic = %topic, members = existing.len() + 1, "peer joined");
        peer
    }

    /// Fan a data payload out, verbatim, to every other member of the
    /// sender's topic whose socket is open. Content is never inspected.
    pub(crate) fn relay_data(&self, sender: &PeerId, data: String) {
        let topic = match self.peers.get(sender) {
            Some(handle) => handle.topic.clone(),
            None => return,
        };

        let recipients: Vec<PeerId> = match self.topics.get(&topic) {
            Some(members) => members.iter().filter(|p| *p != sender).cloned().collect(),
            None => return,
        };

        let mut delivered = 0u64;
        for recipient in &recipients {
            let envelope = Envelope::Data {
                peer_id: Some(sender.to_string()),
                data: data.clone(),
            };
            if self.send_to(recipient, envelope) {
                delivered += 1;
                self.metrics
                    .bytes_relayed
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
            }
        }

        self.metrics.envelopes_relayed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(from = %sender, topic = %topic, delivered, "data relayed");
    }

    /// Remove a peer. Deletes its topic when the member set empties,
    /// otherwise announces `peer-left` to the remaining members. Socket
    /// close, socket error, and the liveness sweep all route through here.
    pub(crate) fn disconnect(&self, peer: &PeerId) {
        let handle = match self.peers.remove(peer) {
            Some((_, handle)) => handle,
            None => return,
        };
        let topic = handle.topic;

        let remaining: Vec<PeerId> = {
            let mut emptied = false;
            let remaining = match self.topics.get_mut(&topic) {
                Some(mut members) => {
                    members.remove(peer);
                    emptied = members.is_empty();
                    members.iter().cloned().collect()
                }
                None => Vec::new(),
            };
            if emptied {
                self.topics.remove_if(&topic, |_, members| members.is_empty());
            }
            remaining
        };

        for member in &remaining {
            self.send_to(
                member,
                Envelope::PeerLeft {
                    peer_id: peer.to_string(),
                    topic: topic.clone(),
                },
            );
        }

        tracing::debug!(peer = %peer, topic = %topic, remaining = remaining.len(), "peer disconnected");
    }

    /// Force-disconnect every peer whose outbound channel is gone.
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let dead: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|entry| entry.value().sender.is_closed())
            .map(|entry| entry.key().clone())
            .collect();

        for peer in &dead {
            tracing::debug!(peer = %peer, "sweeping dead connection");
            self.disconnect(peer);
        }
        dead.len()
    }

    /// Read-only per-topic member counts, for stats emission.
    pub fn topic_stats(&self) -> Vec<(String, usize)> {
        self.topics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }

    /// Total topics with at least one member.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Total connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn send_to(&self, peer: &PeerId, envelope: Envelope) -> bool {
        match self.peers.get(peer) {
            Some(handle) => handle.sender.send(envelope).is_ok(),
            None => false,
        }
    }
}
