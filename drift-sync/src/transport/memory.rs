//! In-memory transport for tests.
//!
//! A [`MemoryHub`] plays the relay's role inside one process: connections
//! joining the same topic form a bus, sends fan out to every other member,
//! and a forced-failure knob lets tests drive the auto-fallback chain.

use super::{ConnectionEvent, SyncConnection, SyncTransport, TransportError};
use async_trait::async_trait;
use drift_types::PeerId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};

struct MemberSlot {
    peer: PeerId,
    sender: mpsc::UnboundedSender<ConnectionEvent>,
}

/// In-process rendezvous point shared by [`MemoryTransport`]s.
#[derive(Default)]
pub struct MemoryHub {
    topics: StdMutex<HashMap<String, Vec<MemberSlot>>>,
}

impl MemoryHub {
    /// Create a hub to share between transports.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn join(self: &Arc<Self>, topic: &str) -> Arc<MemoryConnection> {
        let peer = PeerId::random();
        let (sender, events) = mpsc::unbounded_channel();

        let mut topics = self.topics.lock().unwrap();
        let members = topics.entry(topic.to_string()).or_default();

        for member in members.iter() {
            let _ = member.sender.send(ConnectionEvent::PeerJoined {
                peer: peer.clone(),
            });
            let _ = sender.send(ConnectionEvent::PeerJoined {
                peer: member.peer.clone(),
            });
        }

        members.push(MemberSlot {
            peer: peer.clone(),
            sender: sender.clone(),
        });

        Arc::new(MemoryConnection {
            hub: Arc::clone(self),
            topic: topic.to_string(),
            peer,
            events: Mutex::new(events),
            event_tx: sender,
            closed: AtomicBool::new(false),
        })
    }

    fn broadcast(&self, topic: &str, from: &PeerId, bytes: &[u8]) {
        let topics = self.topics.lock().unwrap();
        if let Some(members) = topics.get(topic) {
            for member in members.iter().filter(|m| &m.peer != from) {
                let _ = member.sender.send(ConnectionEvent::Data {
                    peer: from.clone(),
                    bytes: bytes.to_vec(),
                });
            }
        }
    }

    fn leave(&self, topic: &str, peer: &PeerId) {
        let mut topics = self.topics.lock().unwrap();
        if let Some(members) = topics.get_mut(topic) {
            members.retain(|m| &m.peer != peer);
            for member in members.iter() {
                let _ = member.sender.send(ConnectionEvent::PeerLeft {
                    peer: peer.clone(),
                });
            }
            if members.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Number of members currently joined to a topic.
    pub fn member_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Transport over a shared [`MemoryHub`].
pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
    topic: String,
    fail_connects: AtomicBool,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Create a transport joining `topic` on the given hub.
    pub fn new(hub: Arc<MemoryHub>, topic: impl Into<String>) -> Self {
        Self {
            hub,
            topic: topic.into(),
            fail_connects: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Force every subsequent connect/accept to fail (for fallback tests).
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    fn open(&self) -> Result<Arc<dyn SyncConnection>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed("forced failure".into()));
        }
        Ok(self.hub.join(&self.topic))
    }
}

#[async_trait]
impl SyncTransport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, _peer: &str) -> Result<Arc<dyn SyncConnection>, TransportError> {
        self.open()
    }

    async fn accept(&self) -> Result<Arc<dyn SyncConnection>, TransportError> {
        self.open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MemoryConnection {
    hub: Arc<MemoryHub>,
    topic: String,
    peer: PeerId,
    events: Mutex<mpsc::UnboundedReceiver<ConnectionEvent>>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    closed: AtomicBool,
}

#[async_trait]
impl SyncConnection for MemoryConnection {
    fn peer_id(&self) -> &PeerId {
        &self.peer
    }

    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.hub.broadcast(&self.topic, &self.peer, bytes);
        Ok(())
    }

    async fn recv(&self) -> Result<ConnectionEvent, TransportError> {
        match self.events.lock().await.recv().await {
            Some(event) => Ok(event),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.hub.leave(&self.topic, &self.peer);
        let _ = self.event_tx.send(ConnectionEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_excludes_the_sender() {
        let hub = MemoryHub::new();
        let t1 = MemoryTransport::new(Arc::clone(&hub), "multi");
        let t2 = MemoryTransport::new(Arc::clone(&hub), "multi");
        let t3 = MemoryTransport::new(Arc::clone(&hub), "multi");

        let c1 = t1.connect("").await.unwrap();
        let c2 = t2.connect("").await.unwrap();
        let c3 = t3.connect("").await.unwrap();

        // Drain join events.
        let _ = c2.recv().await.unwrap();
        let _ = c3.recv().await.unwrap();
        let _ = c3.recv().await.unwrap();
        let _ = c1.recv().await.unwrap();
        let _ = c1.recv().await.unwrap();
        let _ = c2.recv().await.unwrap();

        c1.send(b"hello").await.unwrap();

        for receiver in [&c2, &c3] {
            match receiver.recv().await.unwrap() {
                ConnectionEvent::Data { peer, bytes } => {
                    assert_eq!(&peer, c1.peer_id());
                    assert_eq!(bytes, b"hello");
                }
                other => panic!("expected data, got {:?}", other),
            }
        }

        // No self-delivery: c1's queue stays empty.
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            c1.recv(),
        )
        .await;
        assert!(pending.is_err(), "sender must not receive its own data");
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let hub = MemoryHub::new();
        let tx = MemoryTransport::new(Arc::clone(&hub), "topic-x");
        let ty = MemoryTransport::new(Arc::clone(&hub), "topic-y");

        let cx = tx.connect("").await.unwrap();
        let cy = ty.connect("").await.unwrap();

        cx.send(b"x only").await.unwrap();

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            cy.recv(),
        )
        .await;
        assert!(pending.is_err(), "traffic must not cross topics");
    }

    #[tokio::test]
    async fn close_notifies_remaining_members() {
        let hub = MemoryHub::new();
        let t1 = MemoryTransport::new(Arc::clone(&hub), "t");
        let t2 = MemoryTransport::new(Arc::clone(&hub), "t");

        let c1 = t1.connect("").await.unwrap();
        let c2 = t2.connect("").await.unwrap();
        let _ = c1.recv().await.unwrap(); // c2 joined
        let _ = c2.recv().await.unwrap(); // c1 joined

        let leaving = c2.peer_id().clone();
        c2.close().await;

        match c1.recv().await.unwrap() {
            ConnectionEvent::PeerLeft { peer } => assert_eq!(peer, leaving),
            other => panic!("expected peer-left, got {:?}", other),
        }
        assert_eq!(hub.member_count("t"), 1);
    }

    #[tokio::test]
    async fn forced_failure_rejects_connects() {
        let hub = MemoryHub::new();
        let transport = MemoryTransport::new(hub, "t");
        transport.fail_connects(true);

        assert!(matches!(
            transport.connect("").await,
            Err(TransportError::ConnectionFailed(_))
        ));

        transport.fail_connects(false);
        assert!(transport.connect("").await.is_ok());
    }

    #[tokio::test]
    async fn empty_topic_is_removed() {
        let hub = MemoryHub::new();
        let transport = MemoryTransport::new(Arc::clone(&hub), "t");
        let conn = transport.connect("").await.unwrap();

        assert_eq!(hub.member_count("t"), 1);
        conn.close().await;
        assert_eq!(hub.member_count("t"), 0);
    }
}
