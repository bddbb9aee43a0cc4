//! Relay transport (client side).
//!
//! Tunnels connections through a relay server using topic-based rendezvous:
//! one TCP socket to the relay, multiplexed by the [`Envelope`] sum type.
//! Outgoing payloads are base64-wrapped `data` envelopes; the relay fans
//! them out to every other peer in the topic, so a single connection here is
//! a bus over the whole topic with per-peer attribution on incoming events.

use super::{ConnectionEvent, SyncConnection, SyncTransport, TransportError};
use crate::framing::{read_frame, write_frame, MAX_FRAME_SIZE};
use async_trait::async_trait;
use drift_types::{Envelope, PeerId, Topic};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

/// Transport that rendezvouses through a relay server.
pub struct RelayTransport {
    relay_addr: String,
    topic: Topic,
    local_peer: PeerId,
    connect_timeout: Duration,
    closed: AtomicBool,
    active: Mutex<Vec<Arc<RelayConnection>>>,
}

impl RelayTransport {
    /// Create a relay transport targeting `relay_addr`, scoped to `topic`.
    pub fn new(relay_addr: impl Into<String>, topic: Topic, peer: PeerId) -> Self {
        Self::with_timeout(relay_addr, topic, peer, super::direct::DEFAULT_CONNECT_TIMEOUT)
    }

    /// Same as [`RelayTransport::new`] with an explicit connect timeout.
    pub fn with_timeout(
        relay_addr: impl Into<String>,
        topic: Topic,
        peer: PeerId,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            topic,
            local_peer: peer,
            connect_timeout,
            closed: AtomicBool::new(false),
            active: Mutex::new(Vec::new()),
        }
    }

    /// Dial the relay, join the topic, and return the topic bus connection.
    async fn open(&self) -> Result<Arc<dyn SyncConnection>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(&self.relay_addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TransportError::ConnectionFailed(e.to_string())),
            Err(_) => return Err(TransportError::Timeout),
        };

        let (read_half, mut write_half) = stream.into_split();

        let join = Envelope::Join {
            topic: self.topic.as_str().to_string(),
            peer_id: Some(self.local_peer.to_string()),
        };
        let bytes = join
            .to_bytes()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        write_frame(&mut write_half, &bytes)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        tracing::debug!(relay = %self.relay_addr, topic = ?self.topic, "joined relay topic");

        let conn = RelayConnection::spawn(self.local_peer.clone(), read_half, write_half);
        self.active.lock().await.push(Arc::clone(&conn));
        Ok(conn)
    }
}

#[async_trait]
impl SyncTransport for RelayTransport {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn connect(&self, _peer: &str) -> Result<Arc<dyn SyncConnection>, TransportError> {
        self.open().await
    }

    // The rendezvous is symmetric: listening means joining the topic and
    // waiting for peers to appear on the bus.
    async fn accept(&self) -> Result<Arc<dyn SyncConnection>, TransportError> {
        self.open().await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let connections: Vec<_> = self.active.lock().await.drain(..).collect();
        for conn in connections {
            conn.close_connection().await;
        }
    }
}

/// One joined relay socket: a bus over the whole topic.
struct RelayConnection {
    local: PeerId,
    writer: Mutex<OwnedWriteHalf>,
    events: Mutex<mpsc::UnboundedReceiver<ConnectionEvent>>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    closed: AtomicBool,
}

impl RelayConnection {
    fn spawn(
        local: PeerId,
        mut read_half: tokio::net::tcp::OwnedReadHalf,
        write_half: OwnedWriteHalf,
    ) -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let reader_tx = event_tx.clone();
        tokio::spawn(async move {
            loop {
                let frame = match read_frame(&mut read_half, MAX_FRAME_SIZE).await {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::debug!("relay connection ended: {}", e);
                        let _ = reader_tx.send(ConnectionEvent::Closed);
                        break;
                    }
                };

                let event = match Envelope::from_bytes(&frame) {
                    Ok(Envelope::Data {
                        peer_id: Some(peer),
                        data,
                    }) => match Envelope::decode_data(&data) {
                        Ok(bytes) => ConnectionEvent::Data {
                            peer: PeerId::new(peer),
                            bytes,
                        },
                        Err(e) => {
                            tracing::warn!("undecodable relay payload dropped: {}", e);
                            continue;
                        }
                    },
                    Ok(Envelope::Data { peer_id: None, .. }) => {
                        tracing::warn!("relay data without origin dropped");
                        continue;
                    }
                    Ok(Envelope::PeerJoined { peer_id, .. }) => ConnectionEvent::PeerJoined {
                        peer: PeerId::new(peer_id),
                    },
                    Ok(Envelope::PeerLeft { peer_id, .. }) => ConnectionEvent::PeerLeft {
                        peer: PeerId::new(peer_id),
                    },
                    Ok(Envelope::Error { payload }) => {
                        // Surfaced locally; must not take the transport down.
                        tracing::warn!("relay reported error: {}", payload);
                        continue;
                    }
                    Ok(Envelope::Join { .. }) => {
                        tracing::warn!("unexpected join envelope from relay dropped");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("malformed relay envelope dropped: {}", e);
                        continue;
                    }
                };

                if reader_tx.send(event).is_err() {
                    break;
                }
            }
        });

        Arc::new(Self {
            local,
            writer: Mutex::new(write_half),
            events: Mutex::new(event_rx),
            event_tx,
            closed: AtomicBool::new(false),
        })
    }

    async fn close_connection(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.event_tx.send(ConnectionEvent::Closed);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

#[async_trait]
impl SyncConnection for RelayConnection {
    fn peer_id(&self) -> &PeerId {
        &self.local
    }

    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let envelope = Envelope::data_from_bytes(None, bytes);
        let frame = envelope
            .to_bytes()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        let mut writer = self.writer.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        write_frame(&mut *writer, &frame)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<ConnectionEvent, TransportError> {
        match self.events.lock().await.recv().await {
            Some(event) => Ok(event),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&self) {
        self.close_connection().await;
    }
}
