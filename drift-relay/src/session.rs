//! Per-connection session handling.
//!
//! Each accepted socket gets a [`Session`]: a small state machine that must
//! see a `join` before anything else, then fans `data` envelopes out through
//! the server. Protocol violations are answered with `error` envelopes or
//! dropped; they never take down other peers or topics.

use crate::error::{ProtocolError, ProtocolResult};
use crate::server::RelayServer;
use drift_types::{Envelope, PeerId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Session state machine states.
#[derive(Debug, Clone)]
enum SessionState {
    /// Waiting for the join envelope.
    AwaitingJoin,
    /// Joined a topic; relaying data.
    Active {
        /// The peer id assigned at join.
        peer_id: PeerId,
    },
}

/// A per-connection session.
pub struct Session {
    relay: Arc<RelayServer>,
    remote: String,
    state: SessionState,
}

impl Session {
    /// Create a session for one accepted connection.
    pub fn new(relay: Arc<RelayServer>, remote: String) -> Self {
        Self {
            relay,
            remote,
            state: SessionState::AwaitingJoin,
        }
    }

    /// Run the session until the socket closes or errors.
    pub async fn run<S>(mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);

        // Outbound envelopes are funneled through a channel so the server
        // can fan out without touching the socket directly.
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let writer_task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let bytes = match envelope.to_bytes() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!("failed to encode envelope: {}", e);
                        continue;
                    }
                };
                if write_frame(&mut writer, &bytes).await.is_err() {
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        let max_frame = self.relay.config().limits.max_frame_size;
        let join_timeout = Duration::from_secs(self.relay.config().limits.join_timeout_secs);

        loop {
            let frame = if matches!(self.state, SessionState::AwaitingJoin) {
                // Bound the pre-join wait so half-open connections cannot
                // hold resources forever.
                match tokio::time::timeout(join_timeout, read_frame(&mut reader, max_frame)).await
                {
                    Ok(Ok(frame)) => frame,
                    Ok(Err(e)) => {
                        tracing::debug!(remote = %self.remote, "closed before join: {}", e);
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(remote = %self.remote, "join timeout");
                        break;
                    }
                }
            } else {
                match read_frame(&mut reader, max_frame).await {
                    Ok(frame) => frame,
                    Err(e) => {
                        // Covers both socket loss and an oversized frame;
                        // either way the stream is unusable.
                        tracing::debug!(remote = %self.remote, "connection closed: {}", e);
                        break;
                    }
                }
            };

            let envelope = match Envelope::from_bytes(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    let err = ProtocolError::InvalidEnvelope {
                        reason: e.to_string(),
                    };
                    tracing::warn!(remote = %self.remote, "dropping envelope: {}", err);
                    self.relay
                        .metrics()
                        .protocol_errors
                        .fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            self.handle_envelope(envelope, &tx);
        }

        if let SessionState::Active { peer_id } = &self.state {
            self.relay.disconnect(peer_id);
        }

        drop(tx);
        let _ = writer_task.await;
    }

    fn handle_envelope(&mut self, envelope: Envelope, tx: &mpsc::UnboundedSender<Envelope>) {
        let active_peer = match &self.state {
            SessionState::Active { peer_id } => Some(peer_id.clone()),
            SessionState::AwaitingJoin => None,
        };

        match envelope {
            Envelope::Join { topic, peer_id } => {
                if active_peer.is_some() {
                    // The topic is set exactly once per connection.
                    self.reject(tx, ProtocolError::AlreadyJoined);
                } else if topic.is_empty() {
                    self.reject(tx, ProtocolError::MissingTopic);
                } else {
                    let peer = self
                        .relay
                        .join(topic, peer_id.map(PeerId::new), tx.clone());
                    tracing::info!(remote = %self.remote, peer = %peer, "session joined");
                    self.state = SessionState::Active { peer_id: peer };
                }
            }
            Envelope::Data { data, .. } => match &active_peer {
                Some(peer) => self.relay.relay_data(peer, data),
                None => self.reject(tx, ProtocolError::JoinRequired),
            },
            // Server-to-client envelopes have no business arriving here.
            other => {
                tracing::debug!(remote = %self.remote, "unexpected envelope dropped: {:?}", other);
                self.relay
                    .metrics()
                    .protocol_errors
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn reject(&self, tx: &mpsc::UnboundedSender<Envelope>, error: ProtocolError) {
        tracing::debug!(remote = %self.remote, "rejecting envelope: {}", error);
        self.relay
            .metrics()
            .protocol_errors
            .fetch_add(1, Ordering::Relaxed);
        let _ = tx.send(Envelope::Error {
            payload: error.to_string(),
        });
    }
}

/// Read one length-prefixed frame (4-byte big-endian length, then payload).
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_size: usize,
) -> ProtocolResult<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| ProtocolError::Stream(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            limit: max_size,
        });
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| ProtocolError::Stream(e.to_string()))?;
    Ok(buf)
}

/// Write one length-prefixed frame.
async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> ProtocolResult<()> {
    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| ProtocolError::Stream(e.to_string()))?;
    writer
        .write_all(bytes)
        .await
        .map_err(|e| ProtocolError::Stream(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| ProtocolError::Stream(e.to_string()))?;
    Ok(())
}
