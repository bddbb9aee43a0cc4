//! Direct transport: plain TCP between two replicas, no intermediary.
//!
//! Frames are raw payload bytes under the shared length-prefix framing (no
//! envelope: there is no fan-out to multiplex). When the environment cannot
//! support direct connectivity, `connect` fails within the configured
//! timeout rather than hanging, so the auto chain can fall through.

use super::{ConnectionEvent, SyncConnection, SyncTransport, TransportError};
use crate::framing::{read_frame, write_frame, MAX_FRAME_SIZE};
use async_trait::async_trait;
use drift_types::PeerId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

/// Default connect timeout, matching the configuration default.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for [`DirectTransport`].
#[derive(Debug, Clone)]
pub struct DirectOptions {
    /// Address to listen on for passive opens.
    pub bind_addr: Option<String>,
    /// Default peer address for active opens.
    pub peer_addr: Option<String>,
    /// Bound on every connect attempt.
    pub connect_timeout: Duration,
}

impl Default for DirectOptions {
    fn default() -> Self {
        Self {
            bind_addr: None,
            peer_addr: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// TCP transport without an intermediary.
pub struct DirectTransport {
    options: DirectOptions,
    listener: Mutex<Option<TcpListener>>,
    closed: AtomicBool,
}

impl DirectTransport {
    /// Create a direct transport with the given options.
    pub fn new(options: DirectOptions) -> Self {
        Self {
            options,
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// The bound listen address, binding the listener if needed.
    ///
    /// Useful with a `:0` bind address to learn the ephemeral port.
    pub async fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        let mut slot = self.listener.lock().await;
        self.ensure_bound(&mut slot).await?;
        slot.as_ref()
            .ok_or(TransportError::ConnectionClosed)?
            .local_addr()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }

    async fn ensure_bound(
        &self,
        slot: &mut Option<TcpListener>,
    ) -> Result<(), TransportError> {
        if slot.is_some() {
            return Ok(());
        }
        let bind = self.options.bind_addr.as_deref().ok_or_else(|| {
            TransportError::ConnectionFailed("no bind address configured".into())
        })?;
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tracing::debug!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            "direct transport listening");
        *slot = Some(listener);
        Ok(())
    }
}

#[async_trait]
impl SyncTransport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn connect(&self, peer: &str) -> Result<Arc<dyn SyncConnection>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let target = if peer.is_empty() {
            self.options.peer_addr.clone()
        } else {
            Some(peer.to_string())
        };
        let addr = target.ok_or_else(|| {
            TransportError::ConnectionFailed("no peer address configured".into())
        })?;

        let stream =
            match tokio::time::timeout(self.options.connect_timeout, TcpStream::connect(&addr))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(TransportError::ConnectionFailed(e.to_string())),
                Err(_) => return Err(TransportError::Timeout),
            };

        Ok(DirectConnection::spawn(stream))
    }

    async fn accept(&self) -> Result<Arc<dyn SyncConnection>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let mut slot = self.listener.lock().await;
        self.ensure_bound(&mut slot).await?;
        let listener = slot.as_ref().ok_or(TransportError::ConnectionClosed)?;

        let (stream, addr) = listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        tracing::debug!(%addr, "direct connection accepted");
        Ok(DirectConnection::spawn(stream))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Drop the listener if nothing is blocked on it; a pending accept
        // rejects its next connection via the closed flag.
        if let Ok(mut slot) = self.listener.try_lock() {
            *slot = None;
        }
    }
}

/// One established direct connection.
struct DirectConnection {
    local: PeerId,
    writer: Mutex<OwnedWriteHalf>,
    events: Mutex<mpsc::UnboundedReceiver<ConnectionEvent>>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    closed: AtomicBool,
}

impl DirectConnection {
    fn spawn(stream: TcpStream) -> Arc<dyn SyncConnection> {
        let local = PeerId::new(format!(
            "direct:{}",
            stream
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".into())
        ));
        let remote = PeerId::new(format!(
            "direct:{}",
            stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".into())
        ));

        let (mut read_half, write_half) = stream.into_split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Surface the remote end immediately so both replication drivers
        // exchange state summaries on establishment.
        let _ = event_tx.send(ConnectionEvent::PeerJoined {
            peer: remote.clone(),
        });

        let reader_tx = event_tx.clone();
        tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half, MAX_FRAME_SIZE).await {
                    Ok(bytes) => {
                        let event = ConnectionEvent::Data {
                            peer: remote.clone(),
                            bytes,
                        };
                        if reader_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("direct connection ended: {}", e);
                        let _ = reader_tx.send(ConnectionEvent::PeerLeft {
                            peer: remote.clone(),
                        });
                        let _ = reader_tx.send(ConnectionEvent::Closed);
                        break;
                    }
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
}

#[async_trait]
impl SyncConnection for DirectConnection {
    fn peer_id(&self) -> &PeerId {
        &self.local
    }

    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        write_frame(&mut *writer, bytes)
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
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.event_tx.send(ConnectionEvent::Closed);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
