//! The replication driver: glue between a [`RecordStore`] and open
//! connections.
//!
//! Locally created versions (from the store's replication hook) are
//! serialized onto every attached connection; incoming payloads are applied
//! through the store's remote path; a peer joining triggers a state summary
//! reply. Remote applies never re-enter the outbound path, so updates do not
//! echo between replicas.

use crate::transport::{ConnectionEvent, SyncConnection, TransportError};
use drift_store::RecordStore;
use drift_types::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Replication payload exchanged inside transport `data` frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncMessage {
    /// One new version of one record.
    Update {
        /// The record id.
        id: String,
        /// The version to merge.
        version: Version,
    },
    /// Current winning versions of every record: the reply to a peer join.
    Snapshot {
        /// `(id, version)` pairs, tombstones included.
        entries: Vec<(String, Version)>,
    },
}

impl SyncMessage {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        rmp_serde::to_vec(self).map_err(|e| TransportError::Protocol(e.to_string()))
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        rmp_serde::from_slice(bytes).map_err(|e| TransportError::Protocol(e.to_string()))
    }
}

/// Drives replication for one store over any number of connections.
pub struct ReplicationDriver {
    store: Arc<RecordStore>,
    connections: Arc<Mutex<Vec<Arc<dyn SyncConnection>>>>,
}

impl ReplicationDriver {
    /// Create a driver and install the store's replication hook.
    ///
    /// The returned driver owns an outbound pump task; attach connections
    /// with [`ReplicationDriver::attach`].
    pub fn new(store: Arc<RecordStore>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Version)>();
        store.set_replication_hook(move |id, version| {
            let _ = tx.send((id.to_string(), version.clone()));
        });

        let driver = Arc::new(Self {
            store,
            connections: Arc::new(Mutex::new(Vec::new())),
        });

        let pump = Arc::clone(&driver);
        tokio::spawn(async move {
            while let Some((id, version)) = rx.recv().await {
                let message = SyncMessage::Update { id, version };
                match message.to_bytes() {
                    Ok(bytes) => pump.broadcast(&bytes).await,
                    Err(e) => tracing::error!("failed to encode update: {}", e),
                }
            }
        });

        driver
    }

    /// The store this driver replicates.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Attach a connection and start processing its events.
    pub async fn attach(self: &Arc<Self>, conn: Arc<dyn SyncConnection>) {
        self.connections.lock().await.push(Arc::clone(&conn));
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            driver.run_connection(conn).await;
        });
    }

    /// Number of currently attached connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Close every attached connection.
    pub async fn close(&self) {
        let connections: Vec<_> = self.connections.lock().await.drain(..).collect();
        for conn in connections {
            conn.close().await;
        }
    }

    async fn broadcast(&self, bytes: &[u8]) {
        let connections: Vec<_> = self.connections.lock().await.clone();
        for conn in connections {
            if let Err(e) = conn.send(bytes).await {
                tracing::debug!("replication send failed: {}", e);
            }
        }
    }

    async fn run_connection(&self, conn: Arc<dyn SyncConnection>) {
        loop {
            match conn.recv().await {
                Ok(ConnectionEvent::Data { peer, bytes }) => {
                    match SyncMessage::from_bytes(&bytes) {
                        Ok(SyncMessage::Update { id, version }) => {
                            if let Err(e) = self.store.apply_remote(&id, version) {
                                tracing::warn!(from = %peer, "remote update rejected: {}", e);
                            }
                        }
                        Ok(SyncMessage::Snapshot { entries }) => {
                            tracing::debug!(from = %peer, count = entries.len(),
                                "applying state summary");
                            for (id, version) in entries {
                                if let Err(e) = self.store.apply_remote(&id, version) {
                                    tracing::warn!(from = %peer, "summary entry rejected: {}", e);
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(from = %peer, "undecodable sync payload: {}", e);
                        }
                    }
                }
                Ok(ConnectionEvent::PeerJoined { peer }) => {
                    let entries = self.store.export_versions();
                    if entries.is_empty() {
                        continue;
                    }
                    tracing::debug!(%peer, count = entries.len(),
                        "sending state summary to joined peer");
                    let message = SyncMessage::Snapshot { entries };
                    match message.to_bytes() {
                        Ok(bytes) => {
                            if let Err(e) = conn.send(&bytes).await {
                                tracing::debug!("state summary send failed: {}", e);
                            }
                        }
                        Err(e) => tracing::error!("failed to encode state summary: {}", e),
                    }
                }
                Ok(ConnectionEvent::PeerLeft { peer }) => {
                    tracing::debug!(%peer, "peer left");
                }
                Ok(ConnectionEvent::Closed) => break,
                Err(TransportError::ConnectionClosed) => break,
                Err(e) => {
                    tracing::warn!("connection receive failed: {}", e);
                    break;
                }
            }
        }
        self.connections
            .lock()
            .await
            .retain(|c| !Arc::ptr_eq(c, &conn));
    }
}
