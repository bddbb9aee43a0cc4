//! Transport abstraction for driftkv.
//!
//! A [`SyncTransport`] establishes [`SyncConnection`]s; a connection is a
//! bidirectional byte stream with per-peer attribution on incoming events.
//! Implementations:
//!
//! - [`DirectTransport`] - plain TCP, no intermediary
//! - [`RelayTransport`] - tunnelled through a relay server by topic
//! - [`AutoTransport`] - ordered fallback chain over the others
//! - [`MemoryTransport`] - in-process hub for tests
//!
//! Every transport is named for diagnostics and configuration selection.

mod auto;
mod direct;
mod memory;
mod relay;

pub use auto::AutoTransport;
pub use direct::{DirectOptions, DirectTransport};
pub use memory::{MemoryHub, MemoryTransport};
pub use relay::RelayTransport;

use async_trait::async_trait;
use drift_types::PeerId;
use std::sync::Arc;
use thiserror::Error;

/// One transport's failure inside an [`AutoTransport`] chain.
#[derive(Debug, Clone)]
pub struct TransportFailure {
    /// Name of the transport that failed.
    pub transport: String,
    /// Why it failed.
    pub reason: String,
}

fn format_failures(failures: &[TransportFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.transport, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A connect attempt exceeded its timeout.
    #[error("connection timeout")]
    Timeout,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Malformed wire traffic.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Every transport in an auto chain failed; carries each reason so
    /// operators can diagnose which layer is blocked.
    #[error("all transports failed: {}", format_failures(.0))]
    AllTransportsFailed(Vec<TransportFailure>),
}

/// Events delivered by [`SyncConnection::recv`].
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A peer became reachable on this connection.
    PeerJoined {
        /// The peer that joined.
        peer: PeerId,
    },
    /// A peer is no longer reachable on this connection.
    PeerLeft {
        /// The peer that left.
        peer: PeerId,
    },
    /// Payload bytes from a peer.
    Data {
        /// The originating peer.
        peer: PeerId,
        /// The payload.
        bytes: Vec<u8>,
    },
    /// The connection itself is gone. Terminal: no events follow.
    Closed,
}

/// An open bidirectional byte stream to one or more peers.
#[async_trait]
pub trait SyncConnection: Send + Sync {
    /// The local end's identity on this connection.
    fn peer_id(&self) -> &PeerId;

    /// Send payload bytes. Fails with [`TransportError::ConnectionClosed`]
    /// once the connection is closed.
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Receive the next event. A dropped connection yields
    /// [`ConnectionEvent::Closed`] rather than hanging; calling again after
    /// that fails with [`TransportError::ConnectionClosed`].
    async fn recv(&self) -> Result<ConnectionEvent, TransportError>;

    /// Close the connection. Idempotent; safe to call concurrently with
    /// in-flight sends, which then fail fast.
    async fn close(&self);
}

/// A way of establishing [`SyncConnection`]s.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Transport name for diagnostics (`"direct"`, `"relay"`, `"auto"`, ...).
    fn name(&self) -> &'static str;

    /// Active open. `peer` is a transport-specific hint (an address for
    /// direct, ignored by relay); empty means "use the configured target".
    /// Must fail within the transport's connect timeout rather than hang.
    async fn connect(&self, peer: &str) -> Result<Arc<dyn SyncConnection>, TransportError>;

    /// Passive open. May be called any number of times; each accepted
    /// connection is delivered exactly once.
    async fn accept(&self) -> Result<Arc<dyn SyncConnection>, TransportError>;

    /// Tear down all connections and release resources. Idempotent.
    async fn close(&self);
}
