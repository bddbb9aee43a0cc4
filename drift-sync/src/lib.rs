//! # drift-sync
//!
//! Transport layer and replication driver for driftkv.
//!
//! This crate moves record versions between replicas:
//!
//! - [`transport`] - the [`SyncConnection`]/[`SyncTransport`] abstraction
//!   with direct (TCP), relay, auto-fallback, and in-memory implementations
//! - [`ReplicationDriver`] - glues a [`drift_store::RecordStore`] to open
//!   connections: local writes out, remote writes in, state summaries to
//!   newly joined peers
//! - [`TransportConfig`] - startup configuration resolved once by the
//!   composing application
//!
//! ## Example
//!
//! ```ignore
//! let store = Arc::new(RecordStore::new(ActorId::random()));
//! let transport = config.build(topic, PeerId::random())?;
//! let driver = ReplicationDriver::new(Arc::clone(&store));
//! driver.attach(transport.connect("").await?);
//!
//! store.put("user:1", json!({"name": "Alice"}))?; // replicated
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod driver;
pub mod framing;
pub mod transport;

pub use config::{TransportConfig, TransportMode, DEFAULT_CONNECTION_TIMEOUT_MS};
pub use driver::{ReplicationDriver, SyncMessage};
pub use transport::{
    ConnectionEvent, SyncConnection, SyncTransport, TransportError, TransportFailure,
};
