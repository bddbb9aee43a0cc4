//! # drift-relay
//!
//! Topic-scoped relay server for driftkv.
//!
//! The relay groups connected peers by topic and forwards opaque payloads
//! between peers sharing a topic. It never inspects or persists payload
//! content, and a restart loses all topic membership by design: clients
//! simply rejoin.
//!
//! ## Architecture
//!
//! ```text
//! Replica A ──┐                    ┌── Replica B
//!             │   TCP (JSON        │
//!             │   envelopes)       │
//!         ┌───┴────────────────────┴───┐
//!         │        drift-relay         │
//!         │  topics: Topic -> {peers}  │
//!         │  (memory only, no storage) │
//!         └────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Length-prefix framed JSON envelopes on a single TCP port:
//! - `join {topic, peerId?}` - enter a topic (first message, required)
//! - `data {data}` - fan out to every other peer in the sender's topic
//! - `peer-joined` / `peer-left` - membership events (server to client)
//! - `error {payload}` - per-connection rejection, never fatal to others

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod sweep;

pub use config::Config;
pub use error::{ProtocolError, RelayError};
pub use server::{RelayMetrics, RelayServer};
