//! # drift-types
//!
//! Wire format and identity types for the driftkv replicated store.
//!
//! This crate provides the foundational types used across all driftkv crates:
//! - [`ActorId`], [`PeerId`], [`Topic`] - Identity and scoping types
//! - [`VectorClock`] - Causal metadata attached to every record version
//! - [`Record`], [`Version`] - The replicated data model
//! - [`Envelope`] - The relay wire envelope
//! - [`WireError`] - Wire-level error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod clock;
mod envelope;
mod error;
mod ids;
mod record;

pub use clock::VectorClock;
pub use envelope::Envelope;
pub use error::WireError;
pub use ids::{ActorId, PeerId, Topic};
pub use record::{now_millis, Record, Version};
