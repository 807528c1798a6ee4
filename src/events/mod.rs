//! Broker events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Broker` (connect/reject/liveness), sessions (teardown,
//!   revocation), `SoundPool` (load/release), `SubscriberSet` (overflow/panic).
//! - **Consumers**: the broker's subscriber listener, which fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
