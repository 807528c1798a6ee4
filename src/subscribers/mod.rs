//! # Event subscribers for the broker.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Broker / sessions / sound pool ── publish(Event) ──► Bus
//!                                                       │
//!                                   subscriber listener (Broker) ──► SubscriberSet::emit
//!                                                       ┌─────────┼─────────┐
//!                                                       ▼         ▼         ▼
//!                                                   LogWriter   Audit    Custom
//! ```

mod log;
mod set;
mod subscriber;

#[cfg_attr(not(feature = "logging"), allow(unused_imports))]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
