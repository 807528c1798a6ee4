//! # Arbitration broker.
//!
//! [`Broker`] is the single authority deciding which client may hold which
//! device. It owns the device slot table, the feedback sound pool, the event
//! bus and the handles to the external collaborators.
//!
//! ## Architecture
//! ```text
//! connect(callbacks, device, package, uid, caller)
//!   ├─► resolve client uid         (forwarded only from the service pid)
//!   ├─► module loaded? index valid? access policy enabled?
//!   ├─► [table lock]
//!   │     owner live + same endpoint ──► return existing session
//!   │     owner live + other endpoint ─► AlreadyInUse
//!   │     (an owner in teardown counts as absent)
//!   │     busy flag set ────────────────► AlreadyInUse
//!   │     resolve device API, construct session (busy = true)
//!   ├─► acquire sounds, permission watch, open device   (no table lock)
//!   ├─► [table lock] publish weak owner entry unless already torn down
//!   └─► link liveness; a dead endpoint or a started teardown ─► disconnect, error
//!
//! endpoint_died(id) ─► remove_by_remote(id) ─► session.disconnect()
//! ```
//!
//! ## Submodules
//! - `slot`: the device slot table and its two lock levels
//! - `builder`: [`BrokerBuilder`]
//! - `dump`: diagnostic dump
//! - [`instance`]: the process-wide registry used by driver callbacks

mod builder;
mod core;
mod dump;
pub mod instance;
mod slot;

pub use builder::BrokerBuilder;
pub use self::core::Broker;

use crate::external::Facing;

/// Which user id a connect request acts for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientUid {
    /// Use the transport-derived caller uid.
    Calling,
    /// Act for the given uid; only the broker's own process may forward.
    Forwarded(u32),
}

/// Static information returned by [`Broker::device_info`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CameraInfo {
    /// Camera facing.
    pub facing: Facing,
    /// Sensor orientation in degrees.
    pub orientation: i32,
}
