//! # Request dispatch.
//!
//! The transport hands decoded [`Request`]s to a [`Dispatcher`], which applies
//! the transport permission gate and routes them to the broker:
//!
//! ```text
//! DispatchHandle::call / try_call
//!        │  (bounded queue)
//!        ▼
//! Dispatcher::run ──► spawn_blocking(dispatch) ──► oneshot reply
//!                        ├─ gate: Connect / ConnectShared from a foreign pid
//!                        │        need Permission::Camera
//!                        └─ route: Broker::{connect, connect_shared, device_count,
//!                                          device_info, dump}
//! ```
//!
//! [`Dispatcher::dispatch`] is also usable directly by synchronous transports.

mod core;
mod error;
mod request;

pub use self::core::{DispatchHandle, Dispatcher, PendingReply};
pub use error::DispatchError;
pub use request::{Reply, Request};
