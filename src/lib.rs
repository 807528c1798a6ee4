//! # camvisor
//!
//! **Camvisor** is a device-session arbitration broker for shared camera
//! hardware.
//!
//! Many remote clients compete for a small fixed set of devices. The broker
//! grants each device to at most one exclusive owner at a time, lets
//! non-exclusive observers attach to advanced devices, and reclaims devices
//! when a client disconnects, crashes or loses its access permission.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   transport ──► DispatchHandle ──► Dispatcher (permission gate, routing)
//!                                         │
//!                                         ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Broker (arbitration authority)                                   │
//! │  - DeviceTable (busy flag + weak owner + weak shared, per device) │
//! │  - SoundPool (feedback sounds, loaded on first exclusive session) │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Exclusive    │   │ Shared       │   │ Shared       │
//! │ session      │   │ session      │   │ session      │
//! └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!  │ DeviceModule     │ PermissionAuthority (watch, revocation)
//!  │ open / close     │ RemoteEndpoint (liveness)
//!  ▼                  ▼
//!         external collaborators (module, authority, transport, audio)
//! ```
//!
//! ### Reclamation
//! ```text
//! client drops last handle ─────► Drop ─────────────┐
//! client calls disconnect() ────────────────────────┤
//! endpoint dies ──► Broker::on_liveness_lost ───────┤──► teardown (exactly once)
//! access revoked ──► notify_error + disconnect ─────┘      ├─ stop permission watch
//!                                                          ├─ release sounds
//!                                                          ├─ close device
//!                                                          ├─ detach + unlink
//!                                                          └─ clear busy flag (last)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                         |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Arbitration**   | Exclusive/shared sessions, reclamation, diagnostics.         | [`Broker`], [`ExclusiveSession`], [`SharedSession`] |
//! | **Dispatch**      | Transport permission gate and async request queue.            | [`Dispatcher`], [`DispatchHandle`]         |
//! | **Collaborators** | Interfaces the embedding process implements.                  | [`DeviceModule`], [`PermissionAuthority`], [`RemoteEndpoint`], [`AudioBackend`] |
//! | **Subscriber API**| Hook into broker events (logging, audit, custom subscribers). | [`Subscribe`]                              |
//! | **Errors**        | Typed errors for broker operations and collaborators.         | [`BrokerError`], [`ModuleError`]           |
//! | **Configuration** | Centralize broker settings.                                   | [`BrokerConfig`]                           |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Driver callbacks
//! Device modules report shutter, recording and error notifications from
//! their own threads with only a [`DeviceCookie`]. Install the broker with
//! [`instance::install`] and route them through
//! [`instance::dispatch_device_notification`].

mod broker;
mod config;
mod dispatch;
mod error;
mod events;
mod external;
mod session;
mod sound;
mod subscribers;
pub mod verbosity;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use broker::{Broker, BrokerBuilder, CameraInfo, ClientUid, instance};
pub use config::{BrokerConfig, SoundAssets};
pub use dispatch::{DispatchError, DispatchHandle, Dispatcher, PendingReply, Reply, Request};
pub use error::{AudioError, BrokerError, ModuleError};
pub use events::{Bus, Event, EventKind};
pub use external::{
    ApiVersion, AudioBackend, CallerContext, ClientCallbacks, ClientError, DeathRecipient,
    DeviceApi, DeviceCookie, DeviceInfo, DeviceModule, DeviceNotification, EndpointId, Facing,
    ModuleInfo, OpListener, OpMode, Operation, Permission, PermissionAuthority, RemoteEndpoint,
    SoundPlayer, SubscriptionId,
};
pub use session::{
    CaptureRequest, ClientIdentity, ExclusiveSession, Session, SessionKind, SharedSession,
};
pub use sound::{SoundKind, SoundPool};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
