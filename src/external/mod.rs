//! Interfaces of the collaborators the broker depends on.
//!
//! None of these are implemented here; the embedding process supplies them:
//! - [`DeviceModule`]: the hardware module
//! - [`PermissionAuthority`]: transport permissions and per-operation tracking
//! - [`RemoteEndpoint`] / [`ClientCallbacks`]: the RPC transport's view of a client
//! - [`AudioBackend`]: decoding/playback for feedback sounds

mod audio;
mod endpoint;
mod module;
mod permission;

pub use audio::{AudioBackend, SoundPlayer};
pub use endpoint::{
    CallerContext, ClientCallbacks, ClientError, DeathRecipient, EndpointId, RemoteEndpoint,
};
pub use module::{
    ApiVersion, DeviceApi, DeviceCookie, DeviceInfo, DeviceModule, DeviceNotification, Facing,
    ModuleInfo,
};
pub use permission::{
    OpListener, OpMode, Operation, Permission, PermissionAuthority, SubscriptionId,
};
