//! # Remote endpoint and transport identity.
//!
//! A remote client is reachable through two handles:
//! - its [`RemoteEndpoint`], an opaque comparable connection identity that can
//!   report its own termination exactly once;
//! - its [`ClientCallbacks`], used for fire-and-forget notifications.

use std::sync::{Arc, Weak};

/// Comparable identity of a remote transport connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointId(pub u64);

/// Process and user identity of a caller, as derived by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallerContext {
    /// Calling process id.
    pub pid: u32,
    /// Calling user id.
    pub uid: u32,
}

/// Receives liveness-loss notifications.
pub trait DeathRecipient: Send + Sync {
    /// Called once when the connection identified by `endpoint` terminates.
    fn endpoint_died(&self, endpoint: EndpointId);
}

/// Transport connection of a remote client.
pub trait RemoteEndpoint: Send + Sync {
    /// Stable identity of the connection.
    fn id(&self) -> EndpointId;

    /// Registers a recipient fired once when the connection terminates.
    ///
    /// Returns `false` without registering if the connection is already dead.
    /// Must not invoke the recipient from within this call.
    fn link_to_death(&self, recipient: Weak<dyn DeathRecipient>) -> bool;

    /// Unregisters a recipient; unknown recipients are ignored.
    fn unlink_to_death(&self, recipient: &Weak<dyn DeathRecipient>);
}

/// Asynchronous error delivered to a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientError {
    /// The device was taken away from the client (revocation, forced release).
    Released,
    /// The device module reported an unrecoverable failure.
    DeviceFailure(i32),
}

/// Callback surface of a remote client.
///
/// Delivery is best effort; the broker never waits for or depends on receipt.
pub trait ClientCallbacks: Send + Sync {
    /// Transport connection these callbacks travel over.
    fn endpoint(&self) -> Arc<dyn RemoteEndpoint>;

    /// Notifies the client of an asynchronous error.
    fn notify_error(&self, error: ClientError);
}
