//! # Permission authority interface.
//!
//! Two independent layers are consulted:
//! - **transport permissions** ([`Permission`]) checked against the calling
//!   process before a request is dispatched;
//! - **operation tracking** ([`Operation`]) checked per session, with a
//!   subscription that reports revocations asynchronously.

use std::sync::Arc;

use super::CallerContext;

/// Transport-level permission checked at the dispatch gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Open a camera device.
    Camera,
    /// Read the diagnostic dump.
    Dump,
}

/// Tracked operation a session performs on behalf of a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Device access.
    Camera,
    /// Any other operation code delivered by the authority.
    Other(i32),
}

/// Authorization decision for an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpMode {
    /// The operation is allowed.
    Allowed,
    /// The operation is silently ignored.
    Ignored,
    /// The operation is rejected with an error.
    Errored,
}

impl OpMode {
    /// True only for [`OpMode::Allowed`].
    #[inline]
    pub fn is_allowed(self) -> bool {
        matches!(self, OpMode::Allowed)
    }
}

/// Handle returned by [`PermissionAuthority::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receives operation-mode changes for a package.
pub trait OpListener: Send + Sync {
    /// Called (possibly from any thread) when the mode of `op` changed for `package`.
    fn op_changed(&self, op: Operation, package: &str);
}

/// External authority deciding who may use the devices.
pub trait PermissionAuthority: Send + Sync + 'static {
    /// Checks a transport-level permission for the calling process.
    fn check_permission(&self, permission: Permission, caller: CallerContext) -> bool;

    /// Starts tracking `op` for `(uid, package)` and returns the current decision.
    fn authorize(&self, op: Operation, uid: u32, package: &str) -> OpMode;

    /// Re-checks the current decision without starting anything.
    fn check(&self, op: Operation, uid: u32, package: &str) -> OpMode;

    /// Stops tracking an operation started with [`PermissionAuthority::authorize`].
    fn finish(&self, op: Operation, uid: u32, package: &str);

    /// Subscribes to mode changes of `op` for `package`.
    fn subscribe(&self, op: Operation, package: &str, listener: Arc<dyn OpListener>)
    -> SubscriptionId;

    /// Drops a subscription; unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
