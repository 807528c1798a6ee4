//! Error types used by the camvisor broker and its collaborators.
//!
//! This module defines three enums:
//!
//! - [`BrokerError`]: errors returned synchronously by broker operations.
//! - [`ModuleError`]: status failures reported by the device module.
//! - [`AudioError`]: failures to load a feedback sound asset.
//!
//! All of them provide `as_label` for logs/events.

use std::path::PathBuf;

use thiserror::Error;

/// # Errors returned by the arbitration broker.
///
/// Validation errors never partially mutate the device slot table.
/// Asynchronous failures (permission revoked, liveness lost) are never
/// returned through this type; they are delivered to the affected client
/// and drive an internal disconnect instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// No device module is loaded.
    #[error("device module not loaded")]
    Uninitialized,

    /// The requested device index is outside `0..device_count`.
    #[error("invalid device index {device}")]
    InvalidArgument {
        /// Index as received from the caller.
        device: i64,
    },

    /// Access policy or authorization check failed.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Short description of the failed check.
        reason: String,
    },

    /// The device is owned by another client, or a previous owner is still tearing down.
    #[error("device {device} already in use")]
    AlreadyInUse {
        /// Contended device.
        device: usize,
    },

    /// The device module failed the operation.
    #[error("device {device} failed: {source}")]
    DeviceError {
        /// Device the failure applies to.
        device: usize,
        /// Underlying module status.
        #[source]
        source: ModuleError,
    },

    /// The operation is not supported by this device or session kind.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// No session is linked to the given remote endpoint.
    #[error("no session for remote endpoint")]
    NotFound,

    /// The session was torn down (client died) before the connect completed.
    #[error("connect to device {device} interrupted by session teardown")]
    Interrupted {
        /// Device the connect targeted.
        device: usize,
    },
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use camvisor::BrokerError;
    ///
    /// let err = BrokerError::AlreadyInUse { device: 0 };
    /// assert_eq!(err.as_label(), "already_in_use");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Uninitialized => "uninitialized",
            BrokerError::InvalidArgument { .. } => "invalid_argument",
            BrokerError::PermissionDenied { .. } => "permission_denied",
            BrokerError::AlreadyInUse { .. } => "already_in_use",
            BrokerError::DeviceError { .. } => "device_error",
            BrokerError::Unsupported { .. } => "unsupported",
            BrokerError::NotFound => "not_found",
            BrokerError::Interrupted { .. } => "interrupted",
        }
    }

    pub(crate) fn denied(reason: impl Into<String>) -> Self {
        BrokerError::PermissionDenied {
            reason: reason.into(),
        }
    }
}

/// # Failures reported by the device module.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// The module returned a non-success status code.
    #[error("module status {status}")]
    Status {
        /// Raw status code.
        status: i32,
    },

    /// The device is physically unavailable (unplugged, held by another stack).
    #[error("device unavailable")]
    Unavailable,
}

impl ModuleError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            ModuleError::Status { .. } => "module_status",
            ModuleError::Unavailable => "module_unavailable",
        }
    }
}

/// # Failure to load a feedback sound asset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to load sound {path:?}: {reason}")]
pub struct AudioError {
    /// Asset that failed to load.
    pub path: PathBuf,
    /// Backend-specific description.
    pub reason: String,
}

impl AudioError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        "sound_load_failed"
    }
}
