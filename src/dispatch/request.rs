use std::sync::Arc;

use crate::broker::{CameraInfo, ClientUid};
use crate::external::ClientCallbacks;
use crate::session::{ExclusiveSession, SharedSession};

/// A client request as decoded by the transport.
pub enum Request {
    /// Open an exclusive session.
    Connect {
        callbacks: Arc<dyn ClientCallbacks>,
        device: i32,
        package: String,
        client_uid: ClientUid,
    },
    /// Attach a shared session.
    ConnectShared {
        callbacks: Arc<dyn ClientCallbacks>,
        device: i32,
        package: String,
    },
    /// Number of devices.
    DeviceCount,
    /// Static information about one device.
    DeviceInfo { device: i32 },
    /// Diagnostic dump with its arguments.
    Dump { args: Vec<String> },
}

impl Request {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Connect { .. } => "connect",
            Request::ConnectShared { .. } => "connect_shared",
            Request::DeviceCount => "device_count",
            Request::DeviceInfo { .. } => "device_info",
            Request::Dump { .. } => "dump",
        }
    }

    /// True for requests that attach a session and therefore pass the camera gate.
    pub fn opens_session(&self) -> bool {
        matches!(self, Request::Connect { .. } | Request::ConnectShared { .. })
    }
}

/// Successful reply to a [`Request`].
pub enum Reply {
    Exclusive(Arc<ExclusiveSession>),
    Shared(Arc<SharedSession>),
    DeviceCount(usize),
    DeviceInfo(CameraInfo),
    Dump(String),
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Exclusive(s) => f.debug_tuple("Exclusive").field(&s.device()).finish(),
            Reply::Shared(s) => f.debug_tuple("Shared").field(&s.device()).finish(),
            Reply::DeviceCount(n) => f.debug_tuple("DeviceCount").field(n).finish(),
            Reply::DeviceInfo(info) => f.debug_tuple("DeviceInfo").field(info).finish(),
            Reply::Dump(text) => f.debug_tuple("Dump").field(&text.len()).finish(),
        }
    }
}
