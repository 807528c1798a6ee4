//! # Client sessions.
//!
//! A session is a client's live attachment to one device. Two kinds exist:
//!
//! - [`ExclusiveSession`]: sole control of a device; sets the busy flag for its
//!   whole lifetime and owns the device open/close handshake.
//! - [`SharedSession`]: coexists with any number of others on an advanced
//!   device; its device-control surface is rejected as unsupported.
//!
//! Both share a common core (identity, permission watch, teardown claim) and
//! are addressed uniformly through [`Session`].
//!
//! ## Reference model
//! The client and in-flight requests hold strong handles (`Arc`). The broker's
//! slot table holds **only weak** handles. When the last strong handle goes
//! away the session tears itself down; an explicit [`Session::disconnect`]
//! does the same work sooner. Either way teardown runs exactly once.

mod core;
mod exclusive;
mod shared;
mod watch;

use std::sync::{Arc, Weak};

pub(crate) use self::core::SessionParams;
pub use exclusive::ExclusiveSession;
pub use shared::{CaptureRequest, SharedSession};

use self::core::SessionCore;
use crate::external::EndpointId;

/// Kind of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Sole control of a device.
    Exclusive,
    /// Non-exclusive attachment.
    Shared,
}

impl SessionKind {
    /// Returns a short stable label for logs/events.
    pub fn as_label(self) -> &'static str {
        match self {
            SessionKind::Exclusive => "exclusive",
            SessionKind::Shared => "shared",
        }
    }
}

/// Identity of the client a session acts for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Client package name.
    pub package: Arc<str>,
    /// Recorded caller pid; re-homed to the service pid on revocation.
    pub client_pid: u32,
    /// Effective client uid.
    pub client_uid: u32,
    /// Pid of the broker's own process.
    pub service_pid: u32,
}

/// A live session of either kind.
#[derive(Clone)]
pub enum Session {
    /// Exclusive session.
    Exclusive(Arc<ExclusiveSession>),
    /// Shared session.
    Shared(Arc<SharedSession>),
}

impl Session {
    /// Kind of this session.
    pub fn kind(&self) -> SessionKind {
        match self {
            Session::Exclusive(_) => SessionKind::Exclusive,
            Session::Shared(_) => SessionKind::Shared,
        }
    }

    /// Device slot index.
    pub fn device(&self) -> usize {
        self.core().device()
    }

    /// Remote endpoint of the client.
    pub fn endpoint_id(&self) -> EndpointId {
        self.core().endpoint_id()
    }

    /// Snapshot of the client identity.
    pub fn identity(&self) -> ClientIdentity {
        self.core().identity()
    }

    /// Notifies the client that access was withdrawn.
    pub fn notify_error(&self) {
        match self {
            Session::Exclusive(s) => s.notify_error(),
            Session::Shared(s) => s.notify_error(),
        }
    }

    /// Tears the session down. Idempotent.
    pub fn disconnect(&self) {
        match self {
            Session::Exclusive(s) => s.disconnect(),
            Session::Shared(s) => s.disconnect(),
        }
    }

    pub(crate) fn core(&self) -> &SessionCore {
        match self {
            Session::Exclusive(s) => s.core(),
            Session::Shared(s) => s.core(),
        }
    }

    pub(crate) fn describe(&self, out: &mut String) {
        match self {
            Session::Exclusive(s) => s.describe(out),
            Session::Shared(s) => s.describe(out),
        }
    }
}

/// Weak counterpart of [`Session`], held by permission listeners.
#[derive(Clone)]
pub(crate) enum WeakSession {
    Exclusive(Weak<ExclusiveSession>),
    Shared(Weak<SharedSession>),
}

impl WeakSession {
    pub(crate) fn upgrade(&self) -> Option<Session> {
        match self {
            WeakSession::Exclusive(w) => w.upgrade().map(Session::Exclusive),
            WeakSession::Shared(w) => w.upgrade().map(Session::Shared),
        }
    }
}
