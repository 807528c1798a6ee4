//! # Broker events emitted during session arbitration.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Session events**: connect, reject, disconnect
//! - **Reclamation events**: liveness lost, permission revoked, device released
//! - **Resource events**: feedback sounds loaded/released, subscriber health
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use camvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SessionRejected)
//!     .with_device(0)
//!     .with_package("com.example.camera")
//!     .with_reason("already_in_use");
//!
//! assert_eq!(ev.kind, EventKind::SessionRejected);
//! assert_eq!(ev.device, Some(0));
//! assert_eq!(ev.reason.as_deref(), Some("already_in_use"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::external::EndpointId;
use crate::session::SessionKind;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of broker events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: subscriber name and panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: subscriber name and "full"/"closed"
    SubscriberOverflow,

    // === Session events ===
    /// A session was published in the slot table.
    ///
    /// Sets:
    /// - `device`, `package`, `endpoint`, `session`
    SessionConnected,

    /// A connect request was rejected.
    ///
    /// Sets:
    /// - `device` (when known), `reason`: error label
    SessionRejected,

    /// A session finished its teardown.
    ///
    /// Sets:
    /// - `device`, `package`, `endpoint`, `session`
    SessionDisconnected,

    // === Reclamation events ===
    /// The transport reported that a remote endpoint died.
    ///
    /// Sets:
    /// - `endpoint`, `device` (when a session matched)
    LivenessLost,

    /// Device access was revoked for a live session.
    ///
    /// Sets:
    /// - `device`, `package`, `session`
    PermissionRevoked,

    /// The busy flag of a device was cleared (teardown complete).
    ///
    /// Sets:
    /// - `device`
    DeviceReleased,

    // === Resource events ===
    /// The sound pool loaded its assets (0→1 transition).
    SoundsLoaded,

    /// One feedback sound failed to load.
    ///
    /// Sets:
    /// - `reason`: asset path and backend message
    SoundLoadFailed,

    /// The sound pool released its assets (1→0 transition).
    SoundsReleased,
}

/// Broker event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Device slot index, if applicable.
    pub device: Option<usize>,
    /// Client package name, if applicable.
    pub package: Option<Arc<str>>,
    /// Remote endpoint of the client, if applicable.
    pub endpoint: Option<EndpointId>,
    /// Kind of session involved, if applicable.
    pub session: Option<SessionKind>,
    /// Human-readable reason (error labels, asset paths, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            device: None,
            package: None,
            endpoint: None,
            session: None,
            reason: None,
        }
    }

    /// Attaches a device index.
    #[inline]
    pub fn with_device(mut self, device: usize) -> Self {
        self.device = Some(device);
        self
    }

    /// Attaches a client package name.
    #[inline]
    pub fn with_package(mut self, package: impl Into<Arc<str>>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Attaches a remote endpoint id.
    #[inline]
    pub fn with_endpoint(mut self, endpoint: EndpointId) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Attaches the session kind.
    #[inline]
    pub fn with_session(mut self, kind: SessionKind) -> Self {
        self.session = Some(kind);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }
}
