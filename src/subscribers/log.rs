//! # LogWriter: event renderer over `tracing`
//!
//! A minimal subscriber that renders incoming [`Event`]s as structured
//! `tracing` records. Install a `tracing` subscriber to see the output.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO camvisor: session connected device=0 package="com.example.cam" kind=Exclusive
//! WARN camvisor: session rejected device=0 reason="already_in_use"
//! WARN camvisor: liveness lost endpoint=EndpointId(7) device=Some(0)
//! INFO camvisor: device released device=0
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let device = e.device;
        let package = e.package.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::SessionConnected => {
                tracing::info!(?device, package, kind = ?e.session, "session connected");
            }
            EventKind::SessionRejected => {
                tracing::warn!(?device, package, reason, "session rejected");
            }
            EventKind::SessionDisconnected => {
                tracing::info!(?device, package, kind = ?e.session, "session disconnected");
            }
            EventKind::LivenessLost => {
                tracing::warn!(endpoint = ?e.endpoint, ?device, "liveness lost");
            }
            EventKind::PermissionRevoked => {
                tracing::warn!(?device, package, "device access revoked");
            }
            EventKind::DeviceReleased => {
                tracing::info!(?device, "device released");
            }
            EventKind::SoundsLoaded => {
                tracing::debug!("feedback sounds loaded");
            }
            EventKind::SoundLoadFailed => {
                tracing::error!(reason, "feedback sound failed to load");
            }
            EventKind::SoundsReleased => {
                tracing::debug!("feedback sounds released");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                tracing::warn!(kind = ?e.kind, reason, "subscriber degraded");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
