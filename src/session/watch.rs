//! Permission-change listener registered by every session.
//!
//! The listener holds only a weak handle: the authority may keep it around
//! after the session is gone, and a late callback must then do nothing.

use std::sync::Arc;

use crate::events::{Event, EventKind};
use crate::external::{OpListener, Operation};

use super::WeakSession;

pub(crate) struct PermissionWatch {
    session: WeakSession,
}

impl PermissionWatch {
    pub(crate) fn new(session: WeakSession) -> Arc<Self> {
        Arc::new(Self { session })
    }
}

impl OpListener for PermissionWatch {
    fn op_changed(&self, op: Operation, package: &str) {
        if op != Operation::Camera {
            tracing::error!(?op, package, "unexpected operation change");
            return;
        }
        let Some(session) = self.session.upgrade() else {
            return;
        };

        let core = session.core();
        if core.teardown_started() || core.still_authorized() {
            return;
        }
        if !core.claim_revocation() {
            return;
        }

        tracing::info!(
            device = core.device(),
            package = %core.package(),
            "device access revoked, releasing"
        );
        core.broker().bus().publish(
            Event::new(EventKind::PermissionRevoked)
                .with_device(core.device())
                .with_package(core.package().clone())
                .with_session(session.kind()),
        );

        session.notify_error();
        session.disconnect();
    }
}
