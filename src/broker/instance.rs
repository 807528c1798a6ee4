//! # Process-wide broker registry.
//!
//! Driver callbacks arrive on module threads carrying only a [`DeviceCookie`].
//! This registry lets them find the live broker and, through it, the session
//! owning the device.
//!
//! The registry holds a weak handle: it never keeps the broker alive.
//!
//! ```text
//! driver thread ─► dispatch_device_notification(cookie, n)
//!                    └─► current() ─► session_for_device(cookie.device())
//!                                       └─► [slot lock] promote owner
//! ```

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::external::{DeviceCookie, DeviceNotification};
use crate::session::ExclusiveSession;

use super::Broker;

static INSTANCE: RwLock<Option<Weak<Broker>>> = parking_lot::const_rwlock(None);

/// Registers `broker` as the process-wide instance, replacing any previous one.
pub fn install(broker: &Arc<Broker>) {
    *INSTANCE.write() = Some(Arc::downgrade(broker));
}

/// Removes the process-wide instance.
pub fn clear() {
    INSTANCE.write().take();
}

/// The live process-wide broker, if one is installed and still alive.
pub fn current() -> Option<Arc<Broker>> {
    INSTANCE.read().as_ref().and_then(Weak::upgrade)
}

/// Resolves the exclusive session owning the device behind `cookie`.
///
/// Returns `None` if no broker is installed, the index is out of range, the
/// device has no owner, or the owner is already tearing down.
pub fn session_for_cookie(cookie: DeviceCookie) -> Option<Arc<ExclusiveSession>> {
    let broker = current()?;
    let session = broker.session_for_device(cookie.device());
    if session.is_none() {
        crate::log2!(device = cookie.device(), "no session for cookie");
    }
    session
}

/// Routes a driver notification to the owning session.
///
/// Returns `false` if the notification had no recipient.
pub fn dispatch_device_notification(cookie: DeviceCookie, notification: DeviceNotification) -> bool {
    match session_for_cookie(cookie) {
        Some(session) => {
            session.handle_device_notification(notification);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::Harness;

    // Single test: the registry is process-global.
    #[test]
    fn cookie_resolution_follows_instance_and_owner() {
        let h = Harness::new(2);
        clear();
        assert!(session_for_cookie(DeviceCookie(0)).is_none());

        install(&h.broker);
        assert!(session_for_cookie(DeviceCookie(0)).is_none());
        assert!(session_for_cookie(DeviceCookie(9)).is_none());

        let client = h.client(1);
        let session = h.connect(&client, 0).expect("connect");
        let found = session_for_cookie(DeviceCookie(0)).expect("owner");
        assert!(Arc::ptr_eq(&found, &session));
        drop(found);

        assert!(dispatch_device_notification(
            DeviceCookie(0),
            DeviceNotification::Shutter
        ));
        let shutter = h
            .audio
            .player(&h.broker.config().sounds.shutter)
            .expect("shutter");
        assert_eq!(shutter.starts.load(Ordering::SeqCst), 1);

        session.disconnect();
        assert!(session_for_cookie(DeviceCookie(0)).is_none());
        assert!(!dispatch_device_notification(
            DeviceCookie(0),
            DeviceNotification::Error(-1)
        ));
        assert!(client.errors().is_empty());

        clear();
        assert!(current().is_none());
    }
}
