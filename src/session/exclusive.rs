//! # Exclusive session.
//!
//! Holds sole control of one device. While it exists (and until its teardown
//! has fully finished) the device's busy flag is set.
//!
//! ## Lifecycle
//! ```text
//! new()            ──► busy = true
//! acquire_sounds() ──► sound pool +1
//! initialize()     ──► permission watch, open device
//! (published in the slot table by the broker)
//! disconnect() / drop
//!   ├─► stop permission watch
//!   ├─► sound pool -1
//!   ├─► close device (if opened)
//!   ├─► detach from slot table (explicit only) + unlink liveness
//!   └─► busy = false               (always last)
//! ```
//!
//! The drop path never takes the broker's table lock: the dead weak entry is
//! pruned by the next lookup instead.
//!
//! A teardown that races an in-flight `open_device` cannot close the device
//! itself. It leaves the close and the busy flag to `initialize`, which
//! finishes them as soon as the module returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::events::{Event, EventKind};
use crate::external::{
    ClientError, DeviceApi, DeviceCookie, DeviceNotification, EndpointId, Facing,
};
use crate::sound::SoundKind;

use super::core::{SessionCore, SessionParams};
use super::watch::PermissionWatch;
use super::{ClientIdentity, SessionKind, WeakSession};

#[derive(Clone, Copy)]
enum Teardown {
    Explicit,
    Drop,
}

/// Where the device stands relative to this session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeviceState {
    Closed,
    Opening,
    Open,
    /// Teardown has claimed the device; nothing may open it any more.
    Released,
}

/// Exclusive control of one device.
pub struct ExclusiveSession {
    core: SessionCore,
    api: DeviceApi,
    sounds_held: AtomicBool,
    device_state: Mutex<DeviceState>,
    this: Weak<ExclusiveSession>,
}

impl ExclusiveSession {
    /// Constructs the session and marks its device busy.
    pub(crate) fn new(broker: Arc<Broker>, params: SessionParams, api: DeviceApi) -> Arc<Self> {
        let device = params.device;
        broker.mark_busy(device);
        Arc::new_cyclic(|this| Self {
            core: SessionCore::new(broker, params),
            api,
            sounds_held: AtomicBool::new(false),
            device_state: Mutex::new(DeviceState::Closed),
            this: this.clone(),
        })
    }

    /// Takes a reference on the broker's feedback sound pool.
    pub(crate) fn acquire_sounds(&self) {
        self.core.broker().sounds().acquire();
        self.sounds_held.store(true, Ordering::Release);
    }

    /// Starts the permission watch and opens the device.
    ///
    /// On error the caller drops the session, which undoes every partial step.
    pub(crate) fn initialize(&self) -> Result<(), BrokerError> {
        let watch = PermissionWatch::new(WeakSession::Exclusive(self.this.clone()));
        self.core.start_permission_watch(watch)?;

        let device = self.core.device();
        let broker = self.core.broker();
        let module = broker.module().ok_or(BrokerError::Uninitialized)?;
        {
            let mut state = self.device_state.lock();
            if *state == DeviceState::Released {
                return Err(self.core.interrupted());
            }
            *state = DeviceState::Opening;
        }

        let opened = module.open_device(device, self.api, DeviceCookie(device));

        let mut state = self.device_state.lock();
        if *state == DeviceState::Released {
            drop(state);
            tracing::info!(device, "session torn down while opening, closing device");
            if opened.is_ok() {
                module.close_device(device);
            }
            broker.mark_free(device);
            return Err(self.core.interrupted());
        }
        match opened {
            Ok(()) => {
                *state = DeviceState::Open;
                Ok(())
            }
            Err(source) => {
                *state = DeviceState::Closed;
                tracing::error!(device, error = %source, "could not open device");
                Err(BrokerError::DeviceError { device, source })
            }
        }
    }

    pub(crate) fn link_liveness(&self) -> bool {
        self.core.link_liveness()
    }

    pub(crate) fn core(&self) -> &SessionCore {
        &self.core
    }

    pub(crate) fn downgrade(&self) -> Weak<ExclusiveSession> {
        self.this.clone()
    }

    /// Device slot index this session owns.
    pub fn device(&self) -> usize {
        self.core.device()
    }

    /// Camera facing of the owned device.
    pub fn facing(&self) -> Facing {
        self.core.facing()
    }

    /// Device API the session was constructed for.
    pub fn api(&self) -> DeviceApi {
        self.api
    }

    /// Remote endpoint of the owning client.
    pub fn endpoint_id(&self) -> EndpointId {
        self.core.endpoint_id()
    }

    /// Snapshot of the client identity.
    pub fn identity(&self) -> ClientIdentity {
        self.core.identity()
    }

    /// True once teardown has begun; such a session is treated as absent.
    pub fn is_torn_down(&self) -> bool {
        self.core.teardown_started()
    }

    /// Notifies the client that the device was taken away.
    pub fn notify_error(&self) {
        self.core.callbacks().notify_error(ClientError::Released);
    }

    /// Releases the device. Idempotent; only the first call has effect.
    pub fn disconnect(&self) {
        self.teardown(Teardown::Explicit);
    }

    /// Handles an asynchronous notification from the open device.
    pub fn handle_device_notification(&self, notification: DeviceNotification) {
        crate::log2!(device = self.device(), ?notification, "device notification");
        let sounds = self.core.broker().sounds();
        match notification {
            DeviceNotification::Shutter => sounds.play(SoundKind::Shutter),
            DeviceNotification::RecordingStarted | DeviceNotification::RecordingStopped => {
                sounds.play(SoundKind::Recording)
            }
            DeviceNotification::Error(code) => {
                self.core
                    .callbacks()
                    .notify_error(ClientError::DeviceFailure(code));
            }
        }
    }

    pub(crate) fn describe(&self, out: &mut String) {
        use std::fmt::Write;

        self.core.describe(out);
        let _ = writeln!(out, "    Device API: {:?}", self.api);
    }

    fn teardown(&self, path: Teardown) {
        if !self.core.begin_teardown() {
            return;
        }
        let device = self.core.device();
        let broker = self.core.broker();
        crate::log1!(device, package = %self.core.package(), "exclusive session teardown");

        self.core.stop_permission_watch();

        if self.sounds_held.swap(false, Ordering::AcqRel) {
            broker.sounds().release();
        }

        let previous = std::mem::replace(&mut *self.device_state.lock(), DeviceState::Released);
        if previous == DeviceState::Open {
            if let Some(module) = broker.module() {
                module.close_device(device);
            }
        }

        if let Teardown::Explicit = path {
            broker.release_exclusive(device, &self.this);
        }
        self.core.unlink_liveness();

        broker.bus().publish(
            Event::new(EventKind::SessionDisconnected)
                .with_device(device)
                .with_package(self.core.package().clone())
                .with_endpoint(self.core.endpoint_id())
                .with_session(SessionKind::Exclusive),
        );

        // An in-flight open finishes the release in `initialize`.
        if previous != DeviceState::Opening {
            broker.mark_free(device);
        }
    }
}

impl Drop for ExclusiveSession {
    fn drop(&mut self) {
        self.teardown(Teardown::Drop);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::Harness;

    #[test]
    fn concurrent_disconnects_tear_down_once() {
        let h = Harness::new(2);
        let client = h.client(1);
        let session = h.connect(&client, 0).expect("connect");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                std::thread::spawn(move || session.disconnect())
            })
            .collect();
        for handle in handles {
            handle.join().expect("disconnect thread");
        }

        assert_eq!(h.authority.unsubscribes.load(Ordering::SeqCst), 1);
        assert_eq!(h.authority.finishes.load(Ordering::SeqCst), 1);
        assert_eq!(h.module.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.audio.total_releases(), 2);
        assert_eq!(h.broker.sounds().refs(), 0);
        assert!(!h.broker.is_busy(0));

        drop(session);
        assert_eq!(h.module.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.authority.unsubscribes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_of_last_reference_releases_device() {
        let h = Harness::new(1);
        let client = h.client(1);
        let session = h.connect(&client, 0).expect("connect");
        assert!(h.broker.is_busy(0));

        drop(session);
        assert!(!h.broker.is_busy(0));
        assert_eq!(h.module.closes.load(Ordering::SeqCst), 1);
        assert_eq!(client.endpoint.unlinks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn revocation_notifies_once_and_disconnects() {
        let h = Harness::new(1);
        let client = h.client(1);
        let session = h.connect(&client, 0).expect("connect");

        h.authority.set_allowed(false);
        h.authority.revoke("com.example.camera");

        assert_eq!(client.errors(), vec![ClientError::Released]);
        assert!(session.is_torn_down());
        assert!(!h.broker.is_busy(0));
        assert_eq!(session.identity().client_pid, h.broker.config().service_pid);

        h.authority.revoke("com.example.camera");
        assert_eq!(client.errors().len(), 1);
        assert_eq!(h.module.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn change_that_keeps_access_is_ignored() {
        let h = Harness::new(1);
        let client = h.client(1);
        let session = h.connect(&client, 0).expect("connect");

        h.authority.revoke("com.example.camera");
        assert!(client.errors().is_empty());
        assert!(!session.is_torn_down());

        h.authority.notify(crate::external::Operation::Other(26), "com.example.camera");
        assert!(!session.is_torn_down());
    }

    #[test]
    fn device_notifications_drive_sounds_and_errors() {
        let h = Harness::new(1);
        let client = h.client(1);
        let session = h.connect(&client, 0).expect("connect");

        session.handle_device_notification(DeviceNotification::Shutter);
        session.handle_device_notification(DeviceNotification::RecordingStarted);
        session.handle_device_notification(DeviceNotification::RecordingStopped);
        session.handle_device_notification(DeviceNotification::Error(-5));

        let assets = h.broker.config().sounds.clone();
        let shutter = h.audio.player(&assets.shutter).expect("shutter");
        let recording = h.audio.player(&assets.recording).expect("recording");
        assert_eq!(shutter.starts.load(Ordering::SeqCst), 1);
        assert_eq!(recording.starts.load(Ordering::SeqCst), 2);
        assert_eq!(client.errors(), vec![ClientError::DeviceFailure(-5)]);
    }
}
