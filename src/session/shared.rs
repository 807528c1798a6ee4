//! # Shared session.
//!
//! Attaches to an advanced device without excluding anyone. It never opens
//! the device, never touches the busy flag and never acquires feedback sounds.
//! Its device-control surface is not provided: every request is rejected with
//! [`BrokerError::Unsupported`].

use std::sync::{Arc, Weak};

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::events::{Event, EventKind};
use crate::external::{ClientCallbacks, ClientError, EndpointId, Facing};

use super::core::{SessionCore, SessionParams};
use super::watch::PermissionWatch;
use super::{ClientIdentity, SessionKind, WeakSession};

/// Opaque capture request payload; ownership moves into the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Request settings as key/value pairs.
    pub settings: Vec<(String, String)>,
}

#[derive(Clone, Copy)]
enum Teardown {
    Explicit,
    Drop,
}

/// Non-exclusive attachment to an advanced device.
pub struct SharedSession {
    core: SessionCore,
    this: Weak<SharedSession>,
}

impl SharedSession {
    pub(crate) fn new(broker: Arc<Broker>, params: SessionParams) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            core: SessionCore::new(broker, params),
            this: this.clone(),
        })
    }

    /// Starts the permission watch; nothing else is needed to attach.
    pub(crate) fn initialize(&self) -> Result<(), BrokerError> {
        let watch = PermissionWatch::new(WeakSession::Shared(self.this.clone()));
        self.core.start_permission_watch(watch)
    }

    pub(crate) fn link_liveness(&self) -> bool {
        self.core.link_liveness()
    }

    pub(crate) fn core(&self) -> &SessionCore {
        &self.core
    }

    pub(crate) fn downgrade(&self) -> Weak<SharedSession> {
        self.this.clone()
    }

    /// Device slot index this session is attached to.
    pub fn device(&self) -> usize {
        self.core.device()
    }

    /// Camera facing of the device.
    pub fn facing(&self) -> Facing {
        self.core.facing()
    }

    /// Remote endpoint of the client.
    pub fn endpoint_id(&self) -> EndpointId {
        self.core.endpoint_id()
    }

    /// Snapshot of the client identity.
    pub fn identity(&self) -> ClientIdentity {
        self.core.identity()
    }

    /// True once teardown has begun.
    pub fn is_torn_down(&self) -> bool {
        self.core.teardown_started()
    }

    /// Notifies the client that its access was withdrawn.
    pub fn notify_error(&self) {
        self.core.callbacks().notify_error(ClientError::Released);
    }

    /// Detaches from the device. Idempotent.
    pub fn disconnect(&self) {
        self.teardown(Teardown::Explicit);
    }

    /// Re-binding callbacks is not supported.
    pub fn connect(&self, _callbacks: Arc<dyn ClientCallbacks>) -> Result<(), BrokerError> {
        Err(self.unsupported("connect"))
    }

    /// Taking device control without waiting is not supported.
    pub fn exclusive_try_lock(&self) -> Result<(), BrokerError> {
        Err(self.unsupported("exclusive_try_lock"))
    }

    /// Taking device control is not supported.
    pub fn exclusive_lock(&self) -> Result<(), BrokerError> {
        Err(self.unsupported("exclusive_lock"))
    }

    /// Giving device control back is not supported.
    pub fn exclusive_unlock(&self) -> Result<(), BrokerError> {
        Err(self.unsupported("exclusive_unlock"))
    }

    /// Always `false`.
    pub fn has_exclusive_lock(&self) -> bool {
        false
    }

    /// Rejects the request; the payload is dropped here.
    pub fn submit_request(
        &self,
        request: CaptureRequest,
        streaming: bool,
    ) -> Result<i32, BrokerError> {
        crate::log2!(streaming, entries = request.settings.len(), "dropping capture request");
        drop(request);
        Err(self.unsupported("submit_request"))
    }

    /// Cancelling a capture request is not supported.
    pub fn cancel_request(&self, _request_id: i32) -> Result<(), BrokerError> {
        Err(self.unsupported("cancel_request"))
    }

    /// Adding a stream to the capture output is not supported.
    pub fn request_stream(&self, _stream_id: i32) -> Result<(), BrokerError> {
        Err(self.unsupported("request_stream"))
    }

    /// Removing a stream from the capture output is not supported.
    pub fn cancel_stream(&self, _stream_id: i32) -> Result<(), BrokerError> {
        Err(self.unsupported("cancel_stream"))
    }

    pub(crate) fn describe(&self, out: &mut String) {
        self.core.describe(out);
    }

    fn unsupported(&self, operation: &'static str) -> BrokerError {
        tracing::error!(device = self.core.device(), operation, "not implemented for shared sessions");
        BrokerError::Unsupported { operation }
    }

    fn teardown(&self, path: Teardown) {
        if !self.core.begin_teardown() {
            return;
        }
        let device = self.core.device();
        let broker = self.core.broker();
        crate::log1!(device, package = %self.core.package(), "shared session teardown");

        self.core.stop_permission_watch();

        if let Teardown::Explicit = path {
            broker.release_shared(device, &self.this);
        }
        self.core.unlink_liveness();

        broker.bus().publish(
            Event::new(EventKind::SessionDisconnected)
                .with_device(device)
                .with_package(self.core.package().clone())
                .with_endpoint(self.core.endpoint_id())
                .with_session(SessionKind::Shared),
        );
    }
}

impl Drop for SharedSession {
    fn drop(&mut self) {
        self.teardown(Teardown::Drop);
    }
}
