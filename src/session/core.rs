//! # Common session state.
//!
//! [`SessionCore`] carries what both session kinds share: the client identity,
//! the remote linkage, the permission watch and the teardown claim.
//!
//! ## Rules
//! - Identity, device and endpoint are immutable after construction; only the
//!   recorded caller pid may be re-homed (permission revocation).
//! - All mutable fields live behind **one** per-session lock, so unrelated
//!   sessions tear down concurrently.
//! - [`SessionCore::begin_teardown`] returns `true` exactly once.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::external::{
    ClientCallbacks, DeathRecipient, EndpointId, Facing, OpListener, Operation, RemoteEndpoint,
    SubscriptionId,
};

use super::ClientIdentity;

/// Everything a session kind needs to be constructed.
pub(crate) struct SessionParams {
    pub callbacks: Arc<dyn ClientCallbacks>,
    pub device: usize,
    pub facing: Facing,
    pub identity: ClientIdentity,
}

struct CoreState {
    client_pid: u32,
    ops_active: bool,
    subscription: Option<SubscriptionId>,
    revoked: bool,
    linked: bool,
    teardown_started: bool,
}

/// State shared by exclusive and shared sessions.
pub(crate) struct SessionCore {
    broker: Arc<Broker>,
    callbacks: Arc<dyn ClientCallbacks>,
    endpoint: Arc<dyn RemoteEndpoint>,
    endpoint_id: EndpointId,
    package: Arc<str>,
    client_uid: u32,
    service_pid: u32,
    device: usize,
    facing: Facing,
    state: Mutex<CoreState>,
}

impl SessionCore {
    pub(crate) fn new(broker: Arc<Broker>, params: SessionParams) -> Self {
        let endpoint = params.callbacks.endpoint();
        let endpoint_id = endpoint.id();
        Self {
            broker,
            callbacks: params.callbacks,
            endpoint,
            endpoint_id,
            package: params.identity.package,
            client_uid: params.identity.client_uid,
            service_pid: params.identity.service_pid,
            device: params.device,
            facing: params.facing,
            state: Mutex::new(CoreState {
                client_pid: params.identity.client_pid,
                ops_active: false,
                subscription: None,
                revoked: false,
                linked: false,
                teardown_started: false,
            }),
        }
    }

    pub(crate) fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub(crate) fn callbacks(&self) -> &Arc<dyn ClientCallbacks> {
        &self.callbacks
    }

    pub(crate) fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    pub(crate) fn device(&self) -> usize {
        self.device
    }

    pub(crate) fn facing(&self) -> Facing {
        self.facing
    }

    pub(crate) fn package(&self) -> &Arc<str> {
        &self.package
    }

    pub(crate) fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            package: self.package.clone(),
            client_pid: self.state.lock().client_pid,
            client_uid: self.client_uid,
            service_pid: self.service_pid,
        }
    }

    pub(crate) fn permission_active(&self) -> bool {
        self.state.lock().ops_active
    }

    /// Subscribes to device-access changes and performs the initial authorization.
    ///
    /// On denial the subscription stays registered; teardown removes it. If a
    /// teardown starts meanwhile, whatever this call registered is undone here.
    pub(crate) fn start_permission_watch(
        &self,
        listener: Arc<dyn OpListener>,
    ) -> Result<(), BrokerError> {
        let permissions = self.broker.permissions();
        let id = permissions.subscribe(Operation::Camera, &self.package, listener);
        let stored = self.unless_torn_down(|state| state.subscription = Some(id));
        if !stored {
            permissions.unsubscribe(id);
            return Err(self.interrupted());
        }

        let mode = permissions.authorize(Operation::Camera, self.client_uid, &self.package);
        if !mode.is_allowed() {
            tracing::info!(
                device = self.device,
                package = %self.package,
                ?mode,
                "device access has been revoked"
            );
            return Err(BrokerError::denied("device access not authorized"));
        }
        if !self.unless_torn_down(|state| state.ops_active = true) {
            permissions.finish(Operation::Camera, self.client_uid, &self.package);
            return Err(self.interrupted());
        }
        Ok(())
    }

    /// Finishes the tracked operation (if active) and drops the subscription.
    ///
    /// Safe to call when the watch was never started.
    pub(crate) fn stop_permission_watch(&self) {
        let (was_active, subscription) = {
            let mut state = self.state.lock();
            (
                std::mem::replace(&mut state.ops_active, false),
                state.subscription.take(),
            )
        };

        let permissions = self.broker.permissions();
        if was_active {
            permissions.finish(Operation::Camera, self.client_uid, &self.package);
        }
        if let Some(id) = subscription {
            permissions.unsubscribe(id);
        }
    }

    /// Re-checks authorization; `true` if access is still allowed.
    pub(crate) fn still_authorized(&self) -> bool {
        self.broker
            .permissions()
            .check(Operation::Camera, self.client_uid, &self.package)
            .is_allowed()
    }

    /// Claims the revocation path once, re-homing the recorded caller to the service.
    ///
    /// Returns `false` if the session is already revoked or tearing down.
    pub(crate) fn claim_revocation(&self) -> bool {
        let mut state = self.state.lock();
        if state.revoked || state.teardown_started {
            return false;
        }
        state.revoked = true;
        state.client_pid = self.service_pid;
        true
    }

    /// Marks the start of teardown; `true` only for the first caller.
    pub(crate) fn begin_teardown(&self) -> bool {
        let mut state = self.state.lock();
        if state.teardown_started {
            return false;
        }
        state.teardown_started = true;
        true
    }

    pub(crate) fn teardown_started(&self) -> bool {
        self.state.lock().teardown_started
    }

    /// Error for a connect cut short by this session's own teardown.
    pub(crate) fn interrupted(&self) -> BrokerError {
        if self.state.lock().revoked {
            BrokerError::denied("device access revoked during connect")
        } else {
            BrokerError::Interrupted {
                device: self.device,
            }
        }
    }

    /// Applies `update` under the session lock unless teardown has started.
    fn unless_torn_down(&self, update: impl FnOnce(&mut CoreState)) -> bool {
        let mut state = self.state.lock();
        if state.teardown_started {
            return false;
        }
        update(&mut state);
        true
    }

    /// Registers the broker as liveness recipient of this session's endpoint.
    ///
    /// Returns `false` if teardown has started or the endpoint is already dead.
    pub(crate) fn link_liveness(&self) -> bool {
        let mut state = self.state.lock();
        if state.teardown_started {
            return false;
        }
        if !self.endpoint.link_to_death(self.recipient()) {
            tracing::info!(
                device = self.device,
                endpoint = self.endpoint_id.0,
                "client endpoint died before it could be linked"
            );
            return false;
        }
        state.linked = true;
        true
    }

    /// Removes the registration made by [`SessionCore::link_liveness`], if any.
    pub(crate) fn unlink_liveness(&self) {
        let linked = std::mem::replace(&mut self.state.lock().linked, false);
        if linked {
            self.endpoint.unlink_to_death(&self.recipient());
        }
    }

    fn recipient(&self) -> Weak<dyn DeathRecipient> {
        let weak: Weak<Broker> = Arc::downgrade(&self.broker);
        weak
    }

    pub(crate) fn describe(&self, out: &mut String) {
        use std::fmt::Write;

        let identity = self.identity();
        let _ = writeln!(out, "    Client package: {}", identity.package);
        let _ = writeln!(out, "    Client pid: {}", identity.client_pid);
        let _ = writeln!(out, "    Client uid: {}", identity.client_uid);
        let _ = writeln!(out, "    Remote endpoint: {}", self.endpoint_id.0);
        let _ = writeln!(out, "    Permission active: {}", self.permission_active());
    }
}
