//! # Broker: device arbitration and session reclamation.
//!
//! See the [module docs](super) for the connect flow.
//!
//! ## Rules
//! - Validation failures never mutate the slot table.
//! - Blocking collaborator calls (sound loading, device open/close, permission
//!   subscription) never run under the table lock. The cheap `device_info`
//!   lookup during connect is the only exception.
//! - Strong session handles promoted under a lock are returned to the caller
//!   and dropped only after the lock is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::events::{Bus, Event, EventKind};
use crate::external::{
    CallerContext, ClientCallbacks, DeathRecipient, DeviceApi, DeviceInfo, DeviceModule,
    EndpointId, ModuleInfo, PermissionAuthority,
};
use crate::session::{
    ClientIdentity, ExclusiveSession, Session, SessionKind, SessionParams, SharedSession,
};
use crate::sound::SoundPool;
use crate::subscribers::SubscriberSet;

use super::slot::{DeviceSlot, DeviceTable, Entry};
use super::{BrokerBuilder, CameraInfo, ClientUid};

/// Device module together with its identity, captured at load time.
pub(super) struct LoadedModule {
    pub(super) handle: Arc<dyn DeviceModule>,
    pub(super) info: ModuleInfo,
}

/// Arbitrates device ownership between remote clients.
///
/// Always used behind an `Arc`: sessions keep the broker alive, and the broker
/// registers itself (weakly) as the liveness recipient of every client.
pub struct Broker {
    pub(super) cfg: BrokerConfig,
    pub(super) module: Option<LoadedModule>,
    pub(super) table: DeviceTable,
    pub(super) permissions: Arc<dyn PermissionAuthority>,
    pub(super) sounds: SoundPool,
    pub(super) bus: Bus,
    pub(super) subs: Option<Arc<SubscriberSet>>,
    pub(super) access_disabled: AtomicBool,
    pub(super) runtime_token: CancellationToken,
}

impl Broker {
    /// Starts building a broker.
    pub fn builder(cfg: BrokerConfig, permissions: Arc<dyn PermissionAuthority>) -> BrokerBuilder {
        BrokerBuilder::new(cfg, permissions)
    }

    /// Opens an exclusive session on `device` for the calling client.
    ///
    /// Reconnecting with the same remote endpoint while the session is live
    /// returns the existing session without side effects.
    ///
    /// # Errors
    /// - [`BrokerError::PermissionDenied`]: untrusted uid forwarding, access policy
    ///   disabled, or authorization refused
    /// - [`BrokerError::Uninitialized`]: no device module loaded
    /// - [`BrokerError::InvalidArgument`]: index outside `0..device_count`
    /// - [`BrokerError::AlreadyInUse`]: another client owns the device, or the
    ///   previous owner is still tearing down
    /// - [`BrokerError::Unsupported`]: unknown device version
    /// - [`BrokerError::DeviceError`]: the module failed to describe or open the device
    /// - [`BrokerError::Interrupted`]: the client's endpoint died before the
    ///   session could be published (a revocation in that window is `PermissionDenied`)
    pub fn connect(
        self: &Arc<Self>,
        callbacks: Arc<dyn ClientCallbacks>,
        device: i32,
        package: &str,
        client_uid: ClientUid,
        caller: CallerContext,
    ) -> Result<Arc<ExclusiveSession>, BrokerError> {
        crate::log1!(pid = caller.pid, device, package, "connect exclusive");
        self.connect_exclusive(callbacks, device, package, client_uid, caller)
            .inspect_err(|e| self.publish_rejected(device, package, e))
    }

    /// Attaches a shared session to an advanced `device`.
    ///
    /// Never checks or sets the busy flag, so any number of shared sessions
    /// coexist with each other and with an exclusive owner.
    ///
    /// # Errors
    /// Same gating as [`Broker::connect`], plus [`BrokerError::Unsupported`]
    /// for legacy devices.
    pub fn connect_shared(
        self: &Arc<Self>,
        callbacks: Arc<dyn ClientCallbacks>,
        device: i32,
        package: &str,
        caller: CallerContext,
    ) -> Result<Arc<SharedSession>, BrokerError> {
        crate::log1!(pid = caller.pid, device, package, "connect shared");
        self.connect_shared_inner(callbacks, device, package, caller)
            .inspect_err(|e| self.publish_rejected(device, package, e))
    }

    /// Detaches the session linked to `endpoint` and disconnects it.
    ///
    /// The exclusive owner is searched first, then shared sessions.
    ///
    /// # Errors
    /// [`BrokerError::NotFound`] if no live session is linked to the endpoint.
    pub fn remove_by_remote(&self, endpoint: EndpointId) -> Result<(), BrokerError> {
        let session = self.detach_by_remote(endpoint).ok_or(BrokerError::NotFound)?;
        crate::log1!(endpoint = endpoint.0, device = session.device(), "removing session");
        session.disconnect();
        Ok(())
    }

    /// Reclaims every session of a client whose transport connection terminated.
    pub fn on_liveness_lost(&self, endpoint: EndpointId) {
        let mut reclaimed = 0usize;
        while let Some(session) = self.detach_by_remote(endpoint) {
            tracing::info!(
                endpoint = endpoint.0,
                device = session.device(),
                kind = session.kind().as_label(),
                "client died, reclaiming session"
            );
            self.bus.publish(
                Event::new(EventKind::LivenessLost)
                    .with_endpoint(endpoint)
                    .with_device(session.device())
                    .with_session(session.kind()),
            );
            session.disconnect();
            reclaimed += 1;
        }
        if reclaimed == 0 {
            crate::log1!(endpoint = endpoint.0, "client died, no session left to reclaim");
            self.bus
                .publish(Event::new(EventKind::LivenessLost).with_endpoint(endpoint));
        }
    }

    /// Live session linked to `endpoint`, if any (exclusive first).
    pub fn session_by_remote(&self, endpoint: EndpointId) -> Option<Session> {
        let found;
        {
            let _table = self.table.lock();
            found = self.table.slots().find_map(|(_, slot)| {
                let state = slot.lock();
                let owner = state
                    .owner
                    .as_ref()
                    .filter(|e| e.endpoint == endpoint)
                    .and_then(Entry::upgrade)
                    .map(Session::Exclusive);
                owner.or_else(|| {
                    state
                        .shared
                        .iter()
                        .filter(|e| e.endpoint == endpoint)
                        .find_map(Entry::upgrade)
                        .map(Session::Shared)
                })
            });
        }
        found.filter(|s| !s.core().teardown_started())
    }

    /// Number of devices exposed by the loaded module (0 if none).
    pub fn device_count(&self) -> usize {
        self.table.len()
    }

    /// Facing and orientation of a device.
    ///
    /// # Errors
    /// [`BrokerError::Uninitialized`], [`BrokerError::InvalidArgument`] or
    /// [`BrokerError::DeviceError`].
    pub fn device_info(&self, device: i32) -> Result<CameraInfo, BrokerError> {
        let module = self.loaded()?;
        let index = self.check_index(device)?;
        let info = self.describe_device(module, index)?;
        Ok(CameraInfo {
            facing: info.facing,
            orientation: info.orientation,
        })
    }

    /// Toggles the process-wide access policy; existing sessions are unaffected.
    pub fn set_access_disabled(&self, disabled: bool) {
        tracing::info!(disabled, "device access policy changed");
        self.access_disabled.store(disabled, Ordering::Release);
    }

    /// True if new connects are rejected by policy.
    pub fn is_access_disabled(&self) -> bool {
        self.access_disabled.load(Ordering::Acquire)
    }

    /// True while an exclusive session holds (or is still releasing) `device`.
    pub fn is_busy(&self, device: usize) -> bool {
        self.table.slot(device).is_some_and(DeviceSlot::is_busy)
    }

    /// Identity of the loaded module, if any.
    pub fn module_info(&self) -> Option<&ModuleInfo> {
        self.module.as_ref().map(|m| &m.info)
    }

    /// Configuration the broker was built with.
    pub fn config(&self) -> &BrokerConfig {
        &self.cfg
    }

    /// Subscribes to the broker's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub(crate) fn permissions(&self) -> &Arc<dyn PermissionAuthority> {
        &self.permissions
    }

    pub(crate) fn module(&self) -> Option<&Arc<dyn DeviceModule>> {
        self.module.as_ref().map(|m| &m.handle)
    }

    pub(crate) fn sounds(&self) -> &SoundPool {
        &self.sounds
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    pub(crate) fn mark_busy(&self, device: usize) {
        if let Some(slot) = self.table.slot(device) {
            slot.set_busy();
        }
    }

    /// Clears the busy flag; the last step of an exclusive teardown.
    pub(crate) fn mark_free(&self, device: usize) {
        let Some(slot) = self.table.slot(device) else {
            return;
        };
        if !slot.set_free() {
            tracing::warn!(device, "device released while not busy");
        }
        crate::log1!(device, "device released");
        self.bus
            .publish(Event::new(EventKind::DeviceReleased).with_device(device));
    }

    /// Removes `session` from the owner entry of `device`, if it is still there.
    pub(crate) fn release_exclusive(&self, device: usize, session: &Weak<ExclusiveSession>) {
        let Some(slot) = self.table.slot(device) else {
            return;
        };
        let _table = self.table.lock();
        slot.lock().take_owner_if(session);
    }

    /// Removes `session` from the shared entries of `device`.
    pub(crate) fn release_shared(&self, device: usize, session: &Weak<SharedSession>) {
        let Some(slot) = self.table.slot(device) else {
            return;
        };
        let _table = self.table.lock();
        slot.lock().take_shared(session);
    }

    /// Owner of `device` for driver callbacks; takes only the slot lock.
    pub(crate) fn session_for_device(&self, device: usize) -> Option<Arc<ExclusiveSession>> {
        let slot = self.table.slot(device)?;
        let owner = slot.lock().owner.as_ref().and_then(Entry::upgrade);
        crate::log2!(device, found = owner.is_some(), "cookie lookup");
        owner.filter(|s| !s.is_torn_down())
    }

    pub(super) fn new_internal(
        cfg: BrokerConfig,
        module: Option<LoadedModule>,
        permissions: Arc<dyn PermissionAuthority>,
        sounds: SoundPool,
        bus: Bus,
        subs: Option<Arc<SubscriberSet>>,
        runtime_token: CancellationToken,
    ) -> Self {
        let count = match &module {
            Some(m) => {
                let reported = m.handle.device_count();
                if reported > cfg.max_devices {
                    tracing::error!(
                        reported,
                        max = cfg.max_devices,
                        "module reports more devices than supported, clamping"
                    );
                }
                reported.min(cfg.max_devices)
            }
            None => 0,
        };
        let access_disabled = AtomicBool::new(cfg.access_disabled);

        Self {
            cfg,
            module,
            table: DeviceTable::new(count),
            permissions,
            sounds,
            bus,
            subs,
            access_disabled,
            runtime_token,
        }
    }

    /// Forwards bus events to the subscriber set until the broker goes away.
    pub(super) fn subscriber_listener(&self) {
        let Some(set) = self.subs.as_ref().map(Arc::clone) else {
            return;
        };
        let mut rx = self.bus.subscribe();
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    fn connect_exclusive(
        self: &Arc<Self>,
        callbacks: Arc<dyn ClientCallbacks>,
        device: i32,
        package: &str,
        client_uid: ClientUid,
        caller: CallerContext,
    ) -> Result<Arc<ExclusiveSession>, BrokerError> {
        let uid = self.resolve_uid(client_uid, caller)?;
        let (module, index, slot) = self.admit(device)?;
        let endpoint = callbacks.endpoint().id();

        // Declared before the guards so a promoted handle drops after they do.
        let owner: Option<Arc<ExclusiveSession>>;
        let session = {
            let _table = self.table.lock();
            let mut state = slot.lock();
            state.prune_owner();

            owner = state
                .owner
                .as_ref()
                .and_then(Entry::upgrade)
                .filter(|s| !s.is_torn_down());
            if let Some(live) = &owner {
                if live.endpoint_id() != endpoint {
                    tracing::info!(device = index, "device already in use by another client");
                    return Err(BrokerError::AlreadyInUse { device: index });
                }
                crate::log1!(device = index, "returning existing session");
                return Ok(Arc::clone(live));
            }

            if slot.is_busy() {
                tracing::info!(device = index, "device is still being released");
                return Err(BrokerError::AlreadyInUse { device: index });
            }

            let info = self.describe_device(module, index)?;
            let api = self.resolve_api(&info, index)?;
            let params = SessionParams {
                callbacks,
                device: index,
                facing: info.facing,
                identity: self.identity(package, uid, caller),
            };
            ExclusiveSession::new(Arc::clone(self), params, api)
        };

        session.acquire_sounds();
        session.initialize()?;

        let published = {
            let _table = self.table.lock();
            let mut state = slot.lock();
            let live = !session.is_torn_down();
            if live {
                state.owner = Some(Entry::new(endpoint, session.downgrade()));
            }
            live
        };
        if !published || !session.link_liveness() {
            session.disconnect();
            return Err(session.core().interrupted());
        }

        self.publish_connected(index, package, endpoint, SessionKind::Exclusive);
        crate::log1!(device = index, package, "exclusive session connected");
        Ok(session)
    }

    fn connect_shared_inner(
        self: &Arc<Self>,
        callbacks: Arc<dyn ClientCallbacks>,
        device: i32,
        package: &str,
        caller: CallerContext,
    ) -> Result<Arc<SharedSession>, BrokerError> {
        let (module, index, slot) = self.admit(device)?;
        let endpoint = callbacks.endpoint().id();

        let info = self.describe_device(module, index)?;
        let api = self.resolve_api(&info, index)?;
        if !api.supports_shared() {
            tracing::error!(device = index, "shared sessions need an advanced device");
            return Err(BrokerError::Unsupported {
                operation: "connect_shared",
            });
        }

        let params = SessionParams {
            callbacks,
            device: index,
            facing: info.facing,
            identity: self.identity(package, caller.uid, caller),
        };
        let session = SharedSession::new(Arc::clone(self), params);
        session.initialize()?;

        let published = {
            let _table = self.table.lock();
            let mut state = slot.lock();
            state.prune_shared();
            let live = !session.is_torn_down();
            if live {
                state.shared.push(Entry::new(endpoint, session.downgrade()));
            }
            live
        };
        if !published || !session.link_liveness() {
            session.disconnect();
            return Err(session.core().interrupted());
        }

        self.publish_connected(index, package, endpoint, SessionKind::Shared);
        Ok(session)
    }

    /// Removes the first session linked to `endpoint` from the table.
    fn detach_by_remote(&self, endpoint: EndpointId) -> Option<Session> {
        let _table = self.table.lock();

        for (_, slot) in self.table.slots() {
            let mut state = slot.lock();
            state.prune_owner();
            if state.owner.as_ref().is_some_and(|e| e.endpoint == endpoint) {
                if let Some(session) = state.owner.take().and_then(|e| e.upgrade()) {
                    return Some(Session::Exclusive(session));
                }
            }
        }

        for (_, slot) in self.table.slots() {
            let mut state = slot.lock();
            state.prune_shared();
            if let Some(pos) = state.shared.iter().position(|e| e.endpoint == endpoint) {
                if let Some(session) = state.shared.remove(pos).upgrade() {
                    return Some(Session::Shared(session));
                }
            }
        }

        crate::log2!(endpoint = endpoint.0, "no session linked to endpoint");
        None
    }

    fn resolve_uid(&self, client_uid: ClientUid, caller: CallerContext) -> Result<u32, BrokerError> {
        match client_uid {
            ClientUid::Calling => Ok(caller.uid),
            ClientUid::Forwarded(uid) if caller.pid == self.cfg.service_pid => Ok(uid),
            ClientUid::Forwarded(uid) => {
                tracing::error!(
                    pid = caller.pid,
                    uid = caller.uid,
                    forwarded = uid,
                    "refusing client uid forwarded by another process"
                );
                Err(BrokerError::denied("client uid forwarded by untrusted process"))
            }
        }
    }

    /// Shared gating for connect requests: module, index, access policy.
    fn admit(&self, device: i32) -> Result<(&Arc<dyn DeviceModule>, usize, &DeviceSlot), BrokerError> {
        let module = self.loaded()?;
        let index = self.check_index(device)?;
        if self.is_access_disabled() {
            tracing::info!(device = index, "device access disabled by policy");
            return Err(BrokerError::denied("device access disabled by policy"));
        }
        let slot = self
            .table
            .slot(index)
            .ok_or(BrokerError::InvalidArgument { device: device.into() })?;
        Ok((module, index, slot))
    }

    fn loaded(&self) -> Result<&Arc<dyn DeviceModule>, BrokerError> {
        self.module().ok_or_else(|| {
            tracing::error!("device module not loaded");
            BrokerError::Uninitialized
        })
    }

    fn check_index(&self, device: i32) -> Result<usize, BrokerError> {
        usize::try_from(device)
            .ok()
            .filter(|i| *i < self.table.len())
            .ok_or_else(|| {
                tracing::error!(device, count = self.table.len(), "invalid device index");
                BrokerError::InvalidArgument {
                    device: device.into(),
                }
            })
    }

    fn describe_device(
        &self,
        module: &Arc<dyn DeviceModule>,
        index: usize,
    ) -> Result<DeviceInfo, BrokerError> {
        module
            .device_info(index)
            .map_err(|source| BrokerError::DeviceError {
                device: index,
                source,
            })
    }

    fn resolve_api(&self, info: &DeviceInfo, index: usize) -> Result<DeviceApi, BrokerError> {
        let api = self
            .module
            .as_ref()
            .and_then(|m| m.info.device_api(info));
        api.ok_or_else(|| {
            tracing::error!(
                device = index,
                version = info.device_version.0,
                "unknown device version"
            );
            BrokerError::Unsupported {
                operation: "device_version",
            }
        })
    }

    fn identity(&self, package: &str, uid: u32, caller: CallerContext) -> ClientIdentity {
        ClientIdentity {
            package: Arc::from(package),
            client_pid: caller.pid,
            client_uid: uid,
            service_pid: self.cfg.service_pid,
        }
    }

    fn publish_connected(&self, device: usize, package: &str, endpoint: EndpointId, kind: SessionKind) {
        self.bus.publish(
            Event::new(EventKind::SessionConnected)
                .with_device(device)
                .with_package(package)
                .with_endpoint(endpoint)
                .with_session(kind),
        );
    }

    fn publish_rejected(&self, device: i32, package: &str, err: &BrokerError) {
        let mut ev = Event::new(EventKind::SessionRejected)
            .with_package(package)
            .with_reason(err.as_label());
        if let Ok(index) = usize::try_from(device) {
            ev = ev.with_device(index);
        }
        self.bus.publish(ev);
    }
}

impl DeathRecipient for Broker {
    fn endpoint_died(&self, endpoint: EndpointId) {
        self.on_liveness_lost(endpoint);
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.runtime_token.cancel();
        for (device, slot) in self.table.slots() {
            if slot.is_busy() {
                tracing::error!(device, "broker destroyed while device is still busy");
            }
        }
    }
}
