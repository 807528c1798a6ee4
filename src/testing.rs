//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::broker::{Broker, ClientUid};
use crate::config::BrokerConfig;
use crate::error::{AudioError, BrokerError, ModuleError};
use crate::external::{
    ApiVersion, AudioBackend, CallerContext, ClientCallbacks, ClientError, DeathRecipient,
    DeviceApi, DeviceCookie, DeviceInfo, DeviceModule, EndpointId, Facing, ModuleInfo, OpListener,
    OpMode, Operation, Permission, PermissionAuthority, RemoteEndpoint, SoundPlayer,
    SubscriptionId,
};
use crate::session::{ExclusiveSession, SharedSession};

pub(crate) const PACKAGE: &str = "com.example.camera";
pub(crate) const SERVICE_PID: u32 = 1000;

/// Blocks a thread at a chosen point until released.
#[derive(Default)]
pub(crate) struct Gate {
    state: Mutex<(bool, bool)>,
    cv: Condvar,
}

impl Gate {
    pub(crate) fn arm(&self) {
        *self.state.lock() = (true, false);
    }

    pub(crate) fn pass(&self) {
        let mut state = self.state.lock();
        if !state.0 {
            return;
        }
        state.1 = true;
        self.cv.notify_all();
        while state.0 {
            self.cv.wait(&mut state);
        }
    }

    pub(crate) fn wait_entered(&self) {
        let mut state = self.state.lock();
        while !state.1 {
            self.cv.wait(&mut state);
        }
    }

    pub(crate) fn release(&self) {
        self.state.lock().0 = false;
        self.cv.notify_all();
    }
}

// ---- device module ----

pub(crate) struct FakeModule {
    pub info: ModuleInfo,
    pub devices: Vec<DeviceInfo>,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_open: AtomicBool,
    pub fail_info: AtomicBool,
    pub close_gate: Gate,
    pub opened: Mutex<Vec<(usize, DeviceApi, DeviceCookie)>>,
    on_open: Mutex<Option<OpenHook>>,
}

type OpenHook = Box<dyn Fn() + Send + Sync>;

impl FakeModule {
    pub(crate) fn new(module_api: ApiVersion, devices: Vec<DeviceInfo>) -> Arc<Self> {
        Arc::new(Self {
            info: ModuleInfo {
                name: "fake-module".into(),
                author: "camvisor tests".into(),
                module_api_version: module_api,
                hal_api_version: ApiVersion::V1_0,
            },
            devices,
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            fail_info: AtomicBool::new(false),
            close_gate: Gate::default(),
            opened: Mutex::new(Vec::new()),
            on_open: Mutex::new(None),
        })
    }

    /// Runs `hook` inside every later `open_device`, before it reports success.
    pub(crate) fn set_on_open(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_open.lock() = Some(Box::new(hook));
    }

    pub(crate) fn clear_on_open(&self) {
        *self.on_open.lock() = None;
    }

    /// `count` advanced devices, alternating back/front.
    pub(crate) fn advanced(count: usize) -> Arc<Self> {
        let devices = (0..count)
            .map(|i| device(i, ApiVersion::V2_1))
            .collect();
        Self::new(ApiVersion::V2_0, devices)
    }
}

pub(crate) fn device(index: usize, version: ApiVersion) -> DeviceInfo {
    DeviceInfo {
        facing: if index % 2 == 0 { Facing::Back } else { Facing::Front },
        orientation: if index % 2 == 0 { 90 } else { 270 },
        device_version: version,
        static_metadata: vec![("sensor.index".into(), index.to_string())],
    }
}

impl DeviceModule for FakeModule {
    fn module_info(&self) -> ModuleInfo {
        self.info.clone()
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_info(&self, index: usize) -> Result<DeviceInfo, ModuleError> {
        if self.fail_info.load(Ordering::SeqCst) {
            return Err(ModuleError::Unavailable);
        }
        self.devices
            .get(index)
            .cloned()
            .ok_or(ModuleError::Status { status: -22 })
    }

    fn open_device(
        &self,
        index: usize,
        api: DeviceApi,
        cookie: DeviceCookie,
    ) -> Result<(), ModuleError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ModuleError::Status { status: -19 });
        }
        self.opened.lock().push((index, api, cookie));
        if let Some(hook) = self.on_open.lock().as_ref() {
            hook();
        }
        Ok(())
    }

    fn close_device(&self, _index: usize) {
        self.close_gate.pass();
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---- permission authority ----

#[derive(Default)]
pub(crate) struct FakeAuthority {
    pub denied_transport: AtomicBool,
    pub denied_dump: AtomicBool,
    pub denied_ops: AtomicBool,
    pub authorizes: AtomicUsize,
    pub finishes: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, (String, Arc<dyn OpListener>)>>,
}

impl FakeAuthority {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_allowed(&self, allowed: bool) {
        self.denied_ops.store(!allowed, Ordering::SeqCst);
    }

    pub(crate) fn set_transport_allowed(&self, allowed: bool) {
        self.denied_transport.store(!allowed, Ordering::SeqCst);
    }

    pub(crate) fn set_dump_allowed(&self, allowed: bool) {
        self.denied_dump.store(!allowed, Ordering::SeqCst);
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Reports a device-access change for `package`.
    pub(crate) fn revoke(&self, package: &str) {
        self.notify(Operation::Camera, package);
    }

    /// Fires matching listeners outside the registry lock.
    pub(crate) fn notify(&self, op: Operation, package: &str) {
        let targets: Vec<Arc<dyn OpListener>> = self
            .listeners
            .lock()
            .values()
            .filter(|(p, _)| p == package)
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in targets {
            listener.op_changed(op, package);
        }
    }

    fn mode(&self) -> OpMode {
        if self.denied_ops.load(Ordering::SeqCst) {
            OpMode::Ignored
        } else {
            OpMode::Allowed
        }
    }
}

impl PermissionAuthority for FakeAuthority {
    fn check_permission(&self, permission: Permission, _caller: CallerContext) -> bool {
        match permission {
            Permission::Camera => !self.denied_transport.load(Ordering::SeqCst),
            Permission::Dump => !self.denied_dump.load(Ordering::SeqCst),
        }
    }

    fn authorize(&self, _op: Operation, _uid: u32, _package: &str) -> OpMode {
        self.authorizes.fetch_add(1, Ordering::SeqCst);
        self.mode()
    }

    fn check(&self, _op: Operation, _uid: u32, _package: &str) -> OpMode {
        self.mode()
    }

    fn finish(&self, _op: Operation, _uid: u32, _package: &str) {
        self.finishes.fetch_add(1, Ordering::SeqCst);
    }

    fn subscribe(
        &self,
        _op: Operation,
        package: &str,
        listener: Arc<dyn OpListener>,
    ) -> SubscriptionId {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .insert(id, (package.to_string(), listener));
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.listeners.lock().remove(&id.0).is_some() {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ---- remote endpoint / client ----

pub(crate) struct FakeEndpoint {
    id: EndpointId,
    recipients: Mutex<Vec<Weak<dyn DeathRecipient>>>,
    dead: AtomicBool,
    pub links: AtomicUsize,
    pub unlinks: AtomicUsize,
}

impl FakeEndpoint {
    pub(crate) fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: EndpointId(id),
            recipients: Mutex::new(Vec::new()),
            dead: AtomicBool::new(false),
            links: AtomicUsize::new(0),
            unlinks: AtomicUsize::new(0),
        })
    }

    pub(crate) fn linked(&self) -> usize {
        self.recipients.lock().len()
    }

    /// Terminates the connection; recipients fire once.
    pub(crate) fn die(&self) {
        if self.dead.swap(true, Ordering::SeqCst) {
            return;
        }
        let recipients = std::mem::take(&mut *self.recipients.lock());
        for recipient in recipients.iter().filter_map(Weak::upgrade) {
            recipient.endpoint_died(self.id);
        }
    }
}

impl RemoteEndpoint for FakeEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn link_to_death(&self, recipient: Weak<dyn DeathRecipient>) -> bool {
        let mut recipients = self.recipients.lock();
        if self.dead.load(Ordering::SeqCst) {
            return false;
        }
        self.links.fetch_add(1, Ordering::SeqCst);
        recipients.push(recipient);
        true
    }

    fn unlink_to_death(&self, recipient: &Weak<dyn DeathRecipient>) {
        self.unlinks.fetch_add(1, Ordering::SeqCst);
        let mut recipients = self.recipients.lock();
        if let Some(pos) = recipients.iter().position(|r| Weak::ptr_eq(r, recipient)) {
            recipients.remove(pos);
        }
    }
}

pub(crate) struct FakeClient {
    pub endpoint: Arc<FakeEndpoint>,
    pub caller: CallerContext,
    errors: Mutex<Vec<ClientError>>,
}

impl FakeClient {
    pub(crate) fn new(id: u64) -> Arc<Self> {
        let n = u32::try_from(id).unwrap_or(u32::MAX);
        Arc::new(Self {
            endpoint: FakeEndpoint::new(id),
            caller: CallerContext {
                pid: 4000 + n,
                uid: 10_000 + n,
            },
            errors: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn errors(&self) -> Vec<ClientError> {
        self.errors.lock().clone()
    }
}

impl ClientCallbacks for FakeClient {
    fn endpoint(&self) -> Arc<dyn RemoteEndpoint> {
        self.endpoint.clone()
    }

    fn notify_error(&self, error: ClientError) {
        self.errors.lock().push(error);
    }
}

// ---- audio ----

pub(crate) struct FakePlayer {
    pub seeks: AtomicUsize,
    pub starts: AtomicUsize,
    pub releases: AtomicUsize,
}

impl SoundPlayer for FakePlayer {
    fn seek_to_start(&self) {
        self.seeks.fetch_add(1, Ordering::SeqCst);
    }

    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeAudio {
    pub loads: AtomicUsize,
    failing: Mutex<HashSet<PathBuf>>,
    players: Mutex<Vec<(PathBuf, Arc<FakePlayer>)>>,
}

impl FakeAudio {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_path(&self, path: &Path) {
        self.failing.lock().insert(path.to_path_buf());
    }

    /// Most recently loaded player for `path`.
    pub(crate) fn player(&self, path: &Path) -> Option<Arc<FakePlayer>> {
        self.players
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, player)| Arc::clone(player))
    }

    pub(crate) fn total_releases(&self) -> usize {
        self.players
            .lock()
            .iter()
            .map(|(_, p)| p.releases.load(Ordering::SeqCst))
            .sum()
    }
}

impl AudioBackend for FakeAudio {
    fn load(&self, path: &Path) -> Result<Arc<dyn SoundPlayer>, AudioError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(path) {
            return Err(AudioError {
                path: path.to_path_buf(),
                reason: "decoder unavailable".into(),
            });
        }
        let player = Arc::new(FakePlayer {
            seeks: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        });
        self.players
            .lock()
            .push((path.to_path_buf(), Arc::clone(&player)));
        Ok(player)
    }
}

// ---- harness ----

/// A broker wired to fresh fakes.
pub(crate) struct Harness {
    pub broker: Arc<Broker>,
    pub module: Arc<FakeModule>,
    pub authority: Arc<FakeAuthority>,
    pub audio: Arc<FakeAudio>,
}

impl Harness {
    pub(crate) fn config() -> BrokerConfig {
        BrokerConfig {
            service_pid: SERVICE_PID,
            bus_capacity: 64,
            ..BrokerConfig::default()
        }
    }

    /// `devices` advanced devices with the default test config.
    pub(crate) fn new(devices: usize) -> Self {
        Self::with_config(devices, Self::config())
    }

    pub(crate) fn with_config(devices: usize, cfg: BrokerConfig) -> Self {
        let cfg = BrokerConfig {
            max_devices: cfg.max_devices.max(devices),
            ..cfg
        };
        Self::build(Some(FakeModule::advanced(devices)), cfg)
    }

    pub(crate) fn with_module(module: Arc<FakeModule>) -> Self {
        Self::build(Some(module), Self::config())
    }

    pub(crate) fn without_module() -> Self {
        Self::build(None, Self::config())
    }

    fn build(module: Option<Arc<FakeModule>>, cfg: BrokerConfig) -> Self {
        let authority = FakeAuthority::new();
        let audio = FakeAudio::new();
        let mut builder = Broker::builder(cfg, authority.clone()).with_audio(audio.clone());
        if let Some(module) = &module {
            builder = builder.with_module(module.clone());
        }
        Self {
            broker: builder.build(),
            module: module.unwrap_or_else(|| FakeModule::advanced(0)),
            authority,
            audio,
        }
    }

    pub(crate) fn client(&self, id: u64) -> Arc<FakeClient> {
        FakeClient::new(id)
    }

    pub(crate) fn connect(
        &self,
        client: &Arc<FakeClient>,
        device: i32,
    ) -> Result<Arc<ExclusiveSession>, BrokerError> {
        self.broker.connect(
            client.clone(),
            device,
            PACKAGE,
            ClientUid::Calling,
            client.caller,
        )
    }

    pub(crate) fn connect_shared(
        &self,
        client: &Arc<FakeClient>,
        device: i32,
    ) -> Result<Arc<SharedSession>, BrokerError> {
        self.broker
            .connect_shared(client.clone(), device, PACKAGE, client.caller)
    }
}
