//! # Example: Broker Demo
//!
//! Two clients compete for the back camera of an in-memory device module:
//! - client A opens it exclusively, client B is rejected
//! - an observer attaches a shared session
//! - client A's process dies; the broker reclaims the device and B gets it
//! - the diagnostic dump is printed at the end
//!
//! Run with: `cargo run --example broker_demo --features logging`

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use camvisor::{
    ApiVersion, AudioBackend, AudioError, Broker, BrokerConfig, CallerContext, ClientCallbacks,
    ClientError, ClientUid, DeathRecipient, DeviceApi, DeviceCookie, DeviceInfo, DeviceModule,
    Dispatcher, EndpointId, Facing, LogWriter, ModuleError, ModuleInfo, OpListener, OpMode,
    Operation, Permission, PermissionAuthority, RemoteEndpoint, Reply, Request, SoundPlayer,
    Subscribe, SubscriptionId,
};

struct DemoModule;

impl DeviceModule for DemoModule {
    fn module_info(&self) -> ModuleInfo {
        ModuleInfo {
            name: "demo-module".into(),
            author: "camvisor".into(),
            module_api_version: ApiVersion::V2_0,
            hal_api_version: ApiVersion::V1_0,
        }
    }

    fn device_count(&self) -> usize {
        2
    }

    fn device_info(&self, index: usize) -> Result<DeviceInfo, ModuleError> {
        let facing = if index == 0 { Facing::Back } else { Facing::Front };
        Ok(DeviceInfo {
            facing,
            orientation: if index == 0 { 90 } else { 270 },
            device_version: ApiVersion::V2_1,
            static_metadata: vec![("lens.facing".into(), format!("{facing:?}"))],
        })
    }

    fn open_device(&self, index: usize, api: DeviceApi, _: DeviceCookie) -> Result<(), ModuleError> {
        println!("[module] open device {index} ({api:?})");
        Ok(())
    }

    fn close_device(&self, index: usize) {
        println!("[module] close device {index}");
    }
}

struct AllowAll;

impl PermissionAuthority for AllowAll {
    fn check_permission(&self, _: Permission, _: CallerContext) -> bool {
        true
    }
    fn authorize(&self, _: Operation, _: u32, _: &str) -> OpMode {
        OpMode::Allowed
    }
    fn check(&self, _: Operation, _: u32, _: &str) -> OpMode {
        OpMode::Allowed
    }
    fn finish(&self, _: Operation, _: u32, _: &str) {}
    fn subscribe(&self, _: Operation, _: &str, _: Arc<dyn OpListener>) -> SubscriptionId {
        SubscriptionId(0)
    }
    fn unsubscribe(&self, _: SubscriptionId) {}
}

struct Beep(&'static str);

impl SoundPlayer for Beep {
    fn seek_to_start(&self) {}
    fn start(&self) {
        println!("[audio] *{}*", self.0);
    }
    fn release(&self) {}
}

struct DemoAudio;

impl AudioBackend for DemoAudio {
    fn load(&self, path: &Path) -> Result<Arc<dyn SoundPlayer>, AudioError> {
        let name = if path.ends_with("camera_click.ogg") { "click" } else { "ding" };
        Ok(Arc::new(Beep(name)))
    }
}

struct Endpoint {
    id: EndpointId,
    recipients: Mutex<Vec<Weak<dyn DeathRecipient>>>,
    dead: AtomicBool,
}

impl Endpoint {
    fn die(&self) {
        if self.dead.swap(true, Ordering::SeqCst) {
            return;
        }
        let recipients = std::mem::take(&mut *self.recipients.lock());
        for r in recipients.iter().filter_map(Weak::upgrade) {
            r.endpoint_died(self.id);
        }
    }
}

impl RemoteEndpoint for Endpoint {
    fn id(&self) -> EndpointId {
        self.id
    }
    fn link_to_death(&self, recipient: Weak<dyn DeathRecipient>) -> bool {
        let mut recipients = self.recipients.lock();
        if self.dead.load(Ordering::SeqCst) {
            return false;
        }
        recipients.push(recipient);
        true
    }
    fn unlink_to_death(&self, recipient: &Weak<dyn DeathRecipient>) {
        self.recipients.lock().retain(|r| !Weak::ptr_eq(r, recipient));
    }
}

struct Client {
    name: &'static str,
    endpoint: Arc<Endpoint>,
    caller: CallerContext,
}

impl Client {
    fn new(name: &'static str, id: u64) -> Arc<Self> {
        Arc::new(Self {
            name,
            endpoint: Arc::new(Endpoint {
                id: EndpointId(id),
                recipients: Mutex::new(Vec::new()),
                dead: AtomicBool::new(false),
            }),
            caller: CallerContext {
                pid: 5000 + id as u32,
                uid: 10_000 + id as u32,
            },
        })
    }
}

impl ClientCallbacks for Client {
    fn endpoint(&self) -> Arc<dyn RemoteEndpoint> {
        self.endpoint.clone()
    }
    fn notify_error(&self, error: ClientError) {
        println!("[{}] error: {error:?}", self.name);
    }
}

fn connect(client: &Arc<Client>, device: i32) -> Request {
    Request::Connect {
        callbacks: client.clone(),
        device,
        package: format!("com.example.{}", client.name),
        client_uid: ClientUid::Calling,
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::default())];
    let broker = Broker::builder(BrokerConfig::default(), Arc::new(AllowAll))
        .with_module(Arc::new(DemoModule))
        .with_audio(Arc::new(DemoAudio))
        .with_subscribers(subs)
        .build();
    camvisor::instance::install(&broker);

    let dispatcher = Dispatcher::new(broker.clone());
    let handle = dispatcher.handle();
    let token = CancellationToken::new();
    Arc::clone(&dispatcher).run(token.clone());

    let a = Client::new("alpha", 1);
    let b = Client::new("beta", 2);
    let viewer = Client::new("viewer", 3);

    let Reply::Exclusive(session) = handle.call(a.caller, connect(&a, 0)).await? else {
        anyhow::bail!("unexpected reply");
    };
    println!("[alpha] owns device {}", session.device());

    if let Err(e) = handle.call(b.caller, connect(&b, 0)).await {
        println!("[beta] rejected: {e}");
    }

    let shared = Request::ConnectShared {
        callbacks: viewer.clone(),
        device: 0,
        package: "com.example.viewer".into(),
    };
    if let Reply::Shared(s) = handle.call(viewer.caller, shared).await? {
        println!("[viewer] attached, exclusive lock: {}", s.has_exclusive_lock());
    }

    camvisor::instance::dispatch_device_notification(
        DeviceCookie(0),
        camvisor::DeviceNotification::Shutter,
    );

    println!("[alpha] process dies");
    a.endpoint.die();
    drop(session);

    let Reply::Exclusive(session) = handle.call(b.caller, connect(&b, 0)).await? else {
        anyhow::bail!("unexpected reply");
    };
    println!("[beta] owns device {}", session.device());

    if let Reply::Dump(text) = handle
        .call(b.caller, Request::Dump { args: vec![] })
        .await?
    {
        println!("{text}");
    }

    session.disconnect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();
    camvisor::instance::clear();
    Ok(())
}
