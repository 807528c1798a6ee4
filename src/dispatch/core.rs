use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::external::{CallerContext, Permission};

use super::error::DispatchError;
use super::request::{Reply, Request};

type ReplyResult = Result<Reply, BrokerError>;

struct Envelope {
    caller: CallerContext,
    request: Request,
    reply: oneshot::Sender<ReplyResult>,
}

/// Reply to a request submitted with [`DispatchHandle::try_call`].
pub struct PendingReply {
    rx: oneshot::Receiver<ReplyResult>,
}

impl PendingReply {
    /// Waits for the dispatcher to answer.
    pub async fn wait(self) -> Result<Reply, DispatchError> {
        match self.rx.await {
            Ok(res) => res.map_err(DispatchError::from),
            Err(_) => Err(DispatchError::Closed),
        }
    }
}

/// Handle for submitting requests to the dispatcher.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Envelope>,
}

impl DispatchHandle {
    /// Submit a request and wait for its reply (waits if the queue is full).
    pub async fn call(&self, caller: CallerContext, request: Request) -> Result<Reply, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                caller,
                request,
                reply,
            })
            .await
            .map_err(|_| DispatchError::Closed)?;
        PendingReply { rx }.wait().await
    }

    /// Try to submit without blocking (fails if the queue is full).
    pub fn try_call(
        &self,
        caller: CallerContext,
        request: Request,
    ) -> Result<PendingReply, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .try_send(Envelope {
                caller,
                request,
                reply,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::Full,
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
            })?;
        Ok(PendingReply { rx })
    }
}

/// Transport-facing front of the broker.
///
/// Applies the transport permission gate, then routes each request to the
/// broker. Broker calls block, so each one runs on the blocking pool.
pub struct Dispatcher {
    broker: Arc<Broker>,
    tx: mpsc::Sender<Envelope>,
    rx: RwLock<Option<mpsc::Receiver<Envelope>>>,
}

impl Dispatcher {
    /// Creates a new dispatcher (must call .run() to start).
    pub fn new(broker: Arc<Broker>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(broker.config().dispatch_queue_capacity_clamped());
        Arc::new(Self {
            broker,
            tx,
            rx: RwLock::new(Some(rx)),
        })
    }

    /// Returns a handle for submitting requests.
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            tx: self.tx.clone(),
        }
    }

    /// Rejects session-opening requests from other processes lacking the camera permission.
    pub fn check(&self, caller: CallerContext, request: &Request) -> Result<(), BrokerError> {
        if !request.opens_session() || caller.pid == self.broker.config().service_pid {
            return Ok(());
        }
        if self
            .broker
            .permissions()
            .check_permission(Permission::Camera, caller)
        {
            return Ok(());
        }
        tracing::error!(
            pid = caller.pid,
            uid = caller.uid,
            request = request.name(),
            "permission denial: can't use the camera"
        );
        Err(BrokerError::denied("missing camera permission"))
    }

    /// Gates and executes one request on the calling thread.
    pub fn dispatch(&self, caller: CallerContext, request: Request) -> Result<Reply, BrokerError> {
        self.check(caller, &request)?;
        crate::log2!(pid = caller.pid, request = request.name(), "dispatch");

        match request {
            Request::Connect {
                callbacks,
                device,
                package,
                client_uid,
            } => self
                .broker
                .connect(callbacks, device, &package, client_uid, caller)
                .map(Reply::Exclusive),
            Request::ConnectShared {
                callbacks,
                device,
                package,
            } => self
                .broker
                .connect_shared(callbacks, device, &package, caller)
                .map(Reply::Shared),
            Request::DeviceCount => Ok(Reply::DeviceCount(self.broker.device_count())),
            Request::DeviceInfo { device } => self.broker.device_info(device).map(Reply::DeviceInfo),
            Request::Dump { args } => Ok(Reply::Dump(self.broker.dump(&args, caller))),
        }
    }

    /// Starts the dispatch loop (spawns in background).
    pub fn run(self: Arc<Self>, token: CancellationToken) {
        tokio::spawn(async move {
            if let Err(e) = Arc::clone(&self).run_inner(token).await {
                tracing::error!(error = ?e, "dispatcher stopped");
            }
        });
    }

    async fn run_inner(self: Arc<Self>, token: CancellationToken) -> anyhow::Result<()> {
        let mut rx = self
            .rx
            .write()
            .await
            .take()
            .ok_or_else(|| anyhow::anyhow!("dispatcher already running"))?;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,

                msg = rx.recv() => {
                    let Some(envelope) = msg else { break };
                    self.spawn_request(envelope);
                }
            }
        }
        Ok(())
    }

    fn spawn_request(self: &Arc<Self>, envelope: Envelope) {
        let me = Arc::clone(self);
        let Envelope {
            caller,
            request,
            reply,
        } = envelope;
        let name = request.name();

        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || me.dispatch(caller, request)).await {
                Ok(res) => {
                    let _ = reply.send(res);
                }
                Err(e) => {
                    tracing::error!(request = name, error = %e, "request handler failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::broker::ClientUid;
    use crate::testing::{FakeClient, Harness, PACKAGE, SERVICE_PID};

    fn connect(client: &Arc<FakeClient>, device: i32) -> Request {
        Request::Connect {
            callbacks: client.clone(),
            device,
            package: PACKAGE.to_string(),
            client_uid: ClientUid::Calling,
        }
    }

    #[test]
    fn gate_rejects_foreign_callers_without_permission() {
        let h = Harness::new(1);
        h.authority.set_transport_allowed(false);
        let dispatcher = Dispatcher::new(h.broker.clone());
        let client = h.client(1);

        let res = dispatcher.dispatch(client.caller, connect(&client, 0));
        assert!(matches!(res, Err(BrokerError::PermissionDenied { .. })));
        assert_eq!(h.module.opens.load(Ordering::SeqCst), 0);

        let shared = Request::ConnectShared {
            callbacks: client.clone(),
            device: 0,
            package: PACKAGE.to_string(),
        };
        assert!(matches!(
            dispatcher.dispatch(client.caller, shared),
            Err(BrokerError::PermissionDenied { .. })
        ));

        // Queries are not gated.
        assert!(matches!(
            dispatcher.dispatch(client.caller, Request::DeviceCount),
            Ok(Reply::DeviceCount(1))
        ));
    }

    #[test]
    fn own_process_bypasses_the_gate() {
        let h = Harness::new(1);
        h.authority.set_transport_allowed(false);
        let dispatcher = Dispatcher::new(h.broker.clone());
        let client = h.client(1);
        let own = CallerContext {
            pid: SERVICE_PID,
            uid: 1000,
        };

        let reply = dispatcher.dispatch(own, connect(&client, 0)).expect("connect");
        assert!(matches!(reply, Reply::Exclusive(ref s) if s.device() == 0));
    }

    #[test]
    fn routes_queries_and_dump() {
        let h = Harness::new(2);
        let dispatcher = Dispatcher::new(h.broker.clone());
        let caller = CallerContext { pid: 5, uid: 5 };

        let info = dispatcher
            .dispatch(caller, Request::DeviceInfo { device: 1 })
            .expect("info");
        assert!(matches!(info, Reply::DeviceInfo(i) if i.orientation == 270));
        assert!(matches!(
            dispatcher.dispatch(caller, Request::DeviceInfo { device: 9 }),
            Err(BrokerError::InvalidArgument { device: 9 })
        ));
        let dump = dispatcher
            .dispatch(caller, Request::Dump { args: Vec::new() })
            .expect("dump");
        assert!(matches!(dump, Reply::Dump(ref text) if text.contains("Number of devices: 2")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn handle_round_trip_through_running_loop() {
        let h = Harness::new(1);
        let dispatcher = Dispatcher::new(h.broker.clone());
        let handle = dispatcher.handle();
        let token = CancellationToken::new();
        Arc::clone(&dispatcher).run(token.clone());

        let a = h.client(1);
        let b = h.client(2);
        let reply = handle.call(a.caller, connect(&a, 0)).await.expect("a connects");
        let Reply::Exclusive(session) = reply else {
            panic!("expected exclusive session");
        };

        let pending = handle.try_call(b.caller, connect(&b, 0)).expect("queued");
        assert!(matches!(
            pending.wait().await,
            Err(DispatchError::Broker(BrokerError::AlreadyInUse { device: 0 }))
        ));

        session.disconnect();
        token.cancel();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(matches!(
            handle.call(b.caller, Request::DeviceCount).await,
            Err(DispatchError::Closed)
        ));
    }

    #[tokio::test]
    async fn second_run_is_rejected() {
        let h = Harness::new(1);
        let dispatcher = Dispatcher::new(h.broker.clone());
        let token = CancellationToken::new();

        let first = Arc::clone(&dispatcher).run_inner(token.clone());
        token.cancel();
        first.await.expect("first run");

        let err = Arc::clone(&dispatcher)
            .run_inner(token)
            .await
            .expect_err("already running");
        assert!(err.to_string().contains("already running"));
    }
}
