//! # Peer with Async Pump
//!
//! A `Peer` is one end of a byte transport, seen as a remote object. It
//! spawns a pump task that reads frames, routes replies to pending requests
//! by sequence number, and (when serving a stub) dispatches inbound calls.
//!
//! ## Invariants
//!
//! - Each peer owns its transport exclusively; sequence numbers are scoped to
//!   that transport.
//! - When the stream closes, every pending request fails with
//!   `Error::DeadObject` and death recipients fire once.
//! - Inbound one-way calls are handled one at a time, in arrival order.
//!   Synchronous calls are handled concurrently so a handler may call back
//!   over the same transport.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::Error;
use crate::Result;
use crate::frame::Frame;
use crate::object::DeathNotifier;
use crate::object::DeathRecipient;
use crate::object::MessageOption;
use crate::object::ObjectId;
use crate::object::RemoteObject;
use crate::parcel::Parcel;
use crate::status;
use crate::stub::RemoteStub;
use crate::transport::Transport;

/// Default bound on how long a synchronous request waits for its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type PendingReply = oneshot::Sender<Result<(i32, Vec<u8>)>>;

struct InboundCall {
    seq: u64,
    code: u32,
    flags: u32,
    payload: Vec<u8>,
}

/// One end of a byte transport, usable as a remote object.
pub struct Peer {
    id: ObjectId,
    name: String,
    descriptor: String,
    transport: Arc<dyn Transport>,
    pending: Arc<DashMap<u64, PendingReply>>,
    seq_gen: AtomicU64,
    timeout: Duration,
    death: Arc<DeathNotifier>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Peer {
    /// Creates a client-only peer. Inbound calls are rejected.
    pub fn connect(
        name: impl Into<String>,
        descriptor: impl Into<String>,
        transport: Box<dyn Transport>,
        timeout: Duration,
    ) -> Arc<Self> {
        Self::spawn(name.into(), descriptor.into(), transport, None, timeout)
    }

    /// Creates a peer that serves `stub` to the other end and can also send
    /// requests of its own.
    pub fn serve(
        name: impl Into<String>,
        transport: Box<dyn Transport>,
        stub: Arc<dyn RemoteStub>,
        timeout: Duration,
    ) -> Arc<Self> {
        let descriptor = stub.descriptor().to_string();
        Self::spawn(name.into(), descriptor, transport, Some(stub), timeout)
    }

    fn spawn(
        name: String,
        descriptor: String,
        transport: Box<dyn Transport>,
        stub: Option<Arc<dyn RemoteStub>>,
        timeout: Duration,
    ) -> Arc<Self> {
        let id = ObjectId::next();
        let transport: Arc<dyn Transport> = Arc::from(transport);
        let pending: Arc<DashMap<u64, PendingReply>> = Arc::new(DashMap::new());
        let death = Arc::new(DeathNotifier::new());

        let pump = tokio::spawn(Self::pump(
            name.clone(),
            id,
            transport.clone(),
            pending.clone(),
            death.clone(),
            stub,
        ));

        Arc::new(Self {
            id,
            name,
            descriptor,
            transport,
            pending,
            seq_gen: AtomicU64::new(1),
            timeout,
            death,
            pump: Mutex::new(Some(pump)),
        })
    }

    async fn pump(
        name: String,
        id: ObjectId,
        transport: Arc<dyn Transport>,
        pending: Arc<DashMap<u64, PendingReply>>,
        death: Arc<DeathNotifier>,
        stub: Option<Arc<dyn RemoteStub>>,
    ) {
        let oneway = stub.as_ref().map(|stub| Self::spawn_oneway_worker(stub.clone()));

        let reason = loop {
            match transport.recv().await {
                Ok(Some(bytes)) => match Frame::decode(bytes) {
                    Ok(Frame::Reply { seq, status, payload }) => {
                        // Late replies for timed-out requests have no waiter.
                        if let Some((_, tx)) = pending.remove(&seq) {
                            let _ = tx.send(Ok((status, payload)));
                        }
                    }
                    Ok(Frame::Call { seq, code, flags, payload }) => {
                        let call = InboundCall { seq, code, flags, payload };
                        Self::dispatch_inbound(&transport, stub.as_ref(), oneway.as_ref(), call);
                    }
                    Err(e) => {
                        warn!(peer = %name, error = %e, "undecodable frame");
                        break e;
                    }
                },
                Ok(None) => break Error::DeadObject,
                Err(e) => break Error::Transport(e),
            }
        };

        debug!(peer = %name, reason = %reason, "pump stopped");
        death.notify(id);
        Self::fail_all_pending(&pending);
    }

    fn spawn_oneway_worker(stub: Arc<dyn RemoteStub>) -> mpsc::UnboundedSender<InboundCall> {
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundCall>();
        tokio::spawn(async move {
            while let Some(call) = rx.recv().await {
                let mut data = Parcel::from_bytes(call.payload);
                let mut reply = Parcel::new();
                let option = MessageOption::from_flags(call.flags);
                let status = stub.on_remote_request(call.code, &mut data, &mut reply, option).await;
                if status != status::ERR_NONE {
                    debug!(code = call.code, status, "inbound one-way call rejected");
                }
            }
        });
        tx
    }

    fn dispatch_inbound(
        transport: &Arc<dyn Transport>,
        stub: Option<&Arc<dyn RemoteStub>>,
        oneway: Option<&mpsc::UnboundedSender<InboundCall>>,
        call: InboundCall,
    ) {
        let option = MessageOption::from_flags(call.flags);
        if option.is_async() {
            if let Some(oneway) = oneway {
                let _ = oneway.send(call);
            }
            return;
        }

        let transport = transport.clone();
        let stub = stub.cloned();
        tokio::spawn(async move {
            let seq = call.seq;
            let (status, payload) = match stub {
                Some(stub) => {
                    let mut data = Parcel::from_bytes(call.payload);
                    let mut reply = Parcel::new();
                    let status = stub.on_remote_request(call.code, &mut data, &mut reply, option).await;
                    if reply.has_objects() {
                        warn!(code = call.code, "reply carries objects over a byte transport");
                        (status::ERR_INVALID_OPERATION, Vec::new())
                    } else {
                        (status, reply.into_parts().0)
                    }
                }
                None => (status::ERR_UNKNOWN_TRANSACTION, Vec::new()),
            };

            let frame = match (Frame::Reply { seq, status, payload }).encode() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(seq, error = %e, "failed to encode reply frame");
                    return;
                }
            };
            if let Err(e) = transport.send(&frame).await {
                debug!(seq, error = %e, "reply dropped");
            }
        });
    }

    fn fail_all_pending(pending: &DashMap<u64, PendingReply>) {
        let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, tx)) = pending.remove(&key) {
                let _ = tx.send(Err(Error::DeadObject));
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Closes the transport and stops the pump. Pending requests fail.
    pub async fn shutdown(&self) {
        self.transport.close().await;
        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pump) = pump {
            pump.abort();
        }
        self.death.notify(self.id);
        Self::fail_all_pending(&self.pending);
    }
}

#[async_trait::async_trait]
impl RemoteObject for Peer {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn is_alive(&self) -> bool {
        self.death.is_alive()
    }

    fn add_death_recipient(&self, recipient: Arc<dyn DeathRecipient>) -> bool {
        self.death.add(recipient)
    }

    fn remove_death_recipient(&self, recipient: &Arc<dyn DeathRecipient>) -> bool {
        self.death.remove(recipient)
    }

    async fn send_request(&self, code: u32, data: Parcel, option: MessageOption) -> Result<Parcel> {
        if !self.death.is_alive() {
            return Err(Error::DeadObject);
        }
        if data.has_objects() {
            return Err(Error::ObjectNotTransferable);
        }

        let seq = self.seq_gen.fetch_add(1, Ordering::Relaxed);
        let (payload, _) = data.into_parts();
        let frame = (Frame::Call { seq, code, flags: option.flags(), payload }).encode()?;

        if option.is_async() {
            self.transport.send(&frame).await?;
            return Ok(Parcel::new());
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);
        if !self.death.is_alive() {
            self.pending.remove(&seq);
            return Err(Error::DeadObject);
        }

        if let Err(e) = self.transport.send(&frame).await {
            self.pending.remove(&seq);
            return Err(e.into());
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok((status, payload)))) => {
                if status != status::ERR_NONE {
                    return Err(Error::Status(status));
                }
                Ok(Parcel::from_bytes(payload))
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => {
                self.pending.remove(&seq);
                Err(Error::ChannelClosed)
            }
            Err(_) => {
                self.pending.remove(&seq);
                Err(Error::Timeout)
            }
        }
    }
}
