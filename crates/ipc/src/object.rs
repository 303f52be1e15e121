//! # Remote Objects
//!
//! A remote object is an opaque, identity-comparable handle to an endpoint
//! that may live in another process. Handles are shared (`Arc`) and compared
//! by `ObjectId`, never by address.
//!
//! ## Invariants
//!
//! - Death recipients fire at most once, and only after the object died.
//!   Registering on an object that is already dead fails.
//! - One-way requests sent to the same `LocalObject` are handled in the order
//!   they were sent.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tracing::debug;

use crate::Error;
use crate::Result;
use crate::parcel::ObjectRef;
use crate::parcel::Parcel;
use crate::status;
use crate::stub::RemoteStub;

/// Process-unique identity of a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Allocates a fresh identity.
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Synchronous request: the caller waits for the reply.
pub const TF_SYNC: u32 = 0x00;
/// One-way request: the caller does not wait and receives an empty reply.
pub const TF_ASYNC: u32 = 0x01;

/// Per-request transmission flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageOption {
    flags: u32,
}

impl MessageOption {
    pub const fn sync() -> Self {
        Self { flags: TF_SYNC }
    }

    pub const fn oneway() -> Self {
        Self { flags: TF_ASYNC }
    }

    pub const fn from_flags(flags: u32) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn is_async(&self) -> bool {
        self.flags & TF_ASYNC != 0
    }
}

/// Receives a notification when the object it is registered on dies.
pub trait DeathRecipient: Send + Sync + 'static {
    fn on_remote_died(&self, object: ObjectId);
}

/// An endpoint that accepts code-numbered requests.
#[async_trait::async_trait]
pub trait RemoteObject: Send + Sync + 'static {
    fn object_id(&self) -> ObjectId;

    /// Interface descriptor of the endpoint, empty for plain tokens.
    fn descriptor(&self) -> &str;

    fn is_alive(&self) -> bool;

    /// Returns `false` if the object is already dead.
    fn add_death_recipient(&self, recipient: Arc<dyn DeathRecipient>) -> bool;

    fn remove_death_recipient(&self, recipient: &Arc<dyn DeathRecipient>) -> bool;

    /// Sends a request. `data` must start with the interface token.
    ///
    /// A non-zero status returned by the receiving stub surfaces as
    /// `Error::Status`. One-way requests resolve with an empty reply as soon
    /// as they are queued.
    async fn send_request(&self, code: u32, data: Parcel, option: MessageOption) -> Result<Parcel>;
}

/// Identity comparison of two object handles.
pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    a.object_id() == b.object_id()
}

/// Book-keeping for liveness and death recipients.
pub struct DeathNotifier {
    alive: AtomicBool,
    recipients: Mutex<Vec<Arc<dyn DeathRecipient>>>,
}

impl Default for DeathNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DeathNotifier {
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            recipients: Mutex::new(Vec::new()),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn add(&self, recipient: Arc<dyn DeathRecipient>) -> bool {
        let mut recipients = self.recipients.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_alive() {
            return false;
        }
        recipients.push(recipient);
        true
    }

    pub fn remove(&self, recipient: &Arc<dyn DeathRecipient>) -> bool {
        let mut recipients = self.recipients.lock().unwrap_or_else(PoisonError::into_inner);
        let before = recipients.len();
        recipients.retain(|r| !Arc::ptr_eq(r, recipient));
        recipients.len() != before
    }

    /// Marks the object dead and fires every recipient once.
    pub fn notify(&self, object: ObjectId) {
        let recipients = {
            let mut recipients = self.recipients.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.alive.swap(false, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *recipients)
        };
        debug!(%object, recipients = recipients.len(), "remote object died");
        for recipient in recipients {
            recipient.on_remote_died(object);
        }
    }
}

struct OnewayCall {
    code: u32,
    data: Parcel,
    option: MessageOption,
}

/// An in-process endpoint that hands requests straight to a stub.
pub struct LocalObject {
    id: ObjectId,
    stub: Arc<dyn RemoteStub>,
    death: DeathNotifier,
    oneway: OnceLock<mpsc::UnboundedSender<OnewayCall>>,
}

impl LocalObject {
    pub fn new(stub: Arc<dyn RemoteStub>) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::next(),
            stub,
            death: DeathNotifier::new(),
            oneway: OnceLock::new(),
        })
    }

    /// Wraps a stub and returns it as a shareable object handle.
    pub fn wrap(stub: impl RemoteStub) -> ObjectRef {
        Self::new(Arc::new(stub))
    }

    pub fn stub(&self) -> &Arc<dyn RemoteStub> {
        &self.stub
    }

    /// Simulates the owning process dying: recipients fire and later
    /// requests fail with `Error::DeadObject`.
    pub fn kill(&self) {
        self.death.notify(self.id);
    }

    /// Lazily starts the worker that serializes one-way requests.
    fn oneway_sender(&self) -> &mpsc::UnboundedSender<OnewayCall> {
        self.oneway.get_or_init(|| {
            let (tx, mut rx) = mpsc::unbounded_channel::<OnewayCall>();
            let stub = self.stub.clone();
            let id = self.id;
            tokio::spawn(async move {
                while let Some(mut call) = rx.recv().await {
                    let mut reply = Parcel::new();
                    let status = stub
                        .on_remote_request(call.code, &mut call.data, &mut reply, call.option)
                        .await;
                    if status != status::ERR_NONE {
                        debug!(object = %id, code = call.code, status, "one-way request rejected");
                    }
                }
            });
            tx
        })
    }
}

#[async_trait::async_trait]
impl RemoteObject for LocalObject {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn descriptor(&self) -> &str {
        self.stub.descriptor()
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

    async fn send_request(&self, code: u32, mut data: Parcel, option: MessageOption) -> Result<Parcel> {
        if !self.death.is_alive() {
            return Err(Error::DeadObject);
        }
        data.rewind();

        if option.is_async() {
            self.oneway_sender()
                .send(OnewayCall { code, data, option })
                .map_err(|_| Error::DeadObject)?;
            return Ok(Parcel::new());
        }

        let mut reply = Parcel::new();
        let status = self.stub.on_remote_request(code, &mut data, &mut reply, option).await;
        if status != status::ERR_NONE {
            return Err(Error::Status(status));
        }
        reply.rewind();
        Ok(reply)
    }
}
