//! Ability tokens.
//!
//! A token is the identity of one ability record as seen by other processes.
//! It accepts no requests; the service looks records up by its `ObjectId`.

use std::sync::Arc;

use ipc::DeathRecipient;
use ipc::MessageOption;
use ipc::ObjectId;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::RemoteObject;
use ipc::object::DeathNotifier;
use ipc::status;

pub const TOKEN_DESCRIPTOR: &str = "ohos.aafwk.AbilityToken";

pub struct Token {
    id: ObjectId,
    record_id: i64,
    death: DeathNotifier,
}

impl Token {
    pub fn new(record_id: i64) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::next(),
            record_id,
            death: DeathNotifier::new(),
        })
    }

    pub fn record_id(&self) -> i64 {
        self.record_id
    }

    /// Marks the token dead once its record is gone.
    pub fn invalidate(&self) {
        self.death.notify(self.id);
    }

    pub fn as_object(self: &Arc<Self>) -> ObjectRef {
        self.clone()
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token").field("id", &self.id).field("record_id", &self.record_id).finish()
    }
}

#[async_trait::async_trait]
impl RemoteObject for Token {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn descriptor(&self) -> &str {
        TOKEN_DESCRIPTOR
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

    async fn send_request(&self, _code: u32, _data: Parcel, _option: MessageOption) -> ipc::Result<Parcel> {
        if !self.death.is_alive() {
            return Err(ipc::Error::DeadObject);
        }
        Err(ipc::Error::Status(status::ERR_UNKNOWN_TRANSACTION))
    }
}
