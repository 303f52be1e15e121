//! Connection observers: system components that watch extensions being
//! connected and disconnected.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use ipc::MessageOption;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::RemoteStub;
use ipc::parcel;
use ipc::same_object;
use ipc::status;
use ipc::stub::check_interface_token;
use ipc::stub::default_on_remote_request;
use tracing::debug;
use tracing::warn;

use crate::info::ConnectionData;

pub const DESCRIPTOR: &str = "ohos.aafwk.ConnectionObserver";

pub const ON_EXTENSION_CONNECTED: u32 = 0;
pub const ON_EXTENSION_DISCONNECTED: u32 = 1;

#[async_trait::async_trait]
pub trait ConnectionObserver: Send + Sync + 'static {
    async fn on_extension_connected(&self, data: ConnectionData);

    async fn on_extension_disconnected(&self, data: ConnectionData);
}

pub struct ConnectionObserverStub {
    observer: Arc<dyn ConnectionObserver>,
}

impl ConnectionObserverStub {
    pub fn new(observer: Arc<dyn ConnectionObserver>) -> Self {
        Self { observer }
    }
}

#[async_trait::async_trait]
impl RemoteStub for ConnectionObserverStub {
    fn descriptor(&self) -> &str {
        DESCRIPTOR
    }

    async fn on_remote_request(&self, code: u32, data: &mut Parcel, reply: &mut Parcel, _option: MessageOption) -> i32 {
        if !check_interface_token(data, DESCRIPTOR) {
            return status::ERR_INVALID_STATE;
        }
        if code != ON_EXTENSION_CONNECTED && code != ON_EXTENSION_DISCONNECTED {
            return default_on_remote_request(DESCRIPTOR, code, reply);
        }
        let payload: ConnectionData = match data.read_parcelable() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(code, error = %e, "malformed observer notification");
                return status::ERR_INVALID_VALUE;
            }
        };
        if code == ON_EXTENSION_CONNECTED {
            self.observer.on_extension_connected(payload).await;
        } else {
            self.observer.on_extension_disconnected(payload).await;
        }
        status::ERR_NONE
    }
}

pub struct ConnectionObserverProxy {
    remote: ObjectRef,
}

impl ConnectionObserverProxy {
    pub fn new(remote: ObjectRef) -> Self {
        Self { remote }
    }

    async fn post(&self, code: u32, payload: &ConnectionData) {
        let data = match encode(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!(code, error = %e, "failed to encode observer notification");
                return;
            }
        };
        if let Err(e) = self.remote.send_request(code, data, MessageOption::oneway()).await {
            warn!(code, object = %self.remote.object_id(), error = %e, "observer notification failed");
        }
    }
}

fn encode(payload: &ConnectionData) -> parcel::Result<Parcel> {
    let mut p = Parcel::new();
    p.write_interface_token(DESCRIPTOR)?;
    p.write_parcelable(payload)?;
    Ok(p)
}

#[async_trait::async_trait]
impl ConnectionObserver for ConnectionObserverProxy {
    async fn on_extension_connected(&self, data: ConnectionData) {
        self.post(ON_EXTENSION_CONNECTED, &data).await
    }

    async fn on_extension_disconnected(&self, data: ConnectionData) {
        self.post(ON_EXTENSION_DISCONNECTED, &data).await
    }
}

/// The set of registered observers.
#[derive(Default)]
pub struct ObserverController {
    observers: Mutex<Vec<ObjectRef>>,
}

impl ObserverController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `observer` is already registered.
    pub fn add(&self, observer: ObjectRef) -> bool {
        let mut observers = self.lock();
        if observers.iter().any(|o| same_object(o, &observer)) {
            return false;
        }
        observers.push(observer);
        true
    }

    pub fn remove(&self, observer: &ObjectRef) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|o| !same_object(o, observer));
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Live observers. Dead ones are dropped on the way.
    pub fn snapshot(&self) -> Vec<ConnectionObserverProxy> {
        let mut observers = self.lock();
        observers.retain(|o| {
            let alive = o.is_alive();
            if !alive {
                debug!(object = %o.object_id(), "dropping dead connection observer");
            }
            alive
        });
        observers.iter().cloned().map(ConnectionObserverProxy::new).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ObjectRef>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
