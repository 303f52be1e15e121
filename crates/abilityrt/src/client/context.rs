//! # Ability Context
//!
//! What an ability uses to reach the manager: starting other abilities,
//! connecting to services, calling abilities, and terminating itself.
//!
//! Every service connection made here is filed in a `ConnectionRegistry`, so
//! an explicit `disconnect_ability` and a disconnect notification from the
//! manager both find it, and whichever comes second is a no-op.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use ipc::LocalObject;
use ipc::ObjectRef;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

use crate::config::RuntimeConfig;
use crate::connection::AbilityConnection;
use crate::connection::AbilityConnectionStub;
use crate::connection::ConnectionRegistry;
use crate::connection::ServiceConnection;
use crate::connection::registry::DEFAULT_ACCOUNT_ID;
use crate::error;
use crate::error::Error;
use crate::error::Result;
use crate::info::StartOptions;
use crate::manager::AbilityManager;
use crate::manager::DEFAULT_INVALID_USER_ID;
use crate::want::ElementName;
use crate::want::Want;

/// A client connection: forwards callbacks to the app and owns the callback
/// object handed to the manager until released.
pub struct ClientConnection {
    id: AtomicI64,
    callbacks: Arc<dyn AbilityConnection>,
    object: Mutex<Option<ObjectRef>>,
    registry: Weak<ConnectionRegistry>,
}

impl ClientConnection {
    fn new(callbacks: Arc<dyn AbilityConnection>, registry: &Arc<ConnectionRegistry>) -> Arc<Self> {
        let connection = Arc::new(Self {
            id: AtomicI64::new(-1),
            callbacks,
            object: Mutex::new(None),
            registry: Arc::downgrade(registry),
        });
        let handler: Arc<dyn AbilityConnection> = connection.clone();
        let object = LocalObject::wrap(AbilityConnectionStub::new(handler));
        *connection.object.lock().unwrap_or_else(PoisonError::into_inner) = Some(object);
        connection
    }

    fn forget(&self) {
        let id = self.connection_id();
        if let Some(registry) = self.registry.upgrade() {
            if registry.find_by_id(id).is_some() {
                registry.remove(id);
            }
        }
    }
}

#[async_trait::async_trait]
impl AbilityConnection for ClientConnection {
    async fn on_ability_connect_done(&self, element: ElementName, remote: Option<ObjectRef>, result_code: i32) {
        self.callbacks.on_ability_connect_done(element, remote, result_code).await;
        if result_code != error::ERR_OK {
            self.forget();
        }
    }

    async fn on_ability_disconnect_done(&self, element: ElementName, result_code: i32) {
        self.callbacks.on_ability_disconnect_done(element, result_code).await;
        self.forget();
    }
}

impl ServiceConnection for ClientConnection {
    fn set_connection_id(&self, id: i64) {
        self.id.store(id, Ordering::Release);
    }

    fn connection_id(&self) -> i64 {
        self.id.load(Ordering::Acquire)
    }

    fn connection_object(&self) -> Option<ObjectRef> {
        self.object.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn release(&self) {
        let released = self.object.lock().unwrap_or_else(PoisonError::into_inner).take();
        if released.is_some() {
            debug!(connection = self.connection_id(), "client connection released");
        }
    }
}

/// Resolves a pending `start_ability_by_call` with the first answer.
struct CallWaiter {
    reply: Mutex<Option<oneshot::Sender<std::result::Result<ObjectRef, i32>>>>,
}

#[async_trait::async_trait]
impl AbilityConnection for CallWaiter {
    async fn on_ability_connect_done(&self, _element: ElementName, remote: Option<ObjectRef>, result_code: i32) {
        let Some(reply) = self.reply.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };
        let answer = match (remote, result_code) {
            (Some(callee), error::ERR_OK) => Ok(callee),
            (None, error::ERR_OK) => Err(error::ERR_INVALID_VALUE),
            (_, code) => Err(code),
        };
        let _ = reply.send(answer);
    }

    async fn on_ability_disconnect_done(&self, element: ElementName, result_code: i32) {
        debug!(element = %element, result_code, "call released");
    }
}

pub struct AbilityContext {
    token: ObjectRef,
    manager: Arc<dyn AbilityManager>,
    config: Arc<RuntimeConfig>,
    connections: Arc<ConnectionRegistry>,
    calls: DashMap<ElementName, ObjectRef>,
}

impl AbilityContext {
    pub fn new(token: ObjectRef, manager: Arc<dyn AbilityManager>, config: Arc<RuntimeConfig>) -> Self {
        Self {
            token,
            manager,
            config,
            connections: Arc::new(ConnectionRegistry::new()),
            calls: DashMap::new(),
        }
    }

    pub fn token(&self) -> &ObjectRef {
        &self.token
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub async fn start_ability(&self, want: Want, options: Option<StartOptions>) -> Result<()> {
        let caller = Some(self.token.clone());
        match options {
            Some(options) => {
                self.manager
                    .start_ability_with_options(want, options, caller, DEFAULT_INVALID_USER_ID, -1)
                    .await
            }
            None => {
                self.manager
                    .start_ability_with_caller(want, caller, DEFAULT_INVALID_USER_ID, -1)
                    .await
            }
        }
    }

    /// Starts an ability whose result comes back through `on_ability_result`
    /// with `request_code`.
    pub async fn start_ability_for_result(&self, want: Want, request_code: i32) -> Result<()> {
        self.manager
            .start_ability_with_caller(want, Some(self.token.clone()), DEFAULT_INVALID_USER_ID, request_code)
            .await
    }

    /// Binds to a service. Returns the connection id used to disconnect.
    pub async fn connect_ability(&self, want: Want, callbacks: Arc<dyn AbilityConnection>) -> Result<i64> {
        let connection = ClientConnection::new(callbacks, &self.connections);
        let Some(object) = connection.connection_object() else {
            return Err(Error::InnerError);
        };
        let shared: Arc<dyn ServiceConnection> = connection;
        let id = self.connections.insert(Some(shared), want.clone(), DEFAULT_ACCOUNT_ID)?;
        let connected = self
            .manager
            .connect_ability(want, object, Some(self.token.clone()), DEFAULT_INVALID_USER_ID)
            .await;
        if let Err(e) = connected {
            warn!(connection = id, error = %e, "connect rejected");
            self.connections.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    pub async fn disconnect_ability(&self, id: i64) -> Result<()> {
        let Some(connection) = self.connections.find_by_id(id) else {
            warn!(connection = id, "disconnect of an unknown connection");
            return Err(Error::ConnectionNotExist);
        };
        let Some(object) = connection.connection_object() else {
            self.connections.remove(id);
            return Err(Error::ConnectionNotExist);
        };
        let result = self.manager.disconnect_ability(object).await;
        self.connections.remove(id);
        result
    }

    pub async fn terminate_self(&self) -> Result<()> {
        self.manager.terminate_ability(Some(self.token.clone()), -1, None).await
    }

    pub async fn terminate_self_with_result(&self, result_code: i32, want: Want) -> Result<()> {
        self.manager
            .terminate_ability(Some(self.token.clone()), result_code, Some(want))
            .await
    }

    /// Starts (or reaches) an ability and waits for its callee, at most
    /// `caller_timeout`. On timeout the call is released again.
    pub async fn start_ability_by_call(&self, want: Want) -> Result<ObjectRef> {
        let element = want.element.clone();
        let (tx, rx) = oneshot::channel();
        let waiter: Arc<dyn AbilityConnection> = Arc::new(CallWaiter { reply: Mutex::new(Some(tx)) });
        let object = LocalObject::wrap(AbilityConnectionStub::new(waiter));
        self.manager
            .start_ability_by_call(want, object.clone(), Some(self.token.clone()), DEFAULT_ACCOUNT_ID)
            .await?;

        match tokio::time::timeout(self.config.caller_timeout, rx).await {
            Ok(Ok(Ok(callee))) => {
                self.calls.insert(element, object);
                Ok(callee)
            }
            Ok(Ok(Err(code))) => Err(Error::from_code(code)),
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => {
                warn!(element = %element, "callee did not arrive in time, releasing call");
                if let Err(e) = self.manager.release_call(object, element).await {
                    debug!(error = %e, "release after timeout failed");
                }
                Err(Error::Timeout)
            }
        }
    }

    pub async fn release_call(&self, element: &ElementName) -> Result<()> {
        let Some((element, object)) = self.calls.remove(element) else {
            return Err(Error::ConnectionNotExist);
        };
        self.manager.release_call(object, element).await
    }
}
