use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;

use ipc::ObjectRef;
use tracing::debug;
use tracing::warn;

use super::callback::AbilityConnection;
use super::callback::AbilityConnectionProxy;
use crate::error;
use crate::error::Error;
use crate::error::Result;
use crate::info::ConnectionData;
use crate::record::AbilityRecord;
use crate::state::ConnectionState;
use crate::want::ElementName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// `connect_ability`: the callback receives the service's remote object.
    Connect,
    /// `start_ability_by_call`: the callback receives the callee object.
    Call,
}

/// One client bound to one service ability.
///
/// Owned by the target record's connection list and by the service's
/// callback index. The target is held weakly.
pub struct ConnectionRecord {
    id: i64,
    kind: ConnectionKind,
    caller_token: Option<ObjectRef>,
    caller_name: String,
    target: Weak<AbilityRecord>,
    element: ElementName,
    callback: AbilityConnectionProxy,
    state: Mutex<ConnectionState>,
}

impl ConnectionRecord {
    pub fn new(
        id: i64,
        kind: ConnectionKind,
        caller_token: Option<ObjectRef>,
        caller_name: impl Into<String>,
        target: &Arc<AbilityRecord>,
        callback: ObjectRef,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            caller_token,
            caller_name: caller_name.into(),
            target: Arc::downgrade(target),
            element: target.element(),
            callback: AbilityConnectionProxy::new(callback),
            state: Mutex::new(ConnectionState::Connecting),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn caller_token(&self) -> Option<&ObjectRef> {
        self.caller_token.as_ref()
    }

    pub fn callback_object(&self) -> &ObjectRef {
        self.callback.remote()
    }

    pub fn target(&self) -> Option<Arc<AbilityRecord>> {
        self.target.upgrade()
    }

    pub fn element(&self) -> &ElementName {
        &self.element
    }

    fn move_to(&self, next: ConnectionState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_move_to(next) {
            warn!(connection = self.id, from = %*state, to = %next, "rejected connection transition");
            return Err(Error::InvalidConnectionState);
        }
        debug!(connection = self.id, from = %*state, to = %next, "connection transition");
        *state = next;
        Ok(())
    }

    /// The service ability returned its remote object.
    pub fn complete_connect(&self) -> Result<()> {
        self.move_to(ConnectionState::Connected)
    }

    /// Starts a disconnect. Only a connected record can disconnect.
    pub fn disconnect(&self) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            warn!(connection = self.id, state = %self.state(), "disconnect of a connection that is not connected");
            return Err(Error::InvalidConnectionState);
        }
        self.move_to(ConnectionState::Disconnecting)
    }

    /// The service ability finished `on_disconnect`.
    pub fn complete_disconnect(&self) -> Result<()> {
        self.move_to(ConnectionState::Disconnected)
    }

    /// Abandons a connect that never completed, or takes a record down when
    /// its peer died. Walks the remaining steps of the cycle.
    pub fn abort(&self) {
        if matches!(self.state(), ConnectionState::Connecting | ConnectionState::Connected)
            && self.move_to(ConnectionState::Disconnecting).is_err()
        {
            return;
        }
        if self.state() == ConnectionState::Disconnecting && self.move_to(ConnectionState::Disconnected).is_ok() {
            debug!(connection = self.id, "connection aborted");
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.state() == ConnectionState::Disconnected
    }

    pub async fn notify_connect_done(&self, remote: Option<ObjectRef>) {
        self.callback.on_ability_connect_done(self.element.clone(), remote, error::ERR_OK).await;
    }

    pub async fn notify_connect_failed(&self, code: i32) {
        self.callback.on_ability_connect_done(self.element.clone(), None, code).await;
    }

    pub async fn notify_disconnect_done(&self, code: i32) {
        self.callback.on_ability_disconnect_done(self.element.clone(), code).await;
    }

    pub fn connection_data(&self) -> ConnectionData {
        let extension_type = self
            .target()
            .map(|t| t.ability_info().extension_type)
            .unwrap_or_default();
        ConnectionData {
            extension_element: self.element.clone(),
            extension_type,
            caller_uid: 0,
            caller_pid: 0,
            caller_name: self.caller_name.clone(),
        }
    }

    pub fn dump(&self) -> String {
        format!("connection #{} {:?} {} -> {}", self.id, self.kind, self.state(), self.element)
    }
}
