//! Service connections and ability calls.
//!
//! Both are tracked as `ConnectionRecord`s on the target record and in the
//! callback index. A connect completes when the service returns its remote
//! object; a call completes when the ability publishes its callee.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::Ordering;

use ipc::DeathRecipient;
use ipc::ObjectId;
use ipc::ObjectRef;
use ipc::same_object;
use tracing::debug;
use tracing::warn;

use super::AbilityManagerService;
use crate::connection::ConnectionKind;
use crate::connection::ConnectionObserver;
use crate::connection::ConnectionRecord;
use crate::error;
use crate::error::Error;
use crate::error::Result;
use crate::info::AbilityType;
use crate::info::LaunchMode;
use crate::record::AbilityRecord;
use crate::state::AbilityState;
use crate::state::ConnectionState;
use crate::want::ElementName;
use crate::want::Want;

fn pending(record: &AbilityRecord, kind: ConnectionKind) -> Vec<Arc<ConnectionRecord>> {
    record
        .connections()
        .into_iter()
        .filter(|c| c.kind() == kind && c.state() == ConnectionState::Connecting)
        .collect()
}

impl AbilityManagerService {
    fn caller_name(&self, caller: Option<&ObjectRef>) -> String {
        caller
            .and_then(|c| self.record_by_token(c))
            .map(|r| r.ability_info().bundle_name.clone())
            .unwrap_or_default()
    }

    /// Files `connection` under its target and its callback. The first
    /// connection through a callback starts watching it for death.
    fn track(&self, target: &Arc<AbilityRecord>, connection: &Arc<ConnectionRecord>) {
        target.add_connect_record(Some(connection));
        let callback = connection.callback_object().clone();
        let mut entry = self.connections.entry(callback.object_id()).or_insert_with(|| {
            let recipient: Arc<dyn DeathRecipient> = Arc::new(CallbackDeath { service: self.this.clone() });
            if !callback.add_death_recipient(recipient.clone()) {
                warn!(connection = connection.id(), "connection callback already dead");
            }
            CallbackConnections { callback: callback.clone(), recipient, records: Vec::new() }
        });
        entry.records.push(connection.clone());
    }

    /// Removes `connection` from the callback index.
    pub(super) fn drop_connection(&self, connection: &Arc<ConnectionRecord>) {
        let id = connection.callback_object().object_id();
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.records.retain(|c| !Arc::ptr_eq(c, connection));
        }
        self.forget_callback_if_idle(id);
    }

    /// Stops watching a callback once nothing is connected through it.
    fn forget_callback_if_idle(&self, id: ObjectId) {
        if let Some((_, entry)) = self.connections.remove_if(&id, |_, entry| entry.records.is_empty()) {
            entry.callback.remove_death_recipient(&entry.recipient);
        }
    }

    /// Number of connection records reachable through the callback index.
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|e| e.value().records.len()).sum()
    }

    // ------------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------------

    fn post_connect_done(&self, connection: Arc<ConnectionRecord>, remote: Option<ObjectRef>) {
        let observers = match connection.kind() {
            ConnectionKind::Connect => self.observers.snapshot(),
            ConnectionKind::Call => Vec::new(),
        };
        let name = format!("connect-done#{}", connection.id());
        let submitted = self.ctx.tasks.submit(name, async move {
            connection.notify_connect_done(remote).await;
            let data = connection.connection_data();
            for observer in observers {
                observer.on_extension_connected(data.clone()).await;
            }
        });
        if let Err(e) = submitted {
            warn!(error = %e, "connect notification dropped");
        }
    }

    pub(super) fn post_connect_failed(&self, connection: Arc<ConnectionRecord>, code: i32) {
        let name = format!("connect-failed#{}", connection.id());
        let submitted = self.ctx.tasks.submit(name, async move {
            connection.notify_connect_failed(code).await;
        });
        if let Err(e) = submitted {
            warn!(error = %e, "connect failure notification dropped");
        }
    }

    pub(super) fn post_disconnect_done(&self, connection: Arc<ConnectionRecord>, code: i32) {
        let observers = match connection.kind() {
            ConnectionKind::Connect => self.observers.snapshot(),
            ConnectionKind::Call => Vec::new(),
        };
        let name = format!("disconnect-done#{}", connection.id());
        let submitted = self.ctx.tasks.submit(name, async move {
            connection.notify_disconnect_done(code).await;
            let data = connection.connection_data();
            for observer in observers {
                observer.on_extension_disconnected(data.clone()).await;
            }
        });
        if let Err(e) = submitted {
            warn!(error = %e, "disconnect notification dropped");
        }
    }

    fn finish_connect(&self, connection: &Arc<ConnectionRecord>, remote: Option<ObjectRef>) {
        if connection.complete_connect().is_ok() {
            self.post_connect_done(connection.clone(), remote);
        }
    }

    // ------------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------------

    pub(super) fn connect(&self, want: Want, callback: ObjectRef, caller: Option<ObjectRef>) -> Result<()> {
        let (ability, app) = self.resolve(&want)?;
        if !ability.ability_type.is_service_like() {
            warn!(element = %want.element, "connect to an ability that is not a service");
            return Err(Error::TargetNotService);
        }
        let target = self.service_for(ability, app, want, false)?;
        let caller_name = self.caller_name(caller.as_ref());
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = ConnectionRecord::new(id, ConnectionKind::Connect, caller, caller_name, &target, callback);
        self.track(&target, &connection);
        debug!(connection = id, record = target.id(), "connection created");

        if !target.is_ready() {
            return Ok(());
        }
        if let Some(remote) = target.conn_remote() {
            self.finish_connect(&connection, Some(remote));
        } else if pending(&target, ConnectionKind::Connect).len() == 1 {
            if target.is_command_in_flight() {
                target.defer_connect();
            } else if target.state() == AbilityState::Inactive {
                target.connect_ability();
            }
        }
        Ok(())
    }

    /// Connects everything that waited for the service to become inactive.
    pub(super) fn connect_pending(&self, record: &Arc<AbilityRecord>) {
        let waiting = pending(record, ConnectionKind::Connect);
        if waiting.is_empty() {
            return;
        }
        match record.conn_remote() {
            Some(remote) => {
                for connection in waiting {
                    self.finish_connect(&connection, Some(remote.clone()));
                }
            }
            None => {
                record.connect_ability();
            }
        }
    }

    pub(super) fn connect_done(&self, record: &Arc<AbilityRecord>, remote: Option<ObjectRef>) {
        record.set_conn_remote(remote.clone());
        for connection in pending(record, ConnectionKind::Connect) {
            self.finish_connect(&connection, remote.clone());
        }
    }

    pub(super) fn disconnect(&self, callback: &ObjectRef) -> Result<()> {
        let id = callback.object_id();
        let released = self.take_connections(id, ConnectionKind::Connect);
        if released.is_empty() {
            warn!(callback = %id, "disconnect of an unknown connection");
            return Err(Error::ConnectionNotExist);
        }
        for connection in released {
            self.release_connection(&connection);
        }
        Ok(())
    }

    fn take_connections(&self, id: ObjectId, kind: ConnectionKind) -> Vec<Arc<ConnectionRecord>> {
        let taken = match self.connections.get_mut(&id) {
            Some(mut entry) => {
                let (taken, kept): (Vec<_>, Vec<_>) = entry.records.drain(..).partition(|c| c.kind() == kind);
                entry.records = kept;
                taken
            }
            None => Vec::new(),
        };
        self.forget_callback_if_idle(id);
        taken
    }

    /// Takes one client connection down. The service is asked to disconnect
    /// only when its last connected client leaves.
    fn release_connection(&self, connection: &Arc<ConnectionRecord>) {
        let target = connection.target();
        match connection.state() {
            ConnectionState::Connected => {
                if connection.disconnect().is_err() {
                    return;
                }
                let Some(target) = target else {
                    connection.abort();
                    return;
                };
                let others = target
                    .connections()
                    .iter()
                    .any(|c| !Arc::ptr_eq(c, connection) && c.state() == ConnectionState::Connected);
                if !others && target.is_ready() {
                    target.disconnect_ability();
                    return;
                }
                if connection.complete_disconnect().is_ok() {
                    target.remove_connect_record(Some(connection));
                    self.post_disconnect_done(connection.clone(), error::ERR_OK);
                }
                self.stop_if_unused(&target);
            }
            ConnectionState::Connecting => {
                connection.abort();
                if let Some(target) = target {
                    target.remove_connect_record(Some(connection));
                    self.stop_if_unused(&target);
                }
                self.post_disconnect_done(connection.clone(), error::ERR_OK);
            }
            ConnectionState::Disconnecting | ConnectionState::Disconnected => {
                debug!(connection = connection.id(), "connection already going down");
            }
        }
    }

    pub(super) fn disconnect_done(&self, record: &Arc<AbilityRecord>) {
        for connection in record.connections() {
            if connection.state() != ConnectionState::Disconnecting {
                continue;
            }
            if connection.complete_disconnect().is_ok() {
                record.remove_connect_record(Some(&connection));
                self.drop_connection(&connection);
                self.post_disconnect_done(connection, error::ERR_OK);
            }
        }
        if record.connection_count() == 0 {
            record.set_conn_remote(None);
        }
        self.stop_if_unused(record);
    }

    /// A service that was only bound goes away with its last connection.
    fn stop_if_unused(&self, record: &Arc<AbilityRecord>) {
        if record.ability_info().ability_type.is_service_like()
            && record.connection_count() == 0
            && !record.is_started()
        {
            debug!(record = record.id(), "last connection gone, stopping service");
            self.terminate_record(record);
        }
    }

    fn on_callback_died(&self, id: ObjectId) {
        let Some((_, entry)) = self.connections.remove(&id) else {
            return;
        };
        warn!(callback = %id, count = entry.records.len(), "connection callback died");
        for connection in entry.records {
            match connection.kind() {
                ConnectionKind::Connect => self.release_connection(&connection),
                ConnectionKind::Call => self.release_call_record(&connection, false),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Call
    // ------------------------------------------------------------------------

    pub(super) fn start_by_call(&self, want: Want, callback: ObjectRef, caller: Option<ObjectRef>) -> Result<()> {
        let (ability, app) = self.resolve(&want)?;
        match ability.ability_type {
            AbilityType::Unknown => return Err(Error::UnknownAbilityType),
            AbilityType::Service | AbilityType::Extension => {
                warn!(element = %want.element, "call to a service ability");
                return Err(Error::InvalidValue);
            }
            AbilityType::Page | AbilityType::Data => {}
        }

        let element = ability.element();
        let singleton = ability.launch_mode == LaunchMode::Singleton;
        let existing = self
            .singletons
            .get(&element)
            .map(|r| r.value().clone())
            .filter(|r| !r.is_terminating());
        let (target, fresh) = match existing {
            Some(record) => (record, false),
            None => {
                let record = self.create_record(ability, app, want, -1);
                if singleton {
                    self.singletons.insert(element, record.clone());
                }
                (record, true)
            }
        };

        let caller_name = self.caller_name(caller.as_ref());
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = ConnectionRecord::new(id, ConnectionKind::Call, caller, caller_name, &target, callback);
        self.track(&target, &connection);

        if fresh {
            if let Err(e) = self.load(&target) {
                target.remove_connect_record(Some(&connection));
                self.drop_connection(&connection);
                return Err(e);
            }
            return Ok(());
        }
        if let Some(callee) = target.callee() {
            self.finish_connect(&connection, Some(callee));
        } else if target.is_ready() {
            target.call_request();
        }
        Ok(())
    }

    pub(super) fn has_pending_calls(&self, record: &AbilityRecord) -> bool {
        !pending(record, ConnectionKind::Call).is_empty()
    }

    pub(super) fn call_done(&self, record: &Arc<AbilityRecord>, callee: ObjectRef) {
        record.set_callee(Some(callee.clone()));
        for connection in pending(record, ConnectionKind::Call) {
            self.finish_connect(&connection, Some(callee.clone()));
        }
    }

    pub(super) fn release(&self, callback: &ObjectRef, element: &ElementName) -> Result<()> {
        let id = callback.object_id();
        let found = self.connections.get_mut(&id).and_then(|mut entry| {
            let index = entry
                .records
                .iter()
                .position(|c| c.kind() == ConnectionKind::Call && c.element().same_ability(element))?;
            Some(entry.records.remove(index))
        });
        self.forget_callback_if_idle(id);
        let Some(connection) = found else {
            warn!(element = %element, "release of an unknown call");
            return Err(Error::ConnectionNotExist);
        };
        self.release_call_record(&connection, true);
        Ok(())
    }

    fn release_call_record(&self, connection: &Arc<ConnectionRecord>, notify: bool) {
        if connection.state() == ConnectionState::Connected && connection.disconnect().is_ok() {
            if let Err(e) = connection.complete_disconnect() {
                warn!(connection = connection.id(), error = %e, "call release left the connection half closed");
            }
        } else {
            connection.abort();
        }
        if let Some(target) = connection.target() {
            target.remove_connect_record(Some(connection));
        }
        debug!(connection = connection.id(), "call released");
        if notify {
            self.post_disconnect_done(connection.clone(), error::ERR_OK);
        }
    }

    pub(super) fn token_by_callee(&self, callee: &ObjectRef) -> Option<ObjectRef> {
        self.all_records()
            .into_iter()
            .find(|r| r.callee().is_some_and(|c| same_object(&c, callee)))
            .map(|r| r.token_object())
    }
}

/// Connections made through one client callback, and the death watch on
/// that callback.
pub(super) struct CallbackConnections {
    callback: ObjectRef,
    recipient: Arc<dyn DeathRecipient>,
    records: Vec<Arc<ConnectionRecord>>,
}

struct CallbackDeath {
    service: Weak<AbilityManagerService>,
}

impl DeathRecipient for CallbackDeath {
    fn on_remote_died(&self, object: ObjectId) {
        if let Some(service) = self.service.upgrade() {
            service.on_callback_died(object);
        }
    }
}
