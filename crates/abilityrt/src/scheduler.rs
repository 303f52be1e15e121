//! # Ability Scheduler Interface
//!
//! The service drives an ability's process through this interface. Every
//! operation is fire-and-forget: the app reports completion later through
//! the ability manager (`ability_transition_done` and friends).

use std::sync::Arc;

use ipc::DispatchTable;
use ipc::MessageOption;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::RemoteStub;
use ipc::parcel;
use ipc::status;
use ipc::stub::check_interface_token;
use ipc::stub::default_on_remote_request;
use tracing::debug;
use tracing::warn;

use crate::info::Configuration;
use crate::info::LifecycleStateInfo;
use crate::want::PacMap;
use crate::want::Want;

pub const DESCRIPTOR: &str = "ohos.aafwk.AbilityScheduler";

pub mod code {
    pub const SCHEDULE_ABILITY_TRANSACTION: u32 = 0;
    pub const SEND_RESULT: u32 = 1;
    pub const SCHEDULE_ABILITY_CONNECT: u32 = 2;
    pub const SCHEDULE_ABILITY_DISCONNECT: u32 = 3;
    pub const SCHEDULE_ABILITY_COMMAND: u32 = 4;
    pub const SCHEDULE_SAVE_ABILITY_STATE: u32 = 5;
    pub const SCHEDULE_RESTORE_ABILITY_STATE: u32 = 6;
    pub const SCHEDULE_UPDATE_CONFIGURATION: u32 = 7;
    pub const SCHEDULE_CALL: u32 = 8;
}

#[async_trait::async_trait]
pub trait AbilityScheduler: Send + Sync + 'static {
    /// Moves the ability toward `info.state`.
    async fn schedule_ability_transaction(&self, want: Want, info: LifecycleStateInfo);

    async fn send_result(&self, request_code: i32, result_code: i32, want: Want);

    async fn schedule_connect_ability(&self, want: Want);

    async fn schedule_disconnect_ability(&self, want: Want);

    async fn schedule_command_ability(&self, want: Want, restart: bool, start_id: i32);

    async fn schedule_save_ability_state(&self);

    async fn schedule_restore_ability_state(&self, state: PacMap);

    async fn schedule_update_configuration(&self, config: Configuration);

    /// Asks the ability to publish its callee object.
    async fn schedule_call(&self);
}

pub enum SchedulerRequest {
    AbilityTransaction { want: Want, info: LifecycleStateInfo },
    SendResult { request_code: i32, result_code: i32, want: Want },
    Connect { want: Want },
    Disconnect { want: Want },
    Command { want: Want, restart: bool, start_id: i32 },
    SaveState,
    RestoreState { state: PacMap },
    UpdateConfiguration { config: Configuration },
    Call,
}

impl SchedulerRequest {
    pub fn code(&self) -> u32 {
        match self {
            SchedulerRequest::AbilityTransaction { .. } => code::SCHEDULE_ABILITY_TRANSACTION,
            SchedulerRequest::SendResult { .. } => code::SEND_RESULT,
            SchedulerRequest::Connect { .. } => code::SCHEDULE_ABILITY_CONNECT,
            SchedulerRequest::Disconnect { .. } => code::SCHEDULE_ABILITY_DISCONNECT,
            SchedulerRequest::Command { .. } => code::SCHEDULE_ABILITY_COMMAND,
            SchedulerRequest::SaveState => code::SCHEDULE_SAVE_ABILITY_STATE,
            SchedulerRequest::RestoreState { .. } => code::SCHEDULE_RESTORE_ABILITY_STATE,
            SchedulerRequest::UpdateConfiguration { .. } => code::SCHEDULE_UPDATE_CONFIGURATION,
            SchedulerRequest::Call => code::SCHEDULE_CALL,
        }
    }

    pub fn encode(&self, p: &mut Parcel) -> parcel::Result<()> {
        match self {
            SchedulerRequest::AbilityTransaction { want, info } => {
                p.write_parcelable(want)?;
                p.write_parcelable(info)
            }
            SchedulerRequest::SendResult { request_code, result_code, want } => {
                p.write_i32(*request_code)?;
                p.write_i32(*result_code)?;
                p.write_parcelable(want)
            }
            SchedulerRequest::Connect { want } | SchedulerRequest::Disconnect { want } => p.write_parcelable(want),
            SchedulerRequest::Command { want, restart, start_id } => {
                p.write_parcelable(want)?;
                p.write_bool(*restart)?;
                p.write_i32(*start_id)
            }
            SchedulerRequest::SaveState | SchedulerRequest::Call => Ok(()),
            SchedulerRequest::RestoreState { state } => p.write_parcelable(state),
            SchedulerRequest::UpdateConfiguration { config } => p.write_parcelable(config),
        }
    }

    pub async fn dispatch(self, scheduler: &dyn AbilityScheduler) {
        match self {
            SchedulerRequest::AbilityTransaction { want, info } => scheduler.schedule_ability_transaction(want, info).await,
            SchedulerRequest::SendResult { request_code, result_code, want } => {
                scheduler.send_result(request_code, result_code, want).await
            }
            SchedulerRequest::Connect { want } => scheduler.schedule_connect_ability(want).await,
            SchedulerRequest::Disconnect { want } => scheduler.schedule_disconnect_ability(want).await,
            SchedulerRequest::Command { want, restart, start_id } => {
                scheduler.schedule_command_ability(want, restart, start_id).await
            }
            SchedulerRequest::SaveState => scheduler.schedule_save_ability_state().await,
            SchedulerRequest::RestoreState { state } => scheduler.schedule_restore_ability_state(state).await,
            SchedulerRequest::UpdateConfiguration { config } => scheduler.schedule_update_configuration(config).await,
            SchedulerRequest::Call => scheduler.schedule_call().await,
        }
    }
}

fn decode_transaction(p: &mut Parcel) -> parcel::Result<SchedulerRequest> {
    Ok(SchedulerRequest::AbilityTransaction { want: p.read_parcelable()?, info: p.read_parcelable()? })
}

fn decode_send_result(p: &mut Parcel) -> parcel::Result<SchedulerRequest> {
    Ok(SchedulerRequest::SendResult {
        request_code: p.read_i32()?,
        result_code: p.read_i32()?,
        want: p.read_parcelable()?,
    })
}

fn decode_connect(p: &mut Parcel) -> parcel::Result<SchedulerRequest> {
    Ok(SchedulerRequest::Connect { want: p.read_parcelable()? })
}

fn decode_disconnect(p: &mut Parcel) -> parcel::Result<SchedulerRequest> {
    Ok(SchedulerRequest::Disconnect { want: p.read_parcelable()? })
}

fn decode_command(p: &mut Parcel) -> parcel::Result<SchedulerRequest> {
    Ok(SchedulerRequest::Command {
        want: p.read_parcelable()?,
        restart: p.read_bool()?,
        start_id: p.read_i32()?,
    })
}

fn decode_save_state(_: &mut Parcel) -> parcel::Result<SchedulerRequest> {
    Ok(SchedulerRequest::SaveState)
}

fn decode_restore_state(p: &mut Parcel) -> parcel::Result<SchedulerRequest> {
    Ok(SchedulerRequest::RestoreState { state: p.read_parcelable()? })
}

fn decode_update_configuration(p: &mut Parcel) -> parcel::Result<SchedulerRequest> {
    Ok(SchedulerRequest::UpdateConfiguration { config: p.read_parcelable()? })
}

fn decode_call(_: &mut Parcel) -> parcel::Result<SchedulerRequest> {
    Ok(SchedulerRequest::Call)
}

pub fn dispatch_table() -> DispatchTable<SchedulerRequest> {
    let mut t = DispatchTable::new(DESCRIPTOR);
    t.register(code::SCHEDULE_ABILITY_TRANSACTION, "SCHEDULE_ABILITY_TRANSACTION", decode_transaction);
    t.register(code::SEND_RESULT, "SEND_RESULT", decode_send_result);
    t.register(code::SCHEDULE_ABILITY_CONNECT, "SCHEDULE_ABILITY_CONNECT", decode_connect);
    t.register(code::SCHEDULE_ABILITY_DISCONNECT, "SCHEDULE_ABILITY_DISCONNECT", decode_disconnect);
    t.register(code::SCHEDULE_ABILITY_COMMAND, "SCHEDULE_ABILITY_COMMAND", decode_command);
    t.register(code::SCHEDULE_SAVE_ABILITY_STATE, "SCHEDULE_SAVE_ABILITY_STATE", decode_save_state);
    t.register(code::SCHEDULE_RESTORE_ABILITY_STATE, "SCHEDULE_RESTORE_ABILITY_STATE", decode_restore_state);
    t.register(code::SCHEDULE_UPDATE_CONFIGURATION, "SCHEDULE_UPDATE_CONFIGURATION", decode_update_configuration);
    t.register(code::SCHEDULE_CALL, "SCHEDULE_CALL", decode_call);
    t
}

pub struct AbilitySchedulerStub {
    scheduler: Arc<dyn AbilityScheduler>,
    table: DispatchTable<SchedulerRequest>,
}

impl AbilitySchedulerStub {
    pub fn new(scheduler: Arc<dyn AbilityScheduler>) -> Self {
        Self { scheduler, table: dispatch_table() }
    }
}

#[async_trait::async_trait]
impl RemoteStub for AbilitySchedulerStub {
    fn descriptor(&self) -> &str {
        DESCRIPTOR
    }

    async fn on_remote_request(&self, code: u32, data: &mut Parcel, reply: &mut Parcel, _option: MessageOption) -> i32 {
        if !check_interface_token(data, DESCRIPTOR) {
            return status::ERR_INVALID_STATE;
        }
        let Some(entry) = self.table.get(code) else {
            return default_on_remote_request(DESCRIPTOR, code, reply);
        };
        match (entry.decode)(data) {
            Ok(request) => {
                debug!(op = entry.name, "scheduling");
                request.dispatch(self.scheduler.as_ref()).await;
                status::ERR_NONE
            }
            Err(e) => {
                warn!(op = entry.name, error = %e, "malformed scheduler request");
                status::ERR_INVALID_VALUE
            }
        }
    }
}

fn encode_with_token(request: &SchedulerRequest) -> parcel::Result<Parcel> {
    let mut data = Parcel::new();
    data.write_interface_token(DESCRIPTOR)?;
    request.encode(&mut data)?;
    Ok(data)
}

/// Sends scheduler requests to an ability's process. Failures are logged;
/// a dead process is noticed through its death recipient instead.
pub struct AbilitySchedulerProxy {
    remote: ObjectRef,
}

impl AbilitySchedulerProxy {
    pub fn new(remote: ObjectRef) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &ObjectRef {
        &self.remote
    }

    async fn post(&self, request: SchedulerRequest) {
        let code = request.code();
        let data = match encode_with_token(&request) {
            Ok(data) => data,
            Err(e) => {
                warn!(code, error = %e, "failed to encode scheduler request");
                return;
            }
        };
        if let Err(e) = self.remote.send_request(code, data, MessageOption::oneway()).await {
            warn!(code, object = %self.remote.object_id(), error = %e, "scheduler request failed");
        }
    }
}

#[async_trait::async_trait]
impl AbilityScheduler for AbilitySchedulerProxy {
    async fn schedule_ability_transaction(&self, want: Want, info: LifecycleStateInfo) {
        self.post(SchedulerRequest::AbilityTransaction { want, info }).await
    }

    async fn send_result(&self, request_code: i32, result_code: i32, want: Want) {
        self.post(SchedulerRequest::SendResult { request_code, result_code, want }).await
    }

    async fn schedule_connect_ability(&self, want: Want) {
        self.post(SchedulerRequest::Connect { want }).await
    }

    async fn schedule_disconnect_ability(&self, want: Want) {
        self.post(SchedulerRequest::Disconnect { want }).await
    }

    async fn schedule_command_ability(&self, want: Want, restart: bool, start_id: i32) {
        self.post(SchedulerRequest::Command { want, restart, start_id }).await
    }

    async fn schedule_save_ability_state(&self) {
        self.post(SchedulerRequest::SaveState).await
    }

    async fn schedule_restore_ability_state(&self, state: PacMap) {
        self.post(SchedulerRequest::RestoreState { state }).await
    }

    async fn schedule_update_configuration(&self, config: Configuration) {
        self.post(SchedulerRequest::UpdateConfiguration { config }).await
    }

    async fn schedule_call(&self) {
        self.post(SchedulerRequest::Call).await
    }
}
