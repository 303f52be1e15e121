//! Typed requests and replies of the ability manager interface.
//!
//! Each variant of `AbilityRequest` is one operation code. Its fields are
//! listed in wire order: the `decode_*` functions read them in that order and
//! `encode` writes them in that order.

use ipc::DispatchTable;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::parcel;

use super::AbilityManager;
use super::DESCRIPTOR;
use super::code;
use crate::error;
use crate::error::Result;
use crate::info::AbilityRunningInfo;
use crate::info::Configuration;
use crate::info::ExtensionAbilityType;
use crate::info::ExtensionRunningInfo;
use crate::info::StartOptions;
use crate::want::ElementName;
use crate::want::PacMap;
use crate::want::Want;

pub enum AbilityRequest {
    /// `terminate` picks between terminate (`true`) and close (`false`).
    Terminate {
        token: Option<ObjectRef>,
        result_code: i32,
        want: Option<Want>,
        terminate: bool,
    },
    AttachAbilityThread {
        scheduler: ObjectRef,
        token: ObjectRef,
    },
    AbilityTransitionDone {
        token: ObjectRef,
        state: i32,
        saved_state: PacMap,
    },
    ConnectAbilityDone {
        token: Option<ObjectRef>,
        remote: Option<ObjectRef>,
    },
    DisconnectAbilityDone {
        token: ObjectRef,
    },
    TerminateAbilityByCaller {
        caller: Option<ObjectRef>,
        request_code: i32,
    },
    MinimizeAbility {
        token: ObjectRef,
        from_user: bool,
    },
    CommandAbilityDone {
        token: ObjectRef,
    },
    AbilityRecovery {
        token: ObjectRef,
        reason: i32,
    },
    AbilityRecoveryEnable {
        token: ObjectRef,
    },
    SendResultToAbility {
        request_code: i32,
        result_code: i32,
        want: Want,
    },
    MoveAbilityToBackground {
        token: Option<ObjectRef>,
    },
    CallRequestDone {
        token: ObjectRef,
        callee: ObjectRef,
    },
    StartAbility {
        want: Want,
        user_id: i32,
        request_code: i32,
    },
    StartAbilityAddCaller {
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        request_code: i32,
    },
    StartAbilityForOptions {
        want: Want,
        options: StartOptions,
        caller: Option<ObjectRef>,
        user_id: i32,
        request_code: i32,
    },
    StartExtensionAbility {
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        extension_type: ExtensionAbilityType,
    },
    StopExtensionAbility {
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        extension_type: ExtensionAbilityType,
    },
    StopServiceAbility {
        want: Want,
        user_id: i32,
        token: Option<ObjectRef>,
    },
    StartCallAbility {
        want: Want,
        connection: ObjectRef,
        caller: Option<ObjectRef>,
        account_id: i32,
    },
    ReleaseCallAbility {
        connection: ObjectRef,
        element: ElementName,
    },
    ConnectAbility {
        want: Want,
        connection: ObjectRef,
        caller: Option<ObjectRef>,
        user_id: i32,
    },
    DisconnectAbility {
        connection: ObjectRef,
    },
    RegisterConnectionObserver {
        observer: ObjectRef,
    },
    UnregisterConnectionObserver {
        observer: ObjectRef,
    },
    GetAbilityRunningInfo,
    GetExtensionRunningInfo {
        upper_limit: i32,
    },
    GetTopAbility,
    GetAbilityToken {
        callee: ObjectRef,
    },
    DumpState {
        args: String,
    },
    KillProcess {
        bundle_name: String,
    },
    ForceExitApp {
        pid: i32,
        reason: i32,
    },
    UpdateConfiguration {
        config: Configuration,
    },
    DelegatorDoAbilityForeground {
        token: ObjectRef,
    },
    DelegatorDoAbilityBackground {
        token: ObjectRef,
    },
    DoAbilityForeground {
        token: ObjectRef,
        flag: u32,
    },
    DoAbilityBackground {
        token: ObjectRef,
        flag: u32,
    },
}

impl AbilityRequest {
    pub fn code(&self) -> u32 {
        match self {
            AbilityRequest::Terminate { .. } => code::TERMINATE_ABILITY,
            AbilityRequest::AttachAbilityThread { .. } => code::ATTACH_ABILITY_THREAD,
            AbilityRequest::AbilityTransitionDone { .. } => code::ABILITY_TRANSITION_DONE,
            AbilityRequest::ConnectAbilityDone { .. } => code::CONNECT_ABILITY_DONE,
            AbilityRequest::DisconnectAbilityDone { .. } => code::DISCONNECT_ABILITY_DONE,
            AbilityRequest::TerminateAbilityByCaller { .. } => code::TERMINATE_ABILITY_BY_CALLER,
            AbilityRequest::MinimizeAbility { .. } => code::MINIMIZE_ABILITY,
            AbilityRequest::CommandAbilityDone { .. } => code::COMMAND_ABILITY_DONE,
            AbilityRequest::AbilityRecovery { .. } => code::ABILITY_RECOVERY,
            AbilityRequest::AbilityRecoveryEnable { .. } => code::ABILITY_RECOVERY_ENABLE,
            AbilityRequest::SendResultToAbility { .. } => code::SEND_RESULT_TO_ABILITY,
            AbilityRequest::MoveAbilityToBackground { .. } => code::MOVE_ABILITY_TO_BACKGROUND,
            AbilityRequest::CallRequestDone { .. } => code::CALL_REQUEST_DONE,
            AbilityRequest::StartAbility { .. } => code::START_ABILITY,
            AbilityRequest::StartAbilityAddCaller { .. } => code::START_ABILITY_ADD_CALLER,
            AbilityRequest::StartAbilityForOptions { .. } => code::START_ABILITY_FOR_OPTIONS,
            AbilityRequest::StartExtensionAbility { .. } => code::START_EXTENSION_ABILITY,
            AbilityRequest::StopExtensionAbility { .. } => code::STOP_EXTENSION_ABILITY,
            AbilityRequest::StopServiceAbility { .. } => code::STOP_SERVICE_ABILITY,
            AbilityRequest::StartCallAbility { .. } => code::START_CALL_ABILITY,
            AbilityRequest::ReleaseCallAbility { .. } => code::RELEASE_CALL_ABILITY,
            AbilityRequest::ConnectAbility { .. } => code::CONNECT_ABILITY,
            AbilityRequest::DisconnectAbility { .. } => code::DISCONNECT_ABILITY,
            AbilityRequest::RegisterConnectionObserver { .. } => code::REGISTER_CONNECTION_OBSERVER,
            AbilityRequest::UnregisterConnectionObserver { .. } => code::UNREGISTER_CONNECTION_OBSERVER,
            AbilityRequest::GetAbilityRunningInfo => code::GET_ABILITY_RUNNING_INFO,
            AbilityRequest::GetExtensionRunningInfo { .. } => code::GET_EXTENSION_RUNNING_INFO,
            AbilityRequest::GetTopAbility => code::GET_TOP_ABILITY,
            AbilityRequest::GetAbilityToken { .. } => code::GET_ABILITY_TOKEN,
            AbilityRequest::DumpState { .. } => code::DUMP_STATE,
            AbilityRequest::KillProcess { .. } => code::KILL_PROCESS,
            AbilityRequest::ForceExitApp { .. } => code::FORCE_EXIT_APP,
            AbilityRequest::UpdateConfiguration { .. } => code::UPDATE_CONFIGURATION,
            AbilityRequest::DelegatorDoAbilityForeground { .. } => code::DELEGATOR_DO_ABILITY_FOREGROUND,
            AbilityRequest::DelegatorDoAbilityBackground { .. } => code::DELEGATOR_DO_ABILITY_BACKGROUND,
            AbilityRequest::DoAbilityForeground { .. } => code::DO_ABILITY_FOREGROUND,
            AbilityRequest::DoAbilityBackground { .. } => code::DO_ABILITY_BACKGROUND,
        }
    }

    /// Fire-and-forget operations carry no reply.
    pub fn is_oneway(&self) -> bool {
        matches!(self, AbilityRequest::AbilityRecovery { .. } | AbilityRequest::AbilityRecoveryEnable { .. })
    }

    /// Writes the arguments. The caller writes the interface token first.
    pub fn encode(&self, p: &mut Parcel) -> parcel::Result<()> {
        match self {
            AbilityRequest::Terminate { token, result_code, want, terminate } => {
                p.write_optional_remote_object(token.as_ref())?;
                p.write_i32(*result_code)?;
                p.write_optional_parcelable(want.as_ref())?;
                p.write_bool(*terminate)
            }
            AbilityRequest::AttachAbilityThread { scheduler, token } => {
                p.write_remote_object(scheduler)?;
                p.write_remote_object(token)
            }
            AbilityRequest::AbilityTransitionDone { token, state, saved_state } => {
                p.write_remote_object(token)?;
                p.write_i32(*state)?;
                p.write_parcelable(saved_state)
            }
            AbilityRequest::ConnectAbilityDone { token, remote } => {
                p.write_optional_remote_object(token.as_ref())?;
                p.write_optional_remote_object(remote.as_ref())
            }
            AbilityRequest::DisconnectAbilityDone { token }
            | AbilityRequest::CommandAbilityDone { token }
            | AbilityRequest::AbilityRecoveryEnable { token }
            | AbilityRequest::DelegatorDoAbilityForeground { token }
            | AbilityRequest::DelegatorDoAbilityBackground { token } => p.write_remote_object(token),
            AbilityRequest::TerminateAbilityByCaller { caller, request_code } => {
                p.write_optional_remote_object(caller.as_ref())?;
                p.write_i32(*request_code)
            }
            AbilityRequest::MinimizeAbility { token, from_user } => {
                p.write_remote_object(token)?;
                p.write_bool(*from_user)
            }
            AbilityRequest::AbilityRecovery { token, reason } => {
                p.write_remote_object(token)?;
                p.write_i32(*reason)
            }
            AbilityRequest::SendResultToAbility { request_code, result_code, want } => {
                p.write_i32(*request_code)?;
                p.write_i32(*result_code)?;
                p.write_parcelable(want)
            }
            AbilityRequest::MoveAbilityToBackground { token } => p.write_optional_remote_object(token.as_ref()),
            AbilityRequest::CallRequestDone { token, callee } => {
                p.write_remote_object(token)?;
                p.write_remote_object(callee)
            }
            AbilityRequest::StartAbility { want, user_id, request_code } => {
                p.write_parcelable(want)?;
                p.write_i32(*user_id)?;
                p.write_i32(*request_code)
            }
            AbilityRequest::StartAbilityAddCaller { want, caller, user_id, request_code } => {
                p.write_parcelable(want)?;
                p.write_optional_remote_object(caller.as_ref())?;
                p.write_i32(*user_id)?;
                p.write_i32(*request_code)
            }
            AbilityRequest::StartAbilityForOptions { want, options, caller, user_id, request_code } => {
                p.write_parcelable(want)?;
                p.write_parcelable(options)?;
                p.write_optional_remote_object(caller.as_ref())?;
                p.write_i32(*user_id)?;
                p.write_i32(*request_code)
            }
            AbilityRequest::StartExtensionAbility { want, caller, user_id, extension_type }
            | AbilityRequest::StopExtensionAbility { want, caller, user_id, extension_type } => {
                p.write_parcelable(want)?;
                p.write_optional_remote_object(caller.as_ref())?;
                p.write_i32(*user_id)?;
                p.write_i32(*extension_type as i32)
            }
            AbilityRequest::StopServiceAbility { want, user_id, token } => {
                p.write_parcelable(want)?;
                p.write_i32(*user_id)?;
                p.write_optional_remote_object(token.as_ref())
            }
            AbilityRequest::StartCallAbility { want, connection, caller, account_id } => {
                p.write_parcelable(want)?;
                p.write_remote_object(connection)?;
                p.write_optional_remote_object(caller.as_ref())?;
                p.write_i32(*account_id)
            }
            AbilityRequest::ReleaseCallAbility { connection, element } => {
                p.write_remote_object(connection)?;
                p.write_parcelable(element)
            }
            AbilityRequest::ConnectAbility { want, connection, caller, user_id } => {
                p.write_parcelable(want)?;
                p.write_remote_object(connection)?;
                p.write_optional_remote_object(caller.as_ref())?;
                p.write_i32(*user_id)
            }
            AbilityRequest::DisconnectAbility { connection } => p.write_remote_object(connection),
            AbilityRequest::RegisterConnectionObserver { observer }
            | AbilityRequest::UnregisterConnectionObserver { observer } => p.write_remote_object(observer),
            AbilityRequest::GetAbilityRunningInfo | AbilityRequest::GetTopAbility => Ok(()),
            AbilityRequest::GetExtensionRunningInfo { upper_limit } => p.write_i32(*upper_limit),
            AbilityRequest::GetAbilityToken { callee } => p.write_remote_object(callee),
            AbilityRequest::DumpState { args } => p.write_string(args),
            AbilityRequest::KillProcess { bundle_name } => p.write_string(bundle_name),
            AbilityRequest::ForceExitApp { pid, reason } => {
                p.write_i32(*pid)?;
                p.write_i32(*reason)
            }
            AbilityRequest::UpdateConfiguration { config } => p.write_parcelable(config),
            AbilityRequest::DoAbilityForeground { token, flag }
            | AbilityRequest::DoAbilityBackground { token, flag } => {
                p.write_remote_object(token)?;
                p.write_u32(*flag)
            }
        }
    }

    /// Runs the request against `service` and shapes the reply.
    pub async fn dispatch(self, service: &dyn AbilityManager) -> AbilityReply {
        match self {
            AbilityRequest::Terminate { token, result_code, want, terminate } => {
                let done = if terminate {
                    service.terminate_ability(token, result_code, want).await
                } else {
                    service.close_ability(token, result_code, want).await
                };
                AbilityReply::Status(done)
            }
            AbilityRequest::AttachAbilityThread { scheduler, token } => {
                AbilityReply::Status(service.attach_ability_thread(scheduler, token).await)
            }
            AbilityRequest::AbilityTransitionDone { token, state, saved_state } => {
                AbilityReply::Status(service.ability_transition_done(token, state, saved_state).await)
            }
            AbilityRequest::ConnectAbilityDone { token, remote } => {
                AbilityReply::Status(service.schedule_connect_ability_done(token, remote).await)
            }
            AbilityRequest::DisconnectAbilityDone { token } => {
                AbilityReply::Status(service.schedule_disconnect_ability_done(token).await)
            }
            AbilityRequest::TerminateAbilityByCaller { caller, request_code } => {
                AbilityReply::Status(service.terminate_ability_by_caller(caller, request_code).await)
            }
            AbilityRequest::MinimizeAbility { token, from_user } => {
                AbilityReply::Status(service.minimize_ability(token, from_user).await)
            }
            AbilityRequest::CommandAbilityDone { token } => {
                AbilityReply::Status(service.schedule_command_ability_done(token).await)
            }
            AbilityRequest::AbilityRecovery { token, reason } => {
                service.schedule_recover_ability(token, reason).await;
                AbilityReply::None
            }
            AbilityRequest::AbilityRecoveryEnable { token } => {
                service.enable_recover_ability(token).await;
                AbilityReply::None
            }
            AbilityRequest::SendResultToAbility { request_code, result_code, want } => {
                AbilityReply::Status(service.send_result_to_ability(request_code, result_code, want).await)
            }
            AbilityRequest::MoveAbilityToBackground { token } => {
                AbilityReply::Status(service.move_ability_to_background(token).await)
            }
            AbilityRequest::CallRequestDone { token, callee } => {
                AbilityReply::Status(service.call_request_done(token, callee).await)
            }
            AbilityRequest::StartAbility { want, user_id, request_code } => {
                AbilityReply::Status(service.start_ability(want, user_id, request_code).await)
            }
            AbilityRequest::StartAbilityAddCaller { want, caller, user_id, request_code } => {
                AbilityReply::Status(service.start_ability_with_caller(want, caller, user_id, request_code).await)
            }
            AbilityRequest::StartAbilityForOptions { want, options, caller, user_id, request_code } => {
                let done = service
                    .start_ability_with_options(want, options, caller, user_id, request_code)
                    .await;
                AbilityReply::Status(done)
            }
            AbilityRequest::StartExtensionAbility { want, caller, user_id, extension_type } => {
                AbilityReply::Status(service.start_extension_ability(want, caller, user_id, extension_type).await)
            }
            AbilityRequest::StopExtensionAbility { want, caller, user_id, extension_type } => {
                AbilityReply::Status(service.stop_extension_ability(want, caller, user_id, extension_type).await)
            }
            AbilityRequest::StopServiceAbility { want, user_id, token } => {
                AbilityReply::Status(service.stop_service_ability(want, user_id, token).await)
            }
            AbilityRequest::StartCallAbility { want, connection, caller, account_id } => {
                AbilityReply::Status(service.start_ability_by_call(want, connection, caller, account_id).await)
            }
            AbilityRequest::ReleaseCallAbility { connection, element } => {
                AbilityReply::Status(service.release_call(connection, element).await)
            }
            AbilityRequest::ConnectAbility { want, connection, caller, user_id } => {
                AbilityReply::Status(service.connect_ability(want, connection, caller, user_id).await)
            }
            AbilityRequest::DisconnectAbility { connection } => {
                AbilityReply::Status(service.disconnect_ability(connection).await)
            }
            AbilityRequest::RegisterConnectionObserver { observer } => {
                AbilityReply::Status(service.register_connection_observer(observer).await)
            }
            AbilityRequest::UnregisterConnectionObserver { observer } => {
                AbilityReply::Status(service.unregister_connection_observer(observer).await)
            }
            AbilityRequest::GetAbilityRunningInfo => AbilityReply::RunningInfos(service.get_ability_running_info().await),
            AbilityRequest::GetExtensionRunningInfo { upper_limit } => {
                AbilityReply::ExtensionInfos(service.get_extension_running_info(upper_limit).await)
            }
            AbilityRequest::GetTopAbility => AbilityReply::Element(service.get_top_ability().await),
            AbilityRequest::GetAbilityToken { callee } => {
                AbilityReply::Token(service.get_ability_token_by_callee(callee).await)
            }
            AbilityRequest::DumpState { args } => AbilityReply::Lines(service.dump_state(args).await),
            AbilityRequest::KillProcess { bundle_name } => AbilityReply::Status(service.kill_process(bundle_name).await),
            AbilityRequest::ForceExitApp { pid, reason } => {
                AbilityReply::Status(service.force_exit_app(pid, reason).await)
            }
            AbilityRequest::UpdateConfiguration { config } => {
                AbilityReply::Status(service.update_configuration(config).await)
            }
            AbilityRequest::DelegatorDoAbilityForeground { token } => {
                AbilityReply::Status(service.delegator_do_ability_foreground(token).await)
            }
            AbilityRequest::DelegatorDoAbilityBackground { token } => {
                AbilityReply::Status(service.delegator_do_ability_background(token).await)
            }
            AbilityRequest::DoAbilityForeground { token, flag } => {
                AbilityReply::Status(service.do_ability_foreground(token, flag).await)
            }
            AbilityRequest::DoAbilityBackground { token, flag } => {
                AbilityReply::Status(service.do_ability_background(token, flag).await)
            }
        }
    }
}

/// Reply shapes. Each carries the operation's outcome; the status is written
/// first and the payload only on success.
pub enum AbilityReply {
    /// Fire-and-forget operations write nothing.
    None,
    Status(Result<()>),
    RunningInfos(Result<Vec<AbilityRunningInfo>>),
    ExtensionInfos(Result<Vec<ExtensionRunningInfo>>),
    Element(Result<ElementName>),
    Token(Result<Option<ObjectRef>>),
    Lines(Result<Vec<String>>),
}

fn status_of<T>(outcome: &Result<T>) -> i32 {
    match outcome {
        Ok(_) => error::ERR_OK,
        Err(e) => e.code(),
    }
}

impl AbilityReply {
    pub fn status(&self) -> Option<i32> {
        match self {
            AbilityReply::None => None,
            AbilityReply::Status(r) => Some(status_of(r)),
            AbilityReply::RunningInfos(r) => Some(status_of(r)),
            AbilityReply::ExtensionInfos(r) => Some(status_of(r)),
            AbilityReply::Element(r) => Some(status_of(r)),
            AbilityReply::Token(r) => Some(status_of(r)),
            AbilityReply::Lines(r) => Some(status_of(r)),
        }
    }

    pub fn encode(&self, p: &mut Parcel) -> parcel::Result<()> {
        let Some(status) = self.status() else {
            return Ok(());
        };
        p.write_i32(status)?;
        match self {
            AbilityReply::RunningInfos(Ok(infos)) => p.write_parcelable_vec(infos),
            AbilityReply::ExtensionInfos(Ok(infos)) => p.write_parcelable_vec(infos),
            AbilityReply::Element(Ok(element)) => p.write_parcelable(element),
            AbilityReply::Token(Ok(token)) => p.write_optional_remote_object(token.as_ref()),
            AbilityReply::Lines(Ok(lines)) => p.write_string_vec(lines),
            _ => Ok(()),
        }
    }
}

fn decode_terminate(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::Terminate {
        token: p.read_optional_remote_object()?,
        result_code: p.read_i32()?,
        want: p.read_optional_parcelable()?,
        terminate: p.read_bool()?,
    })
}

fn decode_attach_ability_thread(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::AttachAbilityThread {
        scheduler: p.read_remote_object()?,
        token: p.read_remote_object()?,
    })
}

fn decode_ability_transition_done(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::AbilityTransitionDone {
        token: p.read_remote_object()?,
        state: p.read_i32()?,
        saved_state: p.read_parcelable()?,
    })
}

fn decode_connect_ability_done(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::ConnectAbilityDone {
        token: p.read_optional_remote_object()?,
        remote: p.read_optional_remote_object()?,
    })
}

fn decode_disconnect_ability_done(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::DisconnectAbilityDone { token: p.read_remote_object()? })
}

fn decode_terminate_ability_by_caller(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::TerminateAbilityByCaller {
        caller: p.read_optional_remote_object()?,
        request_code: p.read_i32()?,
    })
}

fn decode_minimize_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::MinimizeAbility {
        token: p.read_remote_object()?,
        from_user: p.read_bool()?,
    })
}

fn decode_command_ability_done(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::CommandAbilityDone { token: p.read_remote_object()? })
}

fn decode_ability_recovery(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::AbilityRecovery {
        token: p.read_remote_object()?,
        reason: p.read_i32()?,
    })
}

fn decode_ability_recovery_enable(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::AbilityRecoveryEnable { token: p.read_remote_object()? })
}

fn decode_send_result_to_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::SendResultToAbility {
        request_code: p.read_i32()?,
        result_code: p.read_i32()?,
        want: p.read_parcelable()?,
    })
}

fn decode_move_ability_to_background(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::MoveAbilityToBackground { token: p.read_optional_remote_object()? })
}

fn decode_call_request_done(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::CallRequestDone {
        token: p.read_remote_object()?,
        callee: p.read_remote_object()?,
    })
}

fn decode_start_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::StartAbility {
        want: p.read_parcelable()?,
        user_id: p.read_i32()?,
        request_code: p.read_i32()?,
    })
}

fn decode_start_ability_add_caller(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::StartAbilityAddCaller {
        want: p.read_parcelable()?,
        caller: p.read_optional_remote_object()?,
        user_id: p.read_i32()?,
        request_code: p.read_i32()?,
    })
}

fn decode_start_ability_for_options(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::StartAbilityForOptions {
        want: p.read_parcelable()?,
        options: p.read_parcelable()?,
        caller: p.read_optional_remote_object()?,
        user_id: p.read_i32()?,
        request_code: p.read_i32()?,
    })
}

fn decode_start_extension_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::StartExtensionAbility {
        want: p.read_parcelable()?,
        caller: p.read_optional_remote_object()?,
        user_id: p.read_i32()?,
        extension_type: ExtensionAbilityType::read(p)?,
    })
}

fn decode_stop_extension_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::StopExtensionAbility {
        want: p.read_parcelable()?,
        caller: p.read_optional_remote_object()?,
        user_id: p.read_i32()?,
        extension_type: ExtensionAbilityType::read(p)?,
    })
}

fn decode_stop_service_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::StopServiceAbility {
        want: p.read_parcelable()?,
        user_id: p.read_i32()?,
        token: p.read_optional_remote_object()?,
    })
}

fn decode_start_call_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::StartCallAbility {
        want: p.read_parcelable()?,
        connection: p.read_remote_object()?,
        caller: p.read_optional_remote_object()?,
        account_id: p.read_i32()?,
    })
}

fn decode_release_call_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::ReleaseCallAbility {
        connection: p.read_remote_object()?,
        element: p.read_parcelable()?,
    })
}

fn decode_connect_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::ConnectAbility {
        want: p.read_parcelable()?,
        connection: p.read_remote_object()?,
        caller: p.read_optional_remote_object()?,
        user_id: p.read_i32()?,
    })
}

fn decode_disconnect_ability(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::DisconnectAbility { connection: p.read_remote_object()? })
}

fn decode_register_connection_observer(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::RegisterConnectionObserver { observer: p.read_remote_object()? })
}

fn decode_unregister_connection_observer(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::UnregisterConnectionObserver { observer: p.read_remote_object()? })
}

fn decode_get_ability_running_info(_: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::GetAbilityRunningInfo)
}

fn decode_get_extension_running_info(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::GetExtensionRunningInfo { upper_limit: p.read_i32()? })
}

fn decode_get_top_ability(_: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::GetTopAbility)
}

fn decode_get_ability_token(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::GetAbilityToken { callee: p.read_remote_object()? })
}

fn decode_dump_state(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::DumpState { args: p.read_string()? })
}

fn decode_kill_process(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::KillProcess { bundle_name: p.read_string()? })
}

fn decode_force_exit_app(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::ForceExitApp {
        pid: p.read_i32()?,
        reason: p.read_i32()?,
    })
}

fn decode_update_configuration(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::UpdateConfiguration { config: p.read_parcelable()? })
}

fn decode_delegator_do_ability_foreground(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::DelegatorDoAbilityForeground { token: p.read_remote_object()? })
}

fn decode_delegator_do_ability_background(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::DelegatorDoAbilityBackground { token: p.read_remote_object()? })
}

fn decode_do_ability_foreground(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::DoAbilityForeground {
        token: p.read_remote_object()?,
        flag: p.read_u32()?,
    })
}

fn decode_do_ability_background(p: &mut Parcel) -> parcel::Result<AbilityRequest> {
    Ok(AbilityRequest::DoAbilityBackground {
        token: p.read_remote_object()?,
        flag: p.read_u32()?,
    })
}

fn register_lifecycle_ops(t: &mut DispatchTable<AbilityRequest>) {
    t.register(code::TERMINATE_ABILITY, "TERMINATE_ABILITY", decode_terminate);
    t.register(code::ATTACH_ABILITY_THREAD, "ATTACH_ABILITY_THREAD", decode_attach_ability_thread);
    t.register(code::ABILITY_TRANSITION_DONE, "ABILITY_TRANSITION_DONE", decode_ability_transition_done);
    t.register(code::CONNECT_ABILITY_DONE, "CONNECT_ABILITY_DONE", decode_connect_ability_done);
    t.register(code::DISCONNECT_ABILITY_DONE, "DISCONNECT_ABILITY_DONE", decode_disconnect_ability_done);
    t.register(code::TERMINATE_ABILITY_BY_CALLER, "TERMINATE_ABILITY_BY_CALLER", decode_terminate_ability_by_caller);
    t.register(code::MINIMIZE_ABILITY, "MINIMIZE_ABILITY", decode_minimize_ability);
    t.register(code::COMMAND_ABILITY_DONE, "COMMAND_ABILITY_DONE", decode_command_ability_done);
    t.register(code::ABILITY_RECOVERY, "ABILITY_RECOVERY", decode_ability_recovery);
    t.register(code::ABILITY_RECOVERY_ENABLE, "ABILITY_RECOVERY_ENABLE", decode_ability_recovery_enable);
    t.register(code::SEND_RESULT_TO_ABILITY, "SEND_RESULT_TO_ABILITY", decode_send_result_to_ability);
    t.register(code::MOVE_ABILITY_TO_BACKGROUND, "MOVE_ABILITY_TO_BACKGROUND", decode_move_ability_to_background);
    t.register(code::CALL_REQUEST_DONE, "CALL_REQUEST_DONE", decode_call_request_done);
}

fn register_start_ops(t: &mut DispatchTable<AbilityRequest>) {
    t.register(code::START_ABILITY, "START_ABILITY", decode_start_ability);
    t.register(code::START_ABILITY_ADD_CALLER, "START_ABILITY_ADD_CALLER", decode_start_ability_add_caller);
    t.register(code::START_ABILITY_FOR_OPTIONS, "START_ABILITY_FOR_OPTIONS", decode_start_ability_for_options);
    t.register(code::START_EXTENSION_ABILITY, "START_EXTENSION_ABILITY", decode_start_extension_ability);
    t.register(code::STOP_EXTENSION_ABILITY, "STOP_EXTENSION_ABILITY", decode_stop_extension_ability);
    t.register(code::STOP_SERVICE_ABILITY, "STOP_SERVICE_ABILITY", decode_stop_service_ability);
    t.register(code::START_CALL_ABILITY, "START_CALL_ABILITY", decode_start_call_ability);
    t.register(code::RELEASE_CALL_ABILITY, "RELEASE_CALL_ABILITY", decode_release_call_ability);
}

fn register_connect_ops(t: &mut DispatchTable<AbilityRequest>) {
    t.register(code::CONNECT_ABILITY, "CONNECT_ABILITY", decode_connect_ability);
    t.register(code::DISCONNECT_ABILITY, "DISCONNECT_ABILITY", decode_disconnect_ability);
    t.register(code::REGISTER_CONNECTION_OBSERVER, "REGISTER_CONNECTION_OBSERVER", decode_register_connection_observer);
    t.register(
        code::UNREGISTER_CONNECTION_OBSERVER,
        "UNREGISTER_CONNECTION_OBSERVER",
        decode_unregister_connection_observer,
    );
}

fn register_query_ops(t: &mut DispatchTable<AbilityRequest>) {
    t.register(code::GET_ABILITY_RUNNING_INFO, "GET_ABILITY_RUNNING_INFO", decode_get_ability_running_info);
    t.register(code::GET_EXTENSION_RUNNING_INFO, "GET_EXTENSION_RUNNING_INFO", decode_get_extension_running_info);
    t.register(code::GET_TOP_ABILITY, "GET_TOP_ABILITY", decode_get_top_ability);
    t.register(code::GET_ABILITY_TOKEN, "GET_ABILITY_TOKEN", decode_get_ability_token);
    t.register(code::DUMP_STATE, "DUMP_STATE", decode_dump_state);
}

fn register_process_ops(t: &mut DispatchTable<AbilityRequest>) {
    t.register(code::KILL_PROCESS, "KILL_PROCESS", decode_kill_process);
    t.register(code::FORCE_EXIT_APP, "FORCE_EXIT_APP", decode_force_exit_app);
    t.register(code::UPDATE_CONFIGURATION, "UPDATE_CONFIGURATION", decode_update_configuration);
}

fn register_delegator_ops(t: &mut DispatchTable<AbilityRequest>) {
    t.register(
        code::DELEGATOR_DO_ABILITY_FOREGROUND,
        "DELEGATOR_DO_ABILITY_FOREGROUND",
        decode_delegator_do_ability_foreground,
    );
    t.register(
        code::DELEGATOR_DO_ABILITY_BACKGROUND,
        "DELEGATOR_DO_ABILITY_BACKGROUND",
        decode_delegator_do_ability_background,
    );
    t.register(code::DO_ABILITY_FOREGROUND, "DO_ABILITY_FOREGROUND", decode_do_ability_foreground);
    t.register(code::DO_ABILITY_BACKGROUND, "DO_ABILITY_BACKGROUND", decode_do_ability_background);
}

/// The full code-to-decoder table of the ability manager.
pub fn dispatch_table() -> DispatchTable<AbilityRequest> {
    let mut table = DispatchTable::new(DESCRIPTOR);
    register_lifecycle_ops(&mut table);
    register_start_ops(&mut table);
    register_connect_ops(&mut table);
    register_query_ops(&mut table);
    register_process_ops(&mut table);
    register_delegator_ops(&mut table);
    table
}
