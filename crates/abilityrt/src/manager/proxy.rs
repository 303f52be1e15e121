use ipc::MessageOption;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::Peer;
use ipc::transport::Transport;
use tracing::warn;

use super::AbilityManager;
use super::DESCRIPTOR;
use super::request::AbilityRequest;
use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::error::Result;
use crate::info::AbilityRunningInfo;
use crate::info::Configuration;
use crate::info::ExtensionAbilityType;
use crate::info::ExtensionRunningInfo;
use crate::info::StartOptions;
use crate::want::ElementName;
use crate::want::PacMap;
use crate::want::Want;

/// Sends ability manager requests to a remote object.
#[derive(Clone)]
pub struct AbilityManagerProxy {
    remote: ObjectRef,
}

impl AbilityManagerProxy {
    pub fn new(remote: ObjectRef) -> Self {
        Self { remote }
    }

    /// Talks to a manager served on the other end of `transport`.
    pub fn connect(name: &str, transport: Box<dyn Transport>, config: &RuntimeConfig) -> Self {
        let peer: ObjectRef = Peer::connect(name, DESCRIPTOR, transport, config.request_timeout);
        Self::new(peer)
    }

    pub fn remote(&self) -> &ObjectRef {
        &self.remote
    }

    async fn transact(&self, request: AbilityRequest) -> Result<Parcel> {
        let mut data = Parcel::new();
        data.write_interface_token(DESCRIPTOR)?;
        request.encode(&mut data)?;
        let option = if request.is_oneway() { MessageOption::oneway() } else { MessageOption::sync() };
        let reply = self.remote.send_request(request.code(), data, option).await?;
        Ok(reply)
    }

    /// Sends `request` and reads the leading status. The payload, if any,
    /// is left in the returned parcel.
    async fn call(&self, request: AbilityRequest) -> Result<Parcel> {
        let mut reply = self.transact(request).await?;
        let status = reply.read_i32().map_err(|_| Error::InnerError)?;
        Error::check(status)?;
        Ok(reply)
    }

    async fn call_status(&self, request: AbilityRequest) -> Result<()> {
        self.call(request).await.map(|_| ())
    }

    async fn send_oneway(&self, request: AbilityRequest) {
        let code = request.code();
        if let Err(e) = self.transact(request).await {
            warn!(code, error = %e, "one-way request failed");
        }
    }
}

fn payload_error(_: ipc::parcel::Error) -> Error {
    Error::InnerError
}

#[async_trait::async_trait]
impl AbilityManager for AbilityManagerProxy {
    async fn terminate_ability(&self, token: Option<ObjectRef>, result_code: i32, want: Option<Want>) -> Result<()> {
        self.call_status(AbilityRequest::Terminate { token, result_code, want, terminate: true }).await
    }

    async fn close_ability(&self, token: Option<ObjectRef>, result_code: i32, want: Option<Want>) -> Result<()> {
        self.call_status(AbilityRequest::Terminate { token, result_code, want, terminate: false }).await
    }

    async fn attach_ability_thread(&self, scheduler: ObjectRef, token: ObjectRef) -> Result<()> {
        self.call_status(AbilityRequest::AttachAbilityThread { scheduler, token }).await
    }

    async fn ability_transition_done(&self, token: ObjectRef, state: i32, saved_state: PacMap) -> Result<()> {
        self.call_status(AbilityRequest::AbilityTransitionDone { token, state, saved_state }).await
    }

    async fn schedule_connect_ability_done(&self, token: Option<ObjectRef>, remote: Option<ObjectRef>) -> Result<()> {
        self.call_status(AbilityRequest::ConnectAbilityDone { token, remote }).await
    }

    async fn schedule_disconnect_ability_done(&self, token: ObjectRef) -> Result<()> {
        self.call_status(AbilityRequest::DisconnectAbilityDone { token }).await
    }

    async fn terminate_ability_by_caller(&self, caller: Option<ObjectRef>, request_code: i32) -> Result<()> {
        self.call_status(AbilityRequest::TerminateAbilityByCaller { caller, request_code }).await
    }

    async fn minimize_ability(&self, token: ObjectRef, from_user: bool) -> Result<()> {
        self.call_status(AbilityRequest::MinimizeAbility { token, from_user }).await
    }

    async fn schedule_command_ability_done(&self, token: ObjectRef) -> Result<()> {
        self.call_status(AbilityRequest::CommandAbilityDone { token }).await
    }

    async fn schedule_recover_ability(&self, token: ObjectRef, reason: i32) {
        self.send_oneway(AbilityRequest::AbilityRecovery { token, reason }).await
    }

    async fn enable_recover_ability(&self, token: ObjectRef) {
        self.send_oneway(AbilityRequest::AbilityRecoveryEnable { token }).await
    }

    async fn send_result_to_ability(&self, request_code: i32, result_code: i32, want: Want) -> Result<()> {
        self.call_status(AbilityRequest::SendResultToAbility { request_code, result_code, want }).await
    }

    async fn move_ability_to_background(&self, token: Option<ObjectRef>) -> Result<()> {
        self.call_status(AbilityRequest::MoveAbilityToBackground { token }).await
    }

    async fn call_request_done(&self, token: ObjectRef, callee: ObjectRef) -> Result<()> {
        self.call_status(AbilityRequest::CallRequestDone { token, callee }).await
    }

    async fn start_ability(&self, want: Want, user_id: i32, request_code: i32) -> Result<()> {
        self.call_status(AbilityRequest::StartAbility { want, user_id, request_code }).await
    }

    async fn start_ability_with_caller(
        &self,
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        request_code: i32,
    ) -> Result<()> {
        self.call_status(AbilityRequest::StartAbilityAddCaller { want, caller, user_id, request_code }).await
    }

    async fn start_ability_with_options(
        &self,
        want: Want,
        options: StartOptions,
        caller: Option<ObjectRef>,
        user_id: i32,
        request_code: i32,
    ) -> Result<()> {
        self.call_status(AbilityRequest::StartAbilityForOptions { want, options, caller, user_id, request_code })
            .await
    }

    async fn start_extension_ability(
        &self,
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        extension_type: ExtensionAbilityType,
    ) -> Result<()> {
        self.call_status(AbilityRequest::StartExtensionAbility { want, caller, user_id, extension_type }).await
    }

    async fn stop_extension_ability(
        &self,
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        extension_type: ExtensionAbilityType,
    ) -> Result<()> {
        self.call_status(AbilityRequest::StopExtensionAbility { want, caller, user_id, extension_type }).await
    }

    async fn stop_service_ability(&self, want: Want, user_id: i32, token: Option<ObjectRef>) -> Result<()> {
        self.call_status(AbilityRequest::StopServiceAbility { want, user_id, token }).await
    }

    async fn start_ability_by_call(
        &self,
        want: Want,
        connection: ObjectRef,
        caller: Option<ObjectRef>,
        account_id: i32,
    ) -> Result<()> {
        self.call_status(AbilityRequest::StartCallAbility { want, connection, caller, account_id }).await
    }

    async fn release_call(&self, connection: ObjectRef, element: ElementName) -> Result<()> {
        self.call_status(AbilityRequest::ReleaseCallAbility { connection, element }).await
    }

    async fn connect_ability(
        &self,
        want: Want,
        connection: ObjectRef,
        caller: Option<ObjectRef>,
        user_id: i32,
    ) -> Result<()> {
        self.call_status(AbilityRequest::ConnectAbility { want, connection, caller, user_id }).await
    }

    async fn disconnect_ability(&self, connection: ObjectRef) -> Result<()> {
        self.call_status(AbilityRequest::DisconnectAbility { connection }).await
    }

    async fn register_connection_observer(&self, observer: ObjectRef) -> Result<()> {
        self.call_status(AbilityRequest::RegisterConnectionObserver { observer }).await
    }

    async fn unregister_connection_observer(&self, observer: ObjectRef) -> Result<()> {
        self.call_status(AbilityRequest::UnregisterConnectionObserver { observer }).await
    }

    async fn get_ability_running_info(&self) -> Result<Vec<AbilityRunningInfo>> {
        let mut reply = self.call(AbilityRequest::GetAbilityRunningInfo).await?;
        reply.read_parcelable_vec().map_err(payload_error)
    }

    async fn get_extension_running_info(&self, upper_limit: i32) -> Result<Vec<ExtensionRunningInfo>> {
        let mut reply = self.call(AbilityRequest::GetExtensionRunningInfo { upper_limit }).await?;
        reply.read_parcelable_vec().map_err(payload_error)
    }

    async fn get_top_ability(&self) -> Result<ElementName> {
        let mut reply = self.call(AbilityRequest::GetTopAbility).await?;
        reply.read_parcelable().map_err(payload_error)
    }

    async fn get_ability_token_by_callee(&self, callee: ObjectRef) -> Result<Option<ObjectRef>> {
        let mut reply = self.call(AbilityRequest::GetAbilityToken { callee }).await?;
        reply.read_optional_remote_object().map_err(payload_error)
    }

    async fn dump_state(&self, args: String) -> Result<Vec<String>> {
        let mut reply = self.call(AbilityRequest::DumpState { args }).await?;
        reply.read_string_vec().map_err(payload_error)
    }

    async fn kill_process(&self, bundle_name: String) -> Result<()> {
        self.call_status(AbilityRequest::KillProcess { bundle_name }).await
    }

    async fn force_exit_app(&self, pid: i32, reason: i32) -> Result<()> {
        self.call_status(AbilityRequest::ForceExitApp { pid, reason }).await
    }

    async fn update_configuration(&self, config: Configuration) -> Result<()> {
        self.call_status(AbilityRequest::UpdateConfiguration { config }).await
    }

    async fn delegator_do_ability_foreground(&self, token: ObjectRef) -> Result<()> {
        self.call_status(AbilityRequest::DelegatorDoAbilityForeground { token }).await
    }

    async fn delegator_do_ability_background(&self, token: ObjectRef) -> Result<()> {
        self.call_status(AbilityRequest::DelegatorDoAbilityBackground { token }).await
    }

    async fn do_ability_foreground(&self, token: ObjectRef, flag: u32) -> Result<()> {
        self.call_status(AbilityRequest::DoAbilityForeground { token, flag }).await
    }

    async fn do_ability_background(&self, token: ObjectRef, flag: u32) -> Result<()> {
        self.call_status(AbilityRequest::DoAbilityBackground { token, flag }).await
    }
}
