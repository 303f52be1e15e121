//! # Ability Manager Interface
//!
//! The service-side RPC surface: one trait method per operation code.
//! `AbilityManagerStub` receives requests, `AbilityManagerProxy` sends them,
//! and `request` holds the code-to-argument contract both sides share.
//!
//! ## Wire Contract
//!
//! - Every request starts with the `DESCRIPTOR` interface token.
//! - Arguments follow in the order listed on each `AbilityRequest` variant.
//! - Every synchronous reply starts with an `i32` status. Payload follows only
//!   when the status is `ERR_OK`.
//! - Codes never change meaning; new operations get new codes.

pub mod proxy;
pub mod request;
pub mod stub;

use ipc::ObjectRef;

use crate::error::Result;
use crate::info::AbilityRunningInfo;
use crate::info::Configuration;
use crate::info::ExtensionAbilityType;
use crate::info::ExtensionRunningInfo;
use crate::info::StartOptions;
use crate::want::ElementName;
use crate::want::PacMap;
use crate::want::Want;

pub use proxy::AbilityManagerProxy;
pub use request::AbilityReply;
pub use request::AbilityRequest;
pub use stub::AbilityManagerStub;

pub const DESCRIPTOR: &str = "ohos.aafwk.AbilityManager";

/// Default user id for requests that do not target a specific user.
pub const DEFAULT_INVALID_USER_ID: i32 = -1;

pub mod code {
    // Ability lifecycle, sent by the app.
    pub const TERMINATE_ABILITY: u32 = 1;
    pub const ATTACH_ABILITY_THREAD: u32 = 2;
    pub const ABILITY_TRANSITION_DONE: u32 = 3;
    pub const CONNECT_ABILITY_DONE: u32 = 4;
    pub const DISCONNECT_ABILITY_DONE: u32 = 5;
    pub const TERMINATE_ABILITY_BY_CALLER: u32 = 6;
    pub const MINIMIZE_ABILITY: u32 = 7;
    pub const COMMAND_ABILITY_DONE: u32 = 8;
    pub const ABILITY_RECOVERY: u32 = 9;
    pub const ABILITY_RECOVERY_ENABLE: u32 = 10;
    pub const SEND_RESULT_TO_ABILITY: u32 = 11;
    pub const MOVE_ABILITY_TO_BACKGROUND: u32 = 12;
    pub const CALL_REQUEST_DONE: u32 = 13;

    // Starting and stopping.
    pub const START_ABILITY: u32 = 1001;
    pub const START_ABILITY_ADD_CALLER: u32 = 1002;
    pub const START_ABILITY_FOR_OPTIONS: u32 = 1003;
    pub const START_EXTENSION_ABILITY: u32 = 1004;
    pub const STOP_EXTENSION_ABILITY: u32 = 1005;
    pub const STOP_SERVICE_ABILITY: u32 = 1006;
    pub const START_CALL_ABILITY: u32 = 1007;
    pub const RELEASE_CALL_ABILITY: u32 = 1008;

    // Connections.
    pub const CONNECT_ABILITY: u32 = 1101;
    pub const DISCONNECT_ABILITY: u32 = 1102;
    pub const REGISTER_CONNECTION_OBSERVER: u32 = 1103;
    pub const UNREGISTER_CONNECTION_OBSERVER: u32 = 1104;

    // Queries.
    pub const GET_ABILITY_RUNNING_INFO: u32 = 1201;
    pub const GET_EXTENSION_RUNNING_INFO: u32 = 1202;
    pub const GET_TOP_ABILITY: u32 = 1203;
    pub const GET_ABILITY_TOKEN: u32 = 1204;
    pub const DUMP_STATE: u32 = 1205;

    // Processes and configuration.
    pub const KILL_PROCESS: u32 = 1301;
    pub const FORCE_EXIT_APP: u32 = 1302;
    pub const UPDATE_CONFIGURATION: u32 = 1303;

    // Test delegator.
    pub const DELEGATOR_DO_ABILITY_FOREGROUND: u32 = 1401;
    pub const DELEGATOR_DO_ABILITY_BACKGROUND: u32 = 1402;
    pub const DO_ABILITY_FOREGROUND: u32 = 1403;
    pub const DO_ABILITY_BACKGROUND: u32 = 1404;
}

/// Operations of the ability manager.
///
/// Implemented by `AbilityManagerService` in-process and by
/// `AbilityManagerProxy` across a transport.
#[async_trait::async_trait]
pub trait AbilityManager: Send + Sync + 'static {
    /// Terminates the ability and hands `want` to its callers.
    async fn terminate_ability(&self, token: Option<ObjectRef>, result_code: i32, want: Option<Want>) -> Result<()>;

    /// Like `terminate_ability`, but the ability may be kept in the mission list.
    async fn close_ability(&self, token: Option<ObjectRef>, result_code: i32, want: Option<Want>) -> Result<()>;

    async fn attach_ability_thread(&self, scheduler: ObjectRef, token: ObjectRef) -> Result<()>;

    /// Reports that the ability finished a scheduled transition. `state` is
    /// the numeric `AbilityState` reached.
    async fn ability_transition_done(&self, token: ObjectRef, state: i32, saved_state: PacMap) -> Result<()>;

    async fn schedule_connect_ability_done(&self, token: Option<ObjectRef>, remote: Option<ObjectRef>) -> Result<()>;

    async fn schedule_disconnect_ability_done(&self, token: ObjectRef) -> Result<()>;

    async fn terminate_ability_by_caller(&self, caller: Option<ObjectRef>, request_code: i32) -> Result<()>;

    async fn minimize_ability(&self, token: ObjectRef, from_user: bool) -> Result<()>;

    async fn schedule_command_ability_done(&self, token: ObjectRef) -> Result<()>;

    /// Saves, kills, and relaunches the ability. Fire-and-forget.
    async fn schedule_recover_ability(&self, token: ObjectRef, reason: i32);

    /// Fire-and-forget.
    async fn enable_recover_ability(&self, token: ObjectRef);

    async fn send_result_to_ability(&self, request_code: i32, result_code: i32, want: Want) -> Result<()>;

    async fn move_ability_to_background(&self, token: Option<ObjectRef>) -> Result<()>;

    async fn call_request_done(&self, token: ObjectRef, callee: ObjectRef) -> Result<()>;

    async fn start_ability(&self, want: Want, user_id: i32, request_code: i32) -> Result<()>;

    async fn start_ability_with_caller(
        &self,
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        request_code: i32,
    ) -> Result<()>;

    async fn start_ability_with_options(
        &self,
        want: Want,
        options: StartOptions,
        caller: Option<ObjectRef>,
        user_id: i32,
        request_code: i32,
    ) -> Result<()>;

    async fn start_extension_ability(
        &self,
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        extension_type: ExtensionAbilityType,
    ) -> Result<()>;

    async fn stop_extension_ability(
        &self,
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        extension_type: ExtensionAbilityType,
    ) -> Result<()>;

    async fn stop_service_ability(&self, want: Want, user_id: i32, token: Option<ObjectRef>) -> Result<()>;

    async fn start_ability_by_call(
        &self,
        want: Want,
        connection: ObjectRef,
        caller: Option<ObjectRef>,
        account_id: i32,
    ) -> Result<()>;

    async fn release_call(&self, connection: ObjectRef, element: ElementName) -> Result<()>;

    async fn connect_ability(
        &self,
        want: Want,
        connection: ObjectRef,
        caller: Option<ObjectRef>,
        user_id: i32,
    ) -> Result<()>;

    async fn disconnect_ability(&self, connection: ObjectRef) -> Result<()>;

    async fn register_connection_observer(&self, observer: ObjectRef) -> Result<()>;

    async fn unregister_connection_observer(&self, observer: ObjectRef) -> Result<()>;

    async fn get_ability_running_info(&self) -> Result<Vec<AbilityRunningInfo>>;

    async fn get_extension_running_info(&self, upper_limit: i32) -> Result<Vec<ExtensionRunningInfo>>;

    async fn get_top_ability(&self) -> Result<ElementName>;

    /// Token of the ability that published `callee`, if any.
    async fn get_ability_token_by_callee(&self, callee: ObjectRef) -> Result<Option<ObjectRef>>;

    async fn dump_state(&self, args: String) -> Result<Vec<String>>;

    async fn kill_process(&self, bundle_name: String) -> Result<()>;

    async fn force_exit_app(&self, pid: i32, reason: i32) -> Result<()>;

    async fn update_configuration(&self, config: Configuration) -> Result<()>;

    async fn delegator_do_ability_foreground(&self, token: ObjectRef) -> Result<()>;

    async fn delegator_do_ability_background(&self, token: ObjectRef) -> Result<()>;

    async fn do_ability_foreground(&self, token: ObjectRef, flag: u32) -> Result<()>;

    async fn do_ability_background(&self, token: ObjectRef, flag: u32) -> Result<()>;
}
