//! The ability manager surface end to end: proxy, parcel, stub, service.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use abilityrt::AbilityManager;
use abilityrt::AbilityManagerProxy;
use abilityrt::AbilityManagerStub;
use abilityrt::AbilityState;
use abilityrt::ElementName;
use abilityrt::Error;
use abilityrt::Result;
use abilityrt::Want;
use abilityrt::info::AbilityRunningInfo;
use abilityrt::info::Configuration;
use abilityrt::info::ExtensionAbilityType;
use abilityrt::info::ExtensionRunningInfo;
use abilityrt::info::StartOptions;
use abilityrt::manager::DESCRIPTOR;
use abilityrt::manager::code;
use abilityrt::manager::request::dispatch_table;
use abilityrt::token::Token;
use abilityrt::want::PacMap;
use ipc::LocalObject;
use ipc::MessageOption;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::RemoteObject;
use ipc::same_object;
use ipc::status;

const BUNDLE: &str = "com.example.mail";

/// Logs each operation it receives, with its decoded arguments.
#[derive(Default)]
struct RecordingManager {
    calls: Mutex<Vec<(u32, String)>>,
    callee_token: Mutex<Option<ObjectRef>>,
}

impl RecordingManager {
    fn push(&self, code: u32, args: String) {
        self.calls.lock().unwrap().push((code, args));
    }

    fn codes(&self) -> Vec<u32> {
        self.calls.lock().unwrap().iter().map(|(c, _)| *c).collect()
    }

    fn args(&self, code: u32) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, a)| a.clone())
    }
}

fn has(object: &Option<ObjectRef>) -> bool {
    object.is_some()
}

#[async_trait::async_trait]
impl AbilityManager for RecordingManager {
    async fn terminate_ability(&self, token: Option<ObjectRef>, result_code: i32, want: Option<Want>) -> Result<()> {
        self.push(code::TERMINATE_ABILITY, format!("terminate {} {} {}", has(&token), result_code, want.is_some()));
        Ok(())
    }

    async fn close_ability(&self, token: Option<ObjectRef>, result_code: i32, want: Option<Want>) -> Result<()> {
        self.push(code::TERMINATE_ABILITY, format!("close {} {} {}", has(&token), result_code, want.is_some()));
        Ok(())
    }

    async fn attach_ability_thread(&self, _scheduler: ObjectRef, _token: ObjectRef) -> Result<()> {
        self.push(code::ATTACH_ABILITY_THREAD, String::new());
        Ok(())
    }

    async fn ability_transition_done(&self, _token: ObjectRef, state: i32, saved_state: PacMap) -> Result<()> {
        self.push(code::ABILITY_TRANSITION_DONE, format!("{} {}", state, saved_state.len()));
        Ok(())
    }

    async fn schedule_connect_ability_done(&self, token: Option<ObjectRef>, remote: Option<ObjectRef>) -> Result<()> {
        self.push(code::CONNECT_ABILITY_DONE, format!("{} {}", has(&token), has(&remote)));
        Ok(())
    }

    async fn schedule_disconnect_ability_done(&self, _token: ObjectRef) -> Result<()> {
        self.push(code::DISCONNECT_ABILITY_DONE, String::new());
        Ok(())
    }

    async fn terminate_ability_by_caller(&self, caller: Option<ObjectRef>, request_code: i32) -> Result<()> {
        self.push(code::TERMINATE_ABILITY_BY_CALLER, format!("{} {}", has(&caller), request_code));
        Ok(())
    }

    async fn minimize_ability(&self, _token: ObjectRef, from_user: bool) -> Result<()> {
        self.push(code::MINIMIZE_ABILITY, format!("{}", from_user));
        Ok(())
    }

    async fn schedule_command_ability_done(&self, _token: ObjectRef) -> Result<()> {
        self.push(code::COMMAND_ABILITY_DONE, String::new());
        Ok(())
    }

    async fn schedule_recover_ability(&self, _token: ObjectRef, reason: i32) {
        self.push(code::ABILITY_RECOVERY, format!("{}", reason));
    }

    async fn enable_recover_ability(&self, _token: ObjectRef) {
        self.push(code::ABILITY_RECOVERY_ENABLE, String::new());
    }

    async fn send_result_to_ability(&self, request_code: i32, result_code: i32, want: Want) -> Result<()> {
        self.push(code::SEND_RESULT_TO_ABILITY, format!("{} {} {}", request_code, result_code, want.element));
        Ok(())
    }

    async fn move_ability_to_background(&self, token: Option<ObjectRef>) -> Result<()> {
        self.push(code::MOVE_ABILITY_TO_BACKGROUND, format!("{}", has(&token)));
        Ok(())
    }

    async fn call_request_done(&self, _token: ObjectRef, _callee: ObjectRef) -> Result<()> {
        self.push(code::CALL_REQUEST_DONE, String::new());
        Ok(())
    }

    async fn start_ability(&self, want: Want, user_id: i32, request_code: i32) -> Result<()> {
        self.push(code::START_ABILITY, format!("{} {} {}", want.element, user_id, request_code));
        Ok(())
    }

    async fn start_ability_with_caller(
        &self,
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        request_code: i32,
    ) -> Result<()> {
        self.push(
            code::START_ABILITY_ADD_CALLER,
            format!("{} {} {} {}", want.element, has(&caller), user_id, request_code),
        );
        Ok(())
    }

    async fn start_ability_with_options(
        &self,
        want: Want,
        options: StartOptions,
        caller: Option<ObjectRef>,
        _user_id: i32,
        request_code: i32,
    ) -> Result<()> {
        self.push(
            code::START_ABILITY_FOR_OPTIONS,
            format!("{} {} {} {}", want.element, options.display_id, has(&caller), request_code),
        );
        Ok(())
    }

    async fn start_extension_ability(
        &self,
        want: Want,
        _caller: Option<ObjectRef>,
        _user_id: i32,
        extension_type: ExtensionAbilityType,
    ) -> Result<()> {
        self.push(code::START_EXTENSION_ABILITY, format!("{} {:?}", want.element, extension_type));
        Ok(())
    }

    async fn stop_extension_ability(
        &self,
        want: Want,
        _caller: Option<ObjectRef>,
        _user_id: i32,
        extension_type: ExtensionAbilityType,
    ) -> Result<()> {
        self.push(code::STOP_EXTENSION_ABILITY, format!("{} {:?}", want.element, extension_type));
        Ok(())
    }

    async fn stop_service_ability(&self, want: Want, user_id: i32, token: Option<ObjectRef>) -> Result<()> {
        self.push(code::STOP_SERVICE_ABILITY, format!("{} {} {}", want.element, user_id, has(&token)));
        Ok(())
    }

    async fn start_ability_by_call(
        &self,
        want: Want,
        _connection: ObjectRef,
        caller: Option<ObjectRef>,
        account_id: i32,
    ) -> Result<()> {
        self.push(code::START_CALL_ABILITY, format!("{} {} {}", want.element, has(&caller), account_id));
        Ok(())
    }

    async fn release_call(&self, _connection: ObjectRef, element: ElementName) -> Result<()> {
        self.push(code::RELEASE_CALL_ABILITY, format!("{}", element));
        Ok(())
    }

    async fn connect_ability(
        &self,
        want: Want,
        _connection: ObjectRef,
        caller: Option<ObjectRef>,
        user_id: i32,
    ) -> Result<()> {
        self.push(code::CONNECT_ABILITY, format!("{} {} {}", want.element, has(&caller), user_id));
        Ok(())
    }

    async fn disconnect_ability(&self, _connection: ObjectRef) -> Result<()> {
        self.push(code::DISCONNECT_ABILITY, String::new());
        Ok(())
    }

    async fn register_connection_observer(&self, _observer: ObjectRef) -> Result<()> {
        self.push(code::REGISTER_CONNECTION_OBSERVER, String::new());
        Ok(())
    }

    async fn unregister_connection_observer(&self, _observer: ObjectRef) -> Result<()> {
        self.push(code::UNREGISTER_CONNECTION_OBSERVER, String::new());
        Err(Error::InvalidValue)
    }

    async fn get_ability_running_info(&self) -> Result<Vec<AbilityRunningInfo>> {
        self.push(code::GET_ABILITY_RUNNING_INFO, String::new());
        Ok(vec![AbilityRunningInfo {
            element: ElementName::new(BUNDLE, "Inbox"),
            pid: 300,
            uid: 20010003,
            process_name: BUNDLE.to_string(),
            start_time: 1_700_000_000_000,
            ability_state: AbilityState::Foreground,
        }])
    }

    async fn get_extension_running_info(&self, upper_limit: i32) -> Result<Vec<ExtensionRunningInfo>> {
        self.push(code::GET_EXTENSION_RUNNING_INFO, format!("{}", upper_limit));
        Ok(Vec::new())
    }

    async fn get_top_ability(&self) -> Result<ElementName> {
        self.push(code::GET_TOP_ABILITY, String::new());
        Ok(ElementName::new(BUNDLE, "Inbox"))
    }

    async fn get_ability_token_by_callee(&self, _callee: ObjectRef) -> Result<Option<ObjectRef>> {
        self.push(code::GET_ABILITY_TOKEN, String::new());
        Ok(self.callee_token.lock().unwrap().clone())
    }

    async fn dump_state(&self, args: String) -> Result<Vec<String>> {
        self.push(code::DUMP_STATE, args.clone());
        Ok(vec![format!("dump {}", args)])
    }

    async fn kill_process(&self, bundle_name: String) -> Result<()> {
        self.push(code::KILL_PROCESS, bundle_name);
        Err(Error::PermissionDenied)
    }

    async fn force_exit_app(&self, pid: i32, reason: i32) -> Result<()> {
        self.push(code::FORCE_EXIT_APP, format!("{} {}", pid, reason));
        Ok(())
    }

    async fn update_configuration(&self, config: Configuration) -> Result<()> {
        self.push(code::UPDATE_CONFIGURATION, config.get("language").unwrap_or_default().to_string());
        Ok(())
    }

    async fn delegator_do_ability_foreground(&self, _token: ObjectRef) -> Result<()> {
        self.push(code::DELEGATOR_DO_ABILITY_FOREGROUND, String::new());
        Ok(())
    }

    async fn delegator_do_ability_background(&self, _token: ObjectRef) -> Result<()> {
        self.push(code::DELEGATOR_DO_ABILITY_BACKGROUND, String::new());
        Ok(())
    }

    async fn do_ability_foreground(&self, _token: ObjectRef, flag: u32) -> Result<()> {
        self.push(code::DO_ABILITY_FOREGROUND, format!("{}", flag));
        Ok(())
    }

    async fn do_ability_background(&self, _token: ObjectRef, flag: u32) -> Result<()> {
        self.push(code::DO_ABILITY_BACKGROUND, format!("{}", flag));
        Ok(())
    }
}

const ALL_CODES: [u32; 37] = [
    code::TERMINATE_ABILITY,
    code::ATTACH_ABILITY_THREAD,
    code::ABILITY_TRANSITION_DONE,
    code::CONNECT_ABILITY_DONE,
    code::DISCONNECT_ABILITY_DONE,
    code::TERMINATE_ABILITY_BY_CALLER,
    code::MINIMIZE_ABILITY,
    code::COMMAND_ABILITY_DONE,
    code::ABILITY_RECOVERY,
    code::ABILITY_RECOVERY_ENABLE,
    code::SEND_RESULT_TO_ABILITY,
    code::MOVE_ABILITY_TO_BACKGROUND,
    code::CALL_REQUEST_DONE,
    code::START_ABILITY,
    code::START_ABILITY_ADD_CALLER,
    code::START_ABILITY_FOR_OPTIONS,
    code::START_EXTENSION_ABILITY,
    code::STOP_EXTENSION_ABILITY,
    code::STOP_SERVICE_ABILITY,
    code::START_CALL_ABILITY,
    code::RELEASE_CALL_ABILITY,
    code::CONNECT_ABILITY,
    code::DISCONNECT_ABILITY,
    code::REGISTER_CONNECTION_OBSERVER,
    code::UNREGISTER_CONNECTION_OBSERVER,
    code::GET_ABILITY_RUNNING_INFO,
    code::GET_EXTENSION_RUNNING_INFO,
    code::GET_TOP_ABILITY,
    code::GET_ABILITY_TOKEN,
    code::DUMP_STATE,
    code::KILL_PROCESS,
    code::FORCE_EXIT_APP,
    code::UPDATE_CONFIGURATION,
    code::DELEGATOR_DO_ABILITY_FOREGROUND,
    code::DELEGATOR_DO_ABILITY_BACKGROUND,
    code::DO_ABILITY_FOREGROUND,
    code::DO_ABILITY_BACKGROUND,
];

fn serve(manager: Arc<RecordingManager>) -> (AbilityManagerProxy, ObjectRef) {
    let object = LocalObject::wrap(AbilityManagerStub::new(manager));
    (AbilityManagerProxy::new(object.clone()), object)
}

fn object() -> ObjectRef {
    Token::new(0).as_object()
}

fn want(name: &str) -> Want {
    Want::new(ElementName::new(BUNDLE, name))
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// ============================================================================
//  TABLE
// ============================================================================

#[test]
fn test_table_registers_every_operation_once() {
    let table = dispatch_table();
    let mut expected = ALL_CODES.to_vec();
    expected.sort_unstable();
    assert_eq!(table.codes(), expected);
    assert_eq!(table.descriptor(), DESCRIPTOR);
}

// ============================================================================
//  ROUND TRIPS
// ============================================================================

#[tokio::test]
async fn test_every_code_reaches_its_handler() -> anyhow::Result<()> {
    let manager = Arc::new(RecordingManager::default());
    let (proxy, _) = serve(manager.clone());
    let token = object();

    proxy.terminate_ability(Some(token.clone()), 3, Some(want("Compose"))).await?;
    proxy.attach_ability_thread(object(), token.clone()).await?;
    proxy.ability_transition_done(token.clone(), AbilityState::Foreground.as_i32(), PacMap::new()).await?;
    proxy.schedule_connect_ability_done(Some(token.clone()), None).await?;
    proxy.schedule_disconnect_ability_done(token.clone()).await?;
    proxy.terminate_ability_by_caller(Some(token.clone()), 9).await?;
    proxy.minimize_ability(token.clone(), true).await?;
    proxy.schedule_command_ability_done(token.clone()).await?;
    proxy.schedule_recover_ability(token.clone(), 2).await;
    proxy.enable_recover_ability(token.clone()).await;
    wait_until(|| manager.codes().len() == 10).await;
    proxy.send_result_to_ability(4, -1, want("Inbox")).await?;
    proxy.move_ability_to_background(Some(token.clone())).await?;
    proxy.call_request_done(token.clone(), object()).await?;
    proxy.start_ability(want("Inbox"), 100, -1).await?;
    proxy.start_ability_with_caller(want("Compose"), Some(token.clone()), 100, 5).await?;
    let options = StartOptions { display_id: 2, ..StartOptions::default() };
    proxy.start_ability_with_options(want("Compose"), options, None, 100, 6).await?;
    proxy.start_extension_ability(want("Sync"), None, 100, ExtensionAbilityType::Service).await?;
    proxy.stop_extension_ability(want("Sync"), None, 100, ExtensionAbilityType::Service).await?;
    proxy.stop_service_ability(want("Sync"), 100, None).await?;
    proxy.start_ability_by_call(want("Inbox"), object(), Some(token.clone()), 100).await?;
    proxy.release_call(object(), ElementName::new(BUNDLE, "Inbox")).await?;
    proxy.connect_ability(want("Sync"), object(), Some(token.clone()), 100).await?;
    proxy.disconnect_ability(object()).await?;
    proxy.register_connection_observer(object()).await?;
    assert_eq!(proxy.unregister_connection_observer(object()).await, Err(Error::InvalidValue));
    proxy.get_ability_running_info().await?;
    proxy.get_extension_running_info(10).await?;
    proxy.get_top_ability().await?;
    proxy.get_ability_token_by_callee(object()).await?;
    proxy.dump_state("-a".to_string()).await?;
    assert_eq!(proxy.kill_process(BUNDLE.to_string()).await, Err(Error::PermissionDenied));
    proxy.force_exit_app(300, 1).await?;
    let mut config = Configuration::new();
    config.set("language", "fr");
    proxy.update_configuration(config).await?;
    proxy.delegator_do_ability_foreground(token.clone()).await?;
    proxy.delegator_do_ability_background(token.clone()).await?;
    proxy.do_ability_foreground(token.clone(), 1).await?;
    proxy.do_ability_background(token.clone(), 2).await?;

    let mut seen = manager.codes();
    seen.sort_unstable();
    let mut expected = ALL_CODES.to_vec();
    expected.sort_unstable();
    assert_eq!(seen, expected);
    Ok(())
}

#[tokio::test]
async fn test_arguments_arrive_in_order() -> anyhow::Result<()> {
    let manager = Arc::new(RecordingManager::default());
    let (proxy, _) = serve(manager.clone());
    let token = object();

    proxy.close_ability(Some(token.clone()), 7, None).await?;
    proxy.start_ability_with_caller(want("Compose"), Some(token.clone()), 100, 5).await?;
    proxy.stop_service_ability(want("Sync"), 101, None).await?;
    proxy.do_ability_background(token, 0x20).await?;

    assert_eq!(manager.args(code::TERMINATE_ABILITY).as_deref(), Some("close true 7 false"));
    assert_eq!(
        manager.args(code::START_ABILITY_ADD_CALLER),
        Some(format!("{} true 100 5", ElementName::new(BUNDLE, "Compose")))
    );
    assert_eq!(
        manager.args(code::STOP_SERVICE_ABILITY),
        Some(format!("{} 101 false", ElementName::new(BUNDLE, "Sync")))
    );
    assert_eq!(manager.args(code::DO_ABILITY_BACKGROUND).as_deref(), Some("32"));
    Ok(())
}

#[tokio::test]
async fn test_reply_payloads_round_trip() -> anyhow::Result<()> {
    let manager = Arc::new(RecordingManager::default());
    let (proxy, _) = serve(manager.clone());

    let infos = proxy.get_ability_running_info().await?;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].pid, 300);
    assert_eq!(infos[0].ability_state, AbilityState::Foreground);

    assert_eq!(proxy.get_top_ability().await?, ElementName::new(BUNDLE, "Inbox"));
    assert_eq!(proxy.dump_state("x".into()).await?, vec!["dump x".to_string()]);

    assert!(proxy.get_ability_token_by_callee(object()).await?.is_none());
    let token = object();
    *manager.callee_token.lock().unwrap() = Some(token.clone());
    let returned = proxy.get_ability_token_by_callee(object()).await?;
    assert!(returned.is_some_and(|t| same_object(&t, &token)));
    Ok(())
}

// ============================================================================
//  REJECTIONS
// ============================================================================

async fn raw(target: &ObjectRef, code: u32, data: Parcel) -> ipc::Result<Parcel> {
    target.send_request(code, data, MessageOption::sync()).await
}

#[tokio::test]
async fn test_unknown_code_is_rejected_without_side_effects() -> anyhow::Result<()> {
    let manager = Arc::new(RecordingManager::default());
    let (_, object) = serve(manager.clone());

    let mut data = Parcel::new();
    data.write_interface_token(DESCRIPTOR)?;
    data.write_i32(1)?;
    let outcome = raw(&object, 0xFFFF_FFF0, data).await;

    assert!(matches!(outcome, Err(ipc::Error::Status(s)) if s == status::ERR_UNKNOWN_TRANSACTION));
    assert!(manager.codes().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_wrong_interface_token_is_rejected() -> anyhow::Result<()> {
    let manager = Arc::new(RecordingManager::default());
    let (_, object) = serve(manager.clone());

    for code in ALL_CODES {
        let mut data = Parcel::new();
        data.write_interface_token("ohos.aafwk.SomethingElse")?;
        data.write_string(BUNDLE)?;
        let outcome = raw(&object, code, data).await;

        assert!(
            matches!(outcome, Err(ipc::Error::Status(s)) if s == status::ERR_INVALID_STATE),
            "code {code}"
        );
    }
    assert!(manager.codes().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_truncated_arguments_are_rejected() -> anyhow::Result<()> {
    let manager = Arc::new(RecordingManager::default());
    let (_, object) = serve(manager.clone());

    let mut data = Parcel::new();
    data.write_interface_token(DESCRIPTOR)?;
    data.write_i32(300)?;
    let outcome = raw(&object, code::FORCE_EXIT_APP, data).await;

    assert!(matches!(outcome, Err(ipc::Error::Status(s)) if s == status::ERR_INVALID_VALUE));
    assert!(manager.codes().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_ping_and_interface_queries_use_the_defaults() -> anyhow::Result<()> {
    let (_, object) = serve(Arc::new(RecordingManager::default()));

    let mut data = Parcel::new();
    data.write_interface_token(DESCRIPTOR)?;
    let mut reply = raw(&object, status::INTERFACE_TRANSACTION, data).await?;
    assert_eq!(reply.read_string()?, DESCRIPTOR);
    assert_eq!(object.descriptor(), DESCRIPTOR);
    Ok(())
}

#[tokio::test]
async fn test_dead_manager_fails_requests() {
    let manager = Arc::new(RecordingManager::default());
    let stub = LocalObject::new(Arc::new(AbilityManagerStub::new(manager.clone())));
    let proxy = AbilityManagerProxy::new(stub.clone());
    stub.kill();

    assert_eq!(proxy.get_top_ability().await, Err(Error::DeadObject));
    assert!(manager.codes().is_empty());
}
