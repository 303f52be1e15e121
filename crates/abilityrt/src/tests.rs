use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use ipc::LocalObject;
use ipc::MessageOption;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::RemoteStub;
use ipc::status;
use ipc::stub::check_interface_token;
use rand::Rng;

use crate::config::RuntimeConfig;
use crate::connection::ConnectionKind;
use crate::connection::ConnectionRecord;
use crate::connection::ConnectionRegistry;
use crate::connection::ServiceConnection;
use crate::error::Error;
use crate::info::AbilityInfo;
use crate::info::AbilityType;
use crate::info::ApplicationInfo;
use crate::info::Configuration;
use crate::info::LifecycleStateInfo;
use crate::monitor::AbilityMonitor;
use crate::monitor::MonitorRegistry;
use crate::monitor::StateChange;
use crate::record::AbilityRecord;
use crate::record::AbilityResult;
use crate::record::CallerRecord;
use crate::record::LifecycleListener;
use crate::record::RecordContext;
use crate::record::SystemAbilityCallerRecord;
use crate::record::TimeoutKind;
use crate::record::caller::SYSTEM_ABILITY_SEND_RESULT;
use crate::scheduler::AbilityScheduler;
use crate::service::collaborator::AppScheduler;
use crate::state::AbilityState;
use crate::task::TaskHandler;
use crate::token::Token;
use crate::want::ACTION_HOME;
use crate::want::ENTITY_HOME;
use crate::want::ElementName;
use crate::want::PARAM_CALLER_ABILITY_ID;
use crate::want::PacMap;
use crate::want::Want;

const BUNDLE: &str = "com.example.notes";
const PID: i32 = 4242;
const WAIT: Option<Duration> = Some(Duration::from_secs(2));

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Sink = Arc<Mutex<Vec<String>>>;

/// Logs every scheduler call as `name:event`.
struct RecordingScheduler {
    name: String,
    sink: Sink,
}

impl RecordingScheduler {
    fn push(&self, event: String) {
        self.sink.lock().unwrap().push(format!("{}:{}", self.name, event));
    }
}

#[async_trait::async_trait]
impl AbilityScheduler for RecordingScheduler {
    async fn schedule_ability_transaction(&self, _want: Want, info: LifecycleStateInfo) {
        self.push(format!("transaction:{}", info.state));
    }

    async fn send_result(&self, request_code: i32, result_code: i32, _want: Want) {
        self.push(format!("result:{}:{}", request_code, result_code));
    }

    async fn schedule_connect_ability(&self, _want: Want) {
        self.push("connect".into());
    }

    async fn schedule_disconnect_ability(&self, _want: Want) {
        self.push("disconnect".into());
    }

    async fn schedule_command_ability(&self, _want: Want, restart: bool, start_id: i32) {
        self.push(format!("command:{}:{}", restart, start_id));
    }

    async fn schedule_save_ability_state(&self) {
        self.push("save".into());
    }

    async fn schedule_restore_ability_state(&self, _state: PacMap) {
        self.push("restore".into());
    }

    async fn schedule_update_configuration(&self, _config: Configuration) {
        self.push("configuration".into());
    }

    async fn schedule_call(&self) {
        self.push("call".into());
    }
}

#[derive(Default)]
struct FakeApp {
    loads: AtomicUsize,
}

#[async_trait::async_trait]
impl AppScheduler for FakeApp {
    async fn load_ability(&self, _token: ObjectRef, _ability: AbilityInfo, _app: ApplicationInfo, _want: Want) -> crate::Result<i32> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(PID)
    }

    async fn kill_process(&self, _bundle_name: &str) -> crate::Result<()> {
        Ok(())
    }

    async fn kill_process_by_pid(&self, _pid: i32) -> crate::Result<()> {
        Ok(())
    }
}

fn page(name: &str) -> AbilityInfo {
    AbilityInfo {
        name: name.to_string(),
        bundle_name: BUNDLE.to_string(),
        module_name: "entry".to_string(),
        ability_type: AbilityType::Page,
        ..AbilityInfo::default()
    }
}

fn app_info() -> ApplicationInfo {
    ApplicationInfo {
        name: "notes".to_string(),
        bundle_name: BUNDLE.to_string(),
        uid: 20010001,
        ..ApplicationInfo::default()
    }
}

struct Fixture {
    ctx: Arc<RecordContext>,
    app: Arc<FakeApp>,
    sink: Sink,
}

impl Fixture {
    fn new(config: RuntimeConfig) -> Self {
        init_tracing();
        let app = Arc::new(FakeApp::default());
        let ctx = RecordContext::new(
            Arc::new(config),
            TaskHandler::new("test", 64),
            MonitorRegistry::new(),
            app.clone(),
        );
        Self { ctx, app, sink: Sink::default() }
    }

    fn record_with(&self, ability: AbilityInfo, app: Option<ApplicationInfo>, want: Want) -> Arc<AbilityRecord> {
        AbilityRecord::new(self.ctx.clone(), ability, app, want, -1)
    }

    fn record(&self, name: &str) -> Arc<AbilityRecord> {
        let ability = page(name);
        let want = Want::new(ability.element());
        self.record_with(ability, Some(app_info()), want)
    }

    fn attach(&self, record: &AbilityRecord, name: &str) {
        let scheduler = Arc::new(RecordingScheduler { name: name.to_string(), sink: self.sink.clone() });
        record.attach_scheduler(Token::new(-1).as_object(), scheduler);
    }

    fn ready(&self, name: &str) -> Arc<AbilityRecord> {
        let record = self.record(name);
        self.attach(&record, name);
        record
    }

    async fn events(&self) -> Vec<String> {
        self.ctx.tasks.flush().await;
        self.sink.lock().unwrap().clone()
    }
}

fn dummy_object() -> ObjectRef {
    Token::new(-1).as_object()
}

// ============================================================================
//  LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_lifecycle_requests_dropped_before_ready() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.record("Main");

    record.activate();
    assert_eq!(record.state(), AbilityState::Initial);
    record.foreground(0);
    assert_eq!(record.state(), AbilityState::Initial);
    record.inactivate();
    assert_eq!(record.state(), AbilityState::Initial);

    assert!(fx.events().await.is_empty());
}

#[tokio::test]
async fn test_activate_then_complete() -> anyhow::Result<()> {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.ready("main");

    record.activate();
    assert_eq!(record.state(), AbilityState::Activating);
    assert_eq!(fx.events().await, vec!["main:transaction:ACTIVE"]);

    record.complete_transition(AbilityState::Active)?;
    assert_eq!(record.state(), AbilityState::Active);

    record.inactivate();
    record.complete_transition(AbilityState::Inactive)?;
    assert_eq!(record.state(), AbilityState::Inactive);
    Ok(())
}

#[tokio::test]
async fn test_wrong_source_state_is_ignored() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.ready("main");

    record.background();
    assert_eq!(record.state(), AbilityState::Initial);

    assert_eq!(record.complete_transition(AbilityState::Foreground), Err(Error::InvalidValue));
    assert_eq!(record.state(), AbilityState::Initial);
    assert!(fx.events().await.is_empty());
}

#[tokio::test]
async fn test_foreground_background_cycle() -> anyhow::Result<()> {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.ready("main");

    record.foreground(0);
    assert_eq!(record.state(), AbilityState::Foregrounding);
    record.complete_transition(AbilityState::Foreground)?;

    record.background();
    assert_eq!(record.state(), AbilityState::Backgrounding);
    record.complete_transition(AbilityState::Background)?;

    record.foreground(0);
    record.complete_transition(AbilityState::ForegroundFailed)?;
    assert_eq!(record.state(), AbilityState::ForegroundFailed);

    assert_eq!(
        fx.events().await,
        vec![
            "main:transaction:FOREGROUND",
            "main:transaction:BACKGROUND",
            "main:transaction:FOREGROUND",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_background_saves_state_when_recovery_enabled() -> anyhow::Result<()> {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.ready("main");
    record.enable_recovery();

    record.foreground(0);
    record.complete_transition(AbilityState::Foreground)?;
    record.background();

    assert_eq!(
        fx.events().await,
        vec!["main:transaction:FOREGROUND", "main:save", "main:transaction:BACKGROUND"]
    );
    Ok(())
}

#[tokio::test]
async fn test_terminate_before_ready_completes_at_once() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.record("main");
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    assert!(record.terminate(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let counter = calls.clone();
    assert!(!record.terminate(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(record.is_terminated());
    assert_eq!(record.state(), AbilityState::Initial);
    assert!(!record.token_object().is_alive());
}

#[tokio::test]
async fn test_terminate_waits_for_the_report() -> anyhow::Result<()> {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.ready("main");
    let done = Arc::new(AtomicBool::new(false));

    let flag = done.clone();
    record.terminate(move || flag.store(true, Ordering::SeqCst));
    assert_eq!(record.state(), AbilityState::Terminating);
    assert!(!done.load(Ordering::SeqCst));
    assert_eq!(fx.events().await, vec!["main:transaction:INITIAL"]);

    // Lifecycle requests are ignored while terminating.
    record.foreground(0);
    assert_eq!(record.state(), AbilityState::Terminating);

    record.complete_transition(AbilityState::Initial)?;
    assert!(done.load(Ordering::SeqCst));
    assert!(record.is_terminated());
    Ok(())
}

#[tokio::test]
async fn test_terminate_timeout_completes_termination() -> anyhow::Result<()> {
    let config = RuntimeConfig::standard().with_lifecycle_timeouts(
        Duration::from_secs(5),
        Duration::from_secs(5),
        Duration::from_millis(20),
    );
    let fx = Fixture::new(config);
    let record = fx.ready("main");
    let done = Arc::new(AtomicUsize::new(0));

    let pending = fx.ctx.monitors.register(AbilityMonitor::new("main"), AbilityState::Initial);
    let counter = done.clone();
    record.terminate(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    pending.wait(WAIT).await?;

    assert_eq!(done.load(Ordering::SeqCst), 1);
    // A late report is rejected and the callback does not run again.
    assert_eq!(record.complete_transition(AbilityState::Initial), Err(Error::InvalidValue));
    assert_eq!(done.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_foreground_timeout_marks_failure() -> anyhow::Result<()> {
    let config = RuntimeConfig::standard().with_lifecycle_timeouts(
        Duration::from_millis(20),
        Duration::from_secs(5),
        Duration::from_secs(5),
    );
    let fx = Fixture::new(config);
    let record = fx.ready("main");

    let pending = fx
        .ctx
        .monitors
        .register(AbilityMonitor::new("main").in_module("entry"), AbilityState::ForegroundFailed);
    record.foreground(0);
    let change = pending.wait(WAIT).await?;

    assert_eq!(change.record_id, record.id());
    assert_eq!(record.state(), AbilityState::ForegroundFailed);
    Ok(())
}

#[tokio::test]
async fn test_completed_foreground_cancels_its_timeout() -> anyhow::Result<()> {
    let config = RuntimeConfig::standard().with_lifecycle_timeouts(
        Duration::from_millis(20),
        Duration::from_secs(5),
        Duration::from_secs(5),
    );
    let fx = Fixture::new(config);
    let record = fx.ready("main");

    record.foreground(0);
    record.complete_transition(AbilityState::Foreground)?;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(record.state(), AbilityState::Foreground);
    Ok(())
}

struct TimeoutLog {
    kinds: Mutex<Vec<(i64, TimeoutKind)>>,
}

impl LifecycleListener for TimeoutLog {
    fn on_lifecycle_timeout(&self, record: Arc<AbilityRecord>, kind: TimeoutKind) {
        self.kinds.lock().unwrap().push((record.id(), kind));
    }
}

#[tokio::test]
async fn test_load_timeout_reaches_listener() -> anyhow::Result<()> {
    let fx = Fixture::new(RuntimeConfig::standard().with_load_timeout(Duration::from_millis(20)));
    let log = Arc::new(TimeoutLog { kinds: Mutex::new(Vec::new()) });
    let listener: Weak<dyn LifecycleListener> = Arc::downgrade(&log) as Weak<dyn LifecycleListener>;
    assert!(fx.ctx.set_listener(listener));

    let stuck = fx.record("stuck");
    let attached = fx.record("attached");
    stuck.load_ability()?;
    attached.load_ability()?;
    fx.attach(&attached, "attached");

    tokio::time::sleep(Duration::from_millis(80)).await;
    fx.ctx.tasks.flush().await;

    assert_eq!(*log.kinds.lock().unwrap(), vec![(stuck.id(), TimeoutKind::Load)]);
    Ok(())
}

#[tokio::test]
async fn test_load_ability_preconditions() -> anyhow::Result<()> {
    let fx = Fixture::new(RuntimeConfig::standard());

    let unknown = AbilityInfo { ability_type: AbilityType::Unknown, ..page("odd") };
    let want = Want::new(unknown.element());
    assert_eq!(fx.record_with(unknown, Some(app_info()), want).load_ability(), Err(Error::UnknownAbilityType));

    let orphan = page("orphan");
    let want = Want::new(orphan.element());
    assert_eq!(fx.record_with(orphan, None, want).load_ability(), Err(Error::InvalidValue));
    fx.ctx.tasks.flush().await;
    assert_eq!(fx.app.loads.load(Ordering::SeqCst), 0);

    let record = fx.record("main");
    record.load_ability()?;
    fx.ctx.tasks.flush().await;
    assert_eq!(fx.app.loads.load(Ordering::SeqCst), 1);
    assert_eq!(record.pid(), PID);
    assert_eq!(record.state(), AbilityState::Initial);
    Ok(())
}

// ============================================================================
//  CONNECTIONS ON A RECORD
// ============================================================================

fn connection(id: i64, target: &Arc<AbilityRecord>) -> Arc<ConnectionRecord> {
    ConnectionRecord::new(id, ConnectionKind::Connect, None, "", target, dummy_object())
}

#[tokio::test]
async fn test_connection_add_is_idempotent() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let target = fx.record("service");

    for id in 0..8 {
        let conn = connection(id, &target);
        let before = target.connection_count();
        target.add_connect_record(Some(&conn));
        target.add_connect_record(Some(&conn));
        assert_eq!(target.connection_count(), before + 1);
    }
    target.add_connect_record(None);
    assert_eq!(target.connection_count(), 8);
}

#[tokio::test]
async fn test_connection_remove_tolerates_null_and_absent() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let target = fx.record("service");
    let present = connection(1, &target);
    let absent = connection(2, &target);

    target.remove_connect_record(None);
    target.remove_connect_record(Some(&absent));
    assert_eq!(target.connection_count(), 0);

    target.add_connect_record(Some(&present));
    target.remove_connect_record(None);
    target.remove_connect_record(Some(&absent));
    assert_eq!(target.connection_count(), 1);

    target.remove_connect_record(Some(&present));
    target.remove_connect_record(Some(&present));
    assert_eq!(target.connection_count(), 0);
}

#[tokio::test]
async fn test_connection_record_transitions() -> anyhow::Result<()> {
    let fx = Fixture::new(RuntimeConfig::standard());
    let target = fx.record("service");
    let conn = connection(1, &target);

    assert_eq!(conn.disconnect(), Err(Error::InvalidConnectionState));
    assert_eq!(conn.complete_disconnect(), Err(Error::InvalidConnectionState));

    conn.complete_connect()?;
    assert_eq!(conn.complete_connect(), Err(Error::InvalidConnectionState));
    conn.disconnect()?;
    conn.complete_disconnect()?;
    assert!(conn.is_disconnected());
    assert_eq!(conn.element(), &target.element());
    assert!(conn.target().is_some_and(|t| Arc::ptr_eq(&t, &target)));
    Ok(())
}

#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs `f` under a debug-level subscriber and returns what it logged.
fn capture_logs(f: impl FnOnce()) -> String {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = capture.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn transitions(logs: &str) -> Vec<String> {
    logs.lines()
        .filter(|line| line.contains("connection transition"))
        .filter_map(|line| line.find("from=").map(|at| line[at..].to_string()))
        .collect()
}

#[tokio::test]
async fn test_abort_walks_the_connection_cycle() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let target = fx.record("service");

    let connecting = connection(1, &target);
    let logs = capture_logs(|| connecting.abort());
    assert!(connecting.is_disconnected());
    assert!(!logs.contains("rejected connection transition"));
    assert_eq!(
        transitions(&logs),
        vec!["from=CONNECTING to=DISCONNECTING", "from=DISCONNECTING to=DISCONNECTED"]
    );

    let connected = connection(2, &target);
    connected.complete_connect().unwrap();
    let logs = capture_logs(|| connected.abort());
    assert!(connected.is_disconnected());
    assert_eq!(
        transitions(&logs),
        vec!["from=CONNECTED to=DISCONNECTING", "from=DISCONNECTING to=DISCONNECTED"]
    );

    let leaving = connection(3, &target);
    leaving.complete_connect().unwrap();
    leaving.disconnect().unwrap();
    let logs = capture_logs(|| leaving.abort());
    assert_eq!(transitions(&logs), vec!["from=DISCONNECTING to=DISCONNECTED"]);

    let logs = capture_logs(|| leaving.abort());
    assert!(transitions(&logs).is_empty());
    assert!(leaving.is_disconnected());
}

// ============================================================================
//  CALLERS AND RESULTS
// ============================================================================

#[tokio::test]
async fn test_results_delivered_in_caller_order_exactly_once() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let target = fx.ready("target");
    let callers: Vec<_> = (1..=5).map(|i| fx.ready(&format!("c{}", i))).collect();
    for (i, caller) in callers.iter().enumerate() {
        target.add_caller(CallerRecord::ability(i as i32 + 1, caller));
    }
    let mut callers = callers;
    // A caller that is gone has nowhere to store a result.
    drop(callers.remove(2));

    let want = Want::new(ElementName::new(BUNDLE, "target"));
    target.save_result_to_callers(7, &want);
    target.send_result_to_callers();

    let expected = vec!["c1:result:1:7", "c2:result:2:7", "c4:result:4:7", "c5:result:5:7"];
    assert_eq!(fx.events().await, expected);
    assert_eq!(target.caller_count(), 0);

    target.send_result_to_callers();
    for caller in &callers {
        assert!(!caller.send_result());
    }
    assert_eq!(fx.events().await, expected);
}

#[tokio::test]
async fn test_same_caller_and_request_code_registers_once() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let target = fx.record("target");
    let caller = fx.record("caller");

    target.add_caller(CallerRecord::ability(3, &caller));
    target.add_caller(CallerRecord::ability(3, &caller));
    target.add_caller(CallerRecord::ability(4, &caller));

    assert_eq!(target.caller_count(), 2);
    assert!(target.is_called_by(caller.id(), 3));
    assert!(!target.is_called_by(caller.id(), 5));
}

#[tokio::test]
async fn test_send_result_needs_result_and_scheduler() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.record("main");
    assert!(!record.send_result());

    record.set_result(AbilityResult { request_code: 1, result_code: 2, want: Want::default() });
    assert!(!record.send_result());
    assert!(record.result().is_some());

    fx.attach(&record, "main");
    assert!(record.send_result());
    assert!(!record.send_result());
    assert_eq!(fx.events().await, vec!["main:result:1:2"]);
}

/// Stands in for a system ability's caller token.
#[derive(Default)]
struct SystemAbilityStub {
    seen: Arc<Mutex<Vec<(u32, i32, i32, String)>>>,
}

const SA_DESCRIPTOR: &str = "test.SystemAbility";

#[async_trait::async_trait]
impl RemoteStub for SystemAbilityStub {
    fn descriptor(&self) -> &str {
        SA_DESCRIPTOR
    }

    async fn on_remote_request(&self, code: u32, data: &mut Parcel, _reply: &mut Parcel, _option: MessageOption) -> i32 {
        if !check_interface_token(data, SA_DESCRIPTOR) {
            return status::ERR_INVALID_STATE;
        }
        let (Ok(request_code), Ok(result_code)) = (data.read_i32(), data.read_i32()) else {
            return status::ERR_INVALID_VALUE;
        };
        let Ok(want) = data.read_parcelable::<Want>() else {
            return status::ERR_INVALID_VALUE;
        };
        let src = want.params.get_string(PARAM_CALLER_ABILITY_ID).unwrap_or_default().to_string();
        self.seen.lock().unwrap().push((code, request_code, result_code, src));
        status::ERR_NONE
    }
}

#[tokio::test]
async fn test_system_ability_caller_receives_result_directly() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let target = fx.record("target");
    let stub = SystemAbilityStub::default();
    let seen = stub.seen.clone();
    let token = LocalObject::wrap(stub);

    target.add_caller(CallerRecord::system_ability(5, SystemAbilityCallerRecord::new("sa.4201", token)));
    target.save_result_to_callers(9, &Want::default());
    fx.ctx.tasks.flush().await;

    for _ in 0..200 {
        if !seen.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(SYSTEM_ABILITY_SEND_RESULT, 5, 9, "sa.4201".to_string())]
    );
}

// ============================================================================
//  RESTART AND RECOVERY
// ============================================================================

#[tokio::test]
async fn test_resident_restart_waits_for_interval() {
    let config = RuntimeConfig::standard()
        .with_restart_interval(Duration::from_millis(50))
        .with_restart_max(0, 15);
    let fx = Fixture::new(config);
    let ability = page("daemon");
    let want = Want::new(ability.element());
    let app = ApplicationInfo { keep_alive: true, ..app_info() };
    let record = fx.record_with(ability, Some(app), want);

    assert!(record.is_resident());
    assert_eq!(record.restart_count(), 0);
    assert!(record.can_restart_resident());

    record.set_restarting(true, record.restart_count() - 1);
    assert!(!record.can_restart_resident());
    assert_eq!(record.load_ability(), Err(Error::RestartNotAllowed));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(record.can_restart_resident());

    record.set_restarting(false, 0);
    assert_eq!(record.restart_count(), 0);
    assert!(!record.is_restarting());
}

#[tokio::test]
async fn test_root_launcher_restart_budget() {
    let fx = Fixture::new(RuntimeConfig::standard().with_restart_max(3, 1));
    let ability = page("home");
    let want = Want::new(ability.element()).with_action(ACTION_HOME).with_entity(ENTITY_HOME);
    let app = ApplicationInfo { is_launcher_app: true, ..app_info() };
    let record = fx.record_with(ability, Some(app), want);

    assert!(record.is_launcher_root());
    assert_eq!(record.restart_count(), 1);

    record.set_restarting(true, 0);
    assert_eq!(record.restart_count(), 0);
    assert!(record.can_restart_root_launcher());

    record.set_restarting(true, 0);
    assert!(!record.can_restart_root_launcher());
    assert_eq!(record.load_ability(), Err(Error::RestartNotAllowed));

    record.set_restarting(false, 0);
    assert_eq!(record.restart_count(), 1);
    assert!(record.can_restart_root_launcher());
}

#[tokio::test]
async fn test_recovery_flag_and_saved_state() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.ready("main");

    assert!(!record.restore_ability_state());
    record.update_recovery_info(true);
    assert!(record.recovery_info());
    assert!(record.want().is_recovery_restart());
    record.update_recovery_info(false);
    assert!(!record.recovery_info());

    let mut state = PacMap::new();
    state.set("draft", crate::want::ParamValue::String("hello".into()));
    record.set_saved_state(state.clone());
    assert!(record.restore_ability_state());
    assert_eq!(record.saved_state(), Some(state));
    assert_eq!(fx.events().await, vec!["main:restore"]);
}

#[tokio::test]
async fn test_service_commands_carry_restart_flag() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.ready("svc");

    record.command_ability();
    record.set_restarting(true, 0);
    record.command_ability();
    record.update_configuration(Configuration::new());

    assert_eq!(
        fx.events().await,
        vec!["svc:command:false:1", "svc:command:true:2", "svc:configuration"]
    );
}

#[tokio::test]
async fn test_command_stays_in_flight_until_acknowledged() -> anyhow::Result<()> {
    let fx = Fixture::new(RuntimeConfig::standard().with_command_timeout(Duration::from_millis(50)));
    let record = fx.ready("svc");

    assert_eq!(record.complete_command(), Err(Error::InvalidConnectionState));

    record.set_ability_state(AbilityState::Inactive);
    assert!(record.command_ability());
    assert!(record.command_ability());
    record.defer_connect();
    record.complete_command()?;
    assert!(record.is_command_in_flight());
    assert!(!record.take_deferred_connect());
    record.complete_command()?;
    assert!(!record.is_command_in_flight());
    assert!(record.take_deferred_connect());
    assert!(!record.take_deferred_connect());

    // An unacknowledged command stops blocking once its timeout fires.
    assert!(record.command_ability());
    record.defer_connect();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!record.is_command_in_flight());
    assert!(record.take_deferred_connect());
    Ok(())
}

#[tokio::test]
async fn test_command_without_scheduler_is_not_in_flight() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.record("svc");

    assert!(!record.command_ability());
    assert!(!record.is_command_in_flight());
}

#[tokio::test]
async fn test_dump_and_running_info() {
    let fx = Fixture::new(RuntimeConfig::standard());
    let record = fx.ready("main");
    record.set_pid(77);
    record.foreground(0);

    let info = record.running_info();
    assert_eq!(info.pid, 77);
    assert_eq!(info.uid, 20010001);
    assert_eq!(info.ability_state, AbilityState::Foregrounding);

    let dump = record.dump().join("\n");
    assert!(dump.contains("FOREGROUNDING"));
    assert!(dump.contains("main"));
}

// ============================================================================
//  CONNECTION REGISTRY
// ============================================================================

#[derive(Default)]
struct CountingConnection {
    id: Mutex<i64>,
    releases: AtomicUsize,
}

impl ServiceConnection for CountingConnection {
    fn set_connection_id(&self, id: i64) {
        *self.id.lock().unwrap() = id;
    }

    fn connection_id(&self) -> i64 {
        *self.id.lock().unwrap()
    }

    fn connection_object(&self) -> Option<ObjectRef> {
        None
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn service_want(name: &str) -> Want {
    Want::new(ElementName::new(BUNDLE, name))
}

#[test]
fn test_registry_insert_find_remove() -> crate::Result<()> {
    let registry = ConnectionRegistry::new();
    let conn = Arc::new(CountingConnection::default());

    let id = registry.insert(Some(conn.clone()), service_want("sync"), 100)?;
    assert_eq!(conn.connection_id(), id);
    assert!(registry.find_by_id(id).is_some());

    assert!(registry.remove(id));
    assert!(registry.find_by_id(id).is_none());
    assert_eq!(conn.releases.load(Ordering::SeqCst), 1);

    assert!(!registry.remove(id));
    assert_eq!(conn.releases.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_registry_rejects_null_connection() {
    let registry = ConnectionRegistry::new();
    assert_eq!(registry.insert(None, service_want("sync"), -1), Err(Error::InvalidValue));
    assert!(registry.is_empty());
}

#[test]
fn test_registry_ids_unique_while_live() -> crate::Result<()> {
    let mut rng = rand::thread_rng();
    let registry = ConnectionRegistry::starting_at(rng.gen_range(0..1_000_000));
    let total = rng.gen_range(50..200);
    let mut ids = Vec::new();
    for _ in 0..total {
        let id = registry.insert(Some(Arc::new(CountingConnection::default())), service_want("svc"), -1)?;
        ids.push(id);
        if rng.gen_bool(0.3) {
            let victim = ids[rng.gen_range(0..ids.len())];
            registry.remove(victim);
        }
    }
    let distinct: HashSet<_> = ids.iter().collect();
    assert_eq!(distinct.len(), total);
    Ok(())
}

#[test]
fn test_registry_id_wraps_to_zero() -> crate::Result<()> {
    let registry = ConnectionRegistry::starting_at(i32::MAX as i64);
    let first = registry.insert(Some(Arc::new(CountingConnection::default())), service_want("a"), -1)?;
    let second = registry.insert(Some(Arc::new(CountingConnection::default())), service_want("b"), -1)?;
    assert_eq!(first, i32::MAX as i64);
    assert_eq!(second, 0);
    Ok(())
}

#[test]
fn test_registry_find_by_want_respects_account() -> crate::Result<()> {
    let registry = ConnectionRegistry::new();
    let id = registry.insert(Some(Arc::new(CountingConnection::default())), service_want("sync"), 100)?;

    assert_eq!(registry.find_by_want(&service_want("sync"), 100).map(|(k, _)| k), Some(id));
    assert!(registry.find_by_want(&service_want("sync"), 101).is_none());
    assert!(registry.find_by_want(&service_want("other"), 100).is_none());
    assert_eq!(registry.key(id).map(|k| k.account_id), Some(100));
    Ok(())
}

#[test]
fn test_registry_clear_releases_everything() -> crate::Result<()> {
    let registry = ConnectionRegistry::new();
    let conns: Vec<_> = (0..4).map(|_| Arc::new(CountingConnection::default())).collect();
    for conn in &conns {
        registry.insert(Some(conn.clone()), service_want("svc"), -1)?;
    }
    registry.clear();
    assert!(registry.is_empty());
    assert!(conns.iter().all(|c| c.releases.load(Ordering::SeqCst) == 1));
    Ok(())
}

// ============================================================================
//  TASK HANDLER
// ============================================================================

#[tokio::test]
async fn test_tasks_run_in_submission_order() -> crate::Result<()> {
    let tasks = TaskHandler::new("order", 16);
    let seen = Arc::new(Mutex::new(Vec::new()));
    for i in 0..10 {
        let seen = seen.clone();
        tasks.submit(format!("t{}", i), async move {
            tokio::task::yield_now().await;
            seen.lock().unwrap().push(i);
        })?;
    }
    tasks.flush().await;
    assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_full_queue_rejects() -> crate::Result<()> {
    let tasks = TaskHandler::new("tiny", 1);
    let (release, blocked) = tokio::sync::oneshot::channel::<()>();
    tasks.submit("blocker", async move {
        let _ = blocked.await;
    })?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    tasks.submit("queued", async {})?;
    assert_eq!(tasks.submit("overflow", async {}), Err(Error::LimitReached));

    let _ = release.send(());
    tasks.flush().await;
    Ok(())
}

#[tokio::test]
async fn test_delayed_tasks_replace_and_cancel() {
    let tasks = TaskHandler::new("delayed", 16);
    let fired = Arc::new(Mutex::new(Vec::new()));

    for label in ["first", "second"] {
        let fired = fired.clone();
        tasks.submit_delayed("timer", Duration::from_millis(20), async move {
            fired.lock().unwrap().push(label);
        });
    }
    let cancelled = fired.clone();
    tasks.submit_delayed("other", Duration::from_millis(20), async move {
        cancelled.lock().unwrap().push("other");
    });
    assert!(tasks.cancel("other"));
    assert!(!tasks.cancel("other"));

    tokio::time::sleep(Duration::from_millis(60)).await;
    tasks.flush().await;
    assert_eq!(*fired.lock().unwrap(), vec!["second"]);
    assert!(!tasks.has_delayed("timer"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_immediate_delayed_task_leaves_no_entry() {
    let tasks = TaskHandler::new("immediate", 16);
    for _ in 0..50 {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tasks.submit_delayed("now", Duration::ZERO, async move {
            let _ = tx.send(());
        });
        rx.await.unwrap();
        assert!(!tasks.has_delayed("now"));
    }
}

// ============================================================================
//  MONITORS
// ============================================================================

fn change(name: &str, state: AbilityState) -> StateChange {
    StateChange {
        record_id: 1,
        element: ElementName::new(BUNDLE, name).with_module("entry"),
        state,
        token: dummy_object(),
    }
}

#[tokio::test]
async fn test_monitor_wait_times_out_and_unregisters() {
    let monitors = MonitorRegistry::new();
    let outcome = monitors
        .wait_for(AbilityMonitor::new("main"), AbilityState::Foreground, Some(Duration::from_millis(20)))
        .await;
    assert!(matches!(outcome, Err(Error::Timeout)));
    assert_eq!(monitors.pending(), 0);
}

#[tokio::test]
async fn test_monitor_resolves_on_matching_change_only() -> anyhow::Result<()> {
    let monitors = MonitorRegistry::new();
    let pending = monitors.register(AbilityMonitor::new("main").in_module("entry"), AbilityState::Foreground);

    monitors.notify(&change("main", AbilityState::Background));
    monitors.notify(&change("other", AbilityState::Foreground));
    assert_eq!(monitors.pending(), 1);

    monitors.notify(&change("main", AbilityState::Foreground));
    let resolved = pending.wait(WAIT).await?;
    assert_eq!(resolved.state, AbilityState::Foreground);
    assert_eq!(monitors.pending(), 0);
    Ok(())
}

#[tokio::test]
async fn test_monitor_cancel() {
    let monitors = MonitorRegistry::new();
    let pending = monitors.register(AbilityMonitor::new("main"), AbilityState::Foreground);
    assert!(monitors.cancel(pending.id()));
    assert!(matches!(pending.wait(WAIT).await, Err(Error::Cancelled)));
}
