//! A fake app manager whose "processes" are in-process ability threads, and
//! the fixtures shared by the service tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::Weak;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use abilityrt::AbilityManager;
use abilityrt::AbilityManagerProxy;
use abilityrt::AbilityManagerService;
use abilityrt::AbilityManagerStub;
use abilityrt::ElementName;
use abilityrt::RuntimeConfig;
use abilityrt::ServiceContext;
use abilityrt::TaskHandler;
use abilityrt::Want;
use abilityrt::client::AbilityContext;
use abilityrt::client::AbilityLifecycle;
use abilityrt::client::AbilityThread;
use abilityrt::connection::AbilityConnection;
use abilityrt::connection::ConnectionObserver;
use abilityrt::info::AbilityInfo;
use abilityrt::info::AbilityType;
use abilityrt::info::ApplicationInfo;
use abilityrt::info::ConnectionData;
use abilityrt::info::Configuration;
use abilityrt::info::ExtensionAbilityType;
use abilityrt::info::LaunchMode;
use abilityrt::scheduler::AbilitySchedulerStub;
use abilityrt::service::collaborator::AppScheduler;
use abilityrt::service::collaborator::PermissionVerifier;
use abilityrt::service::collaborator::StaticBundleResolver;
use abilityrt::want::PacMap;
use abilityrt::want::ParamValue;
use ipc::LocalObject;
use ipc::MessageOption;
use ipc::ObjectRef;
use ipc::Parcel;
use ipc::RemoteStub;
use ipc::stub::default_on_remote_request;

pub const MAIL: &str = "com.example.mail";
pub const PLAYER: &str = "com.example.player";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    pub async fn wait_for(&self, event: &str) {
        let events = self.clone();
        let wanted = event.to_string();
        wait_until(move || events.contains(&wanted)).await;
    }
}

/// Answers pings; stands in for service remotes and callees.
pub struct Echo;

pub const ECHO: &str = "test.Echo";

#[async_trait::async_trait]
impl RemoteStub for Echo {
    fn descriptor(&self) -> &str {
        ECHO
    }

    async fn on_remote_request(&self, code: u32, _data: &mut Parcel, reply: &mut Parcel, _option: MessageOption) -> i32 {
        default_on_remote_request(ECHO, code, reply)
    }
}

/// An ability implementation that logs its callbacks as `Name:event`.
pub struct TestAbility {
    name: String,
    events: Events,
    remote: ObjectRef,
}

impl AbilityLifecycle for TestAbility {
    fn on_start(&self, _want: &Want) {
        self.events.push(format!("{}:start", self.name));
    }

    fn on_foreground(&self, _want: &Want) {
        self.events.push(format!("{}:foreground", self.name));
    }

    fn on_background(&self) {
        self.events.push(format!("{}:background", self.name));
    }

    fn on_new_want(&self, _want: &Want) {
        self.events.push(format!("{}:new-want", self.name));
    }

    fn on_save_state(&self) -> PacMap {
        self.events.push(format!("{}:save", self.name));
        let mut state = PacMap::new();
        state.set("draft", ParamValue::String(format!("{}-draft", self.name)));
        state
    }

    fn on_restore_state(&self, state: &PacMap) {
        let draft = state.get_string("draft").unwrap_or_default();
        self.events.push(format!("{}:restore:{}", self.name, draft));
    }

    fn on_configuration_updated(&self, config: &Configuration) {
        let language = config.get("language").unwrap_or_default();
        self.events.push(format!("{}:configuration:{}", self.name, language));
    }

    fn on_connect(&self, _want: &Want) -> Option<ObjectRef> {
        self.events.push(format!("{}:connect", self.name));
        Some(self.remote.clone())
    }

    fn on_disconnect(&self, _want: &Want) {
        self.events.push(format!("{}:disconnect", self.name));
    }

    fn on_command(&self, _want: &Want, restart: bool, start_id: i32) {
        self.events.push(format!("{}:command:{}:{}", self.name, restart, start_id));
    }

    fn on_ability_result(&self, request_code: i32, result_code: i32, _want: &Want) {
        self.events.push(format!("{}:result:{}:{}", self.name, request_code, result_code));
    }

    fn on_call(&self) -> Option<ObjectRef> {
        self.events.push(format!("{}:call", self.name));
        Some(self.remote.clone())
    }

    fn on_stop(&self) {
        self.events.push(format!("{}:stop", self.name));
    }
}

/// One launched ability.
#[derive(Clone)]
pub struct AppProcess {
    pub pid: i32,
    pub token: ObjectRef,
    pub scheduler: Arc<LocalObject>,
    pub thread: Arc<AbilityThread>,
    pub remote: ObjectRef,
}

/// Launches abilities as in-process threads attached through the manager.
pub struct FakeAppManager {
    manager: OnceLock<Weak<dyn AbilityManager>>,
    events: Events,
    next_pid: AtomicI32,
    processes: Mutex<HashMap<String, AppProcess>>,
    unresponsive: Mutex<HashSet<String>>,
    pub killed: Mutex<Vec<String>>,
    pub loads: Mutex<Vec<String>>,
    this: Weak<FakeAppManager>,
}

impl FakeAppManager {
    fn new(events: Events) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            manager: OnceLock::new(),
            events,
            next_pid: AtomicI32::new(1000),
            processes: Mutex::new(HashMap::new()),
            unresponsive: Mutex::new(HashSet::new()),
            killed: Mutex::new(Vec::new()),
            loads: Mutex::new(Vec::new()),
            this: this.clone(),
        })
    }

    pub fn process(&self, ability: &str) -> Option<AppProcess> {
        self.processes.lock().unwrap().get(ability).cloned()
    }

    pub fn load_count(&self, ability: &str) -> usize {
        self.loads.lock().unwrap().iter().filter(|n| *n == ability).count()
    }

    /// Loads of `ability` are accepted but its process never attaches.
    pub fn never_attach(&self, ability: &str) {
        self.unresponsive.lock().unwrap().insert(ability.to_string());
    }

    async fn launch(self: Arc<Self>, pid: i32, token: ObjectRef, ability: AbilityInfo) {
        let Some(manager) = self.manager.get().and_then(Weak::upgrade) else {
            return;
        };
        let remote = LocalObject::wrap(Echo);
        let lifecycle = Arc::new(TestAbility {
            name: ability.name.clone(),
            events: self.events.clone(),
            remote: remote.clone(),
        });
        let tasks = TaskHandler::new(format!("app-{}", ability.name), 64);
        let thread = AbilityThread::new(token.clone(), manager.clone(), lifecycle, tasks);
        let scheduler = LocalObject::new(Arc::new(AbilitySchedulerStub::new(thread.clone())));
        self.processes.lock().unwrap().insert(
            ability.name.clone(),
            AppProcess { pid, token: token.clone(), scheduler: scheduler.clone(), thread, remote },
        );
        if let Err(e) = manager.attach_ability_thread(scheduler, token).await {
            self.events.push(format!("{}:attach-failed:{}", ability.name, e));
        }
    }
}

#[async_trait::async_trait]
impl AppScheduler for FakeAppManager {
    async fn load_ability(
        &self,
        token: ObjectRef,
        ability: AbilityInfo,
        _app: ApplicationInfo,
        _want: Want,
    ) -> abilityrt::Result<i32> {
        self.loads.lock().unwrap().push(ability.name.clone());
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        if self.unresponsive.lock().unwrap().contains(&ability.name) {
            return Ok(pid);
        }
        let Some(this) = self.this.upgrade() else {
            return Ok(pid);
        };
        tokio::spawn(this.launch(pid, token, ability));
        Ok(pid)
    }

    async fn kill_process(&self, bundle_name: &str) -> abilityrt::Result<()> {
        self.killed.lock().unwrap().push(bundle_name.to_string());
        Ok(())
    }

    async fn kill_process_by_pid(&self, pid: i32) -> abilityrt::Result<()> {
        self.killed.lock().unwrap().push(pid.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub service: Arc<AbilityManagerService>,
    pub manager: Arc<dyn AbilityManager>,
    pub stub: ObjectRef,
    pub bundles: Arc<StaticBundleResolver>,
    pub apps: Arc<FakeAppManager>,
    pub events: Events,
    pub config: Arc<RuntimeConfig>,
}

impl Harness {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_permissions(config: RuntimeConfig, permissions: Arc<dyn PermissionVerifier>) -> Self {
        Self::build(config, Some(permissions))
    }

    fn build(config: RuntimeConfig, permissions: Option<Arc<dyn PermissionVerifier>>) -> Self {
        init_tracing();
        let events = Events::default();
        let apps = FakeAppManager::new(events.clone());

        let bundles = Arc::new(StaticBundleResolver::new());
        let shared = Arc::new(config.clone());
        let mut ctx = ServiceContext::new(config, bundles.clone(), apps.clone());
        if let Some(permissions) = permissions {
            ctx = ctx.with_permissions(permissions);
        }
        let service = AbilityManagerService::new(ctx);

        // Apps reach the manager the way a remote process would.
        let stub = LocalObject::wrap(AbilityManagerStub::new(service.clone()));
        let manager: Arc<dyn AbilityManager> = Arc::new(AbilityManagerProxy::new(stub.clone()));
        let weak: Weak<dyn AbilityManager> = Arc::downgrade(&manager);
        let _ = apps.manager.set(weak);

        Self { service, manager, stub, bundles, apps, events, config: shared }
    }

    pub fn install(&self, bundle: &str, name: &str, ability_type: AbilityType, launch_mode: LaunchMode) {
        self.install_app(bundle, name, ability_type, launch_mode, false);
    }

    pub fn install_app(&self, bundle: &str, name: &str, ability_type: AbilityType, launch_mode: LaunchMode, keep_alive: bool) {
        let ability = AbilityInfo {
            name: name.to_string(),
            bundle_name: bundle.to_string(),
            module_name: "entry".to_string(),
            ability_type,
            extension_type: match ability_type {
                AbilityType::Extension => ExtensionAbilityType::Service,
                _ => ExtensionAbilityType::Unspecified,
            },
            launch_mode,
            visible: true,
        };
        let app = ApplicationInfo {
            name: bundle.rsplit('.').next().unwrap_or(bundle).to_string(),
            bundle_name: bundle.to_string(),
            uid: 20010000 + bundle.len() as i32,
            keep_alive,
            ..ApplicationInfo::default()
        };
        self.bundles.install(ability, app);
    }

    /// A mail app with pages `Inbox` and `Compose`, a `Sync` service, and a
    /// singleton `Viewer`.
    pub fn standard(config: RuntimeConfig) -> Self {
        let harness = Self::new(config);
        harness.install(MAIL, "Inbox", AbilityType::Page, LaunchMode::Standard);
        harness.install(MAIL, "Compose", AbilityType::Page, LaunchMode::Standard);
        harness.install(MAIL, "Viewer", AbilityType::Page, LaunchMode::Singleton);
        harness.install(MAIL, "Sync", AbilityType::Service, LaunchMode::Standard);
        harness
    }

    pub fn want(&self, bundle: &str, name: &str) -> Want {
        Want::new(ElementName::new(bundle, name))
    }

    /// Starts a page and waits until it is in the foreground.
    pub async fn launch(&self, bundle: &str, name: &str) -> anyhow::Result<AppProcess> {
        let before = self.events.count(&format!("{}:foreground", name));
        self.manager.start_ability(self.want(bundle, name), -1, -1).await?;
        let events = self.events.clone();
        let wanted = format!("{}:foreground", name);
        wait_until(move || events.count(&wanted) > before).await;
        self.settle().await;
        self.apps.process(name).ok_or_else(|| anyhow::anyhow!("{} has no process", name))
    }

    pub fn context(&self, process: &AppProcess) -> AbilityContext {
        AbilityContext::new(process.token.clone(), self.manager.clone(), self.config.clone())
    }

    /// Lets queued notifications drain.
    pub async fn settle(&self) {
        self.service.tasks().flush().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.service.tasks().flush().await;
    }
}

/// Client connection callbacks that log `connected:Name:code` and
/// `disconnected:Name:code`.
pub struct TestConnection {
    pub events: Events,
    pub remote: Mutex<Option<ObjectRef>>,
}

impl TestConnection {
    pub fn new(events: &Events) -> Arc<Self> {
        Arc::new(Self { events: events.clone(), remote: Mutex::new(None) })
    }
}

#[async_trait::async_trait]
impl AbilityConnection for TestConnection {
    async fn on_ability_connect_done(&self, element: ElementName, remote: Option<ObjectRef>, result_code: i32) {
        *self.remote.lock().unwrap() = remote;
        self.events.push(format!("connected:{}:{}", element.ability_name, result_code));
    }

    async fn on_ability_disconnect_done(&self, element: ElementName, result_code: i32) {
        self.events.push(format!("disconnected:{}:{}", element.ability_name, result_code));
    }
}

pub struct TestObserver {
    pub events: Events,
}

#[async_trait::async_trait]
impl ConnectionObserver for TestObserver {
    async fn on_extension_connected(&self, data: ConnectionData) {
        self.events.push(format!(
            "observer:connected:{}:{}",
            data.extension_element.ability_name, data.caller_name
        ));
    }

    async fn on_extension_disconnected(&self, data: ConnectionData) {
        self.events.push(format!(
            "observer:disconnected:{}:{}",
            data.extension_element.ability_name, data.caller_name
        ));
    }
}

