//! # Ability Record
//!
//! One running ability instance: its lifecycle state, the scheduler that
//! drives its process, the connections bound to it, the callers waiting for
//! its result, and its restart and recovery bookkeeping.
//!
//! ## Concurrency
//!
//! Each record serializes its own mutation behind one mutex. The lock covers
//! state checks and updates only. It is released before a scheduler call is
//! posted, before a monitor is notified, and before a callback runs.
//! Scheduler calls go through the shared `TaskHandler`, so the calls posted
//! for one record reach its process in the order they were made.
//!
//! ## Invariants
//!
//! - The state changes only through the operations below. A lifecycle
//!   request issued before a scheduler is attached, or from a state that does
//!   not allow it, is dropped and logged.
//! - `terminate` runs its callback exactly once.
//! - The connection list never holds the same record twice.
//! - Each caller entry receives at most one result; `send_result_to_callers`
//!   drains the list in insertion order.

pub mod caller;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use ipc::ObjectId;
use ipc::ObjectRef;
use ipc::RemoteObject;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::RuntimeConfig;
use crate::connection::ConnectionRecord;
use crate::error::Error;
use crate::error::Result;
use crate::info::AbilityInfo;
use crate::info::AbilityRunningInfo;
use crate::info::AbilityType;
use crate::info::ApplicationInfo;
use crate::info::Configuration;
use crate::info::LifecycleStateInfo;
use crate::monitor::MonitorRegistry;
use crate::monitor::StateChange;
use crate::scheduler::AbilityScheduler;
use crate::scheduler::AbilitySchedulerProxy;
use crate::scheduler::SchedulerRequest;
use crate::service::collaborator::AppScheduler;
use crate::state::AbilityState;
use crate::task::TaskHandler;
use crate::token::Token;
use crate::want::ElementName;
use crate::want::PARAM_RECOVERY_RESTART;
use crate::want::PacMap;
use crate::want::ParamValue;
use crate::want::Want;

pub use caller::AbilityResult;
pub use caller::CallerKind;
pub use caller::CallerRecord;
pub use caller::SystemAbilityCallerRecord;

/// Which lifecycle deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Load,
    Foreground,
    Background,
    Terminate,
    Command,
}

impl TimeoutKind {
    pub fn name(self) -> &'static str {
        match self {
            TimeoutKind::Load => "load",
            TimeoutKind::Foreground => "foreground",
            TimeoutKind::Background => "background",
            TimeoutKind::Terminate => "terminate",
            TimeoutKind::Command => "command",
        }
    }
}

/// Told about lifecycle deadlines after the record applied its own
/// reaction.
pub trait LifecycleListener: Send + Sync + 'static {
    fn on_lifecycle_timeout(&self, record: Arc<AbilityRecord>, kind: TimeoutKind);
}

/// What every record of one service shares.
pub struct RecordContext {
    pub config: Arc<RuntimeConfig>,
    pub tasks: TaskHandler,
    pub monitors: Arc<MonitorRegistry>,
    pub app_scheduler: Arc<dyn AppScheduler>,
    next_record_id: AtomicI64,
    listener: OnceLock<Weak<dyn LifecycleListener>>,
}

impl RecordContext {
    pub fn new(
        config: Arc<RuntimeConfig>,
        tasks: TaskHandler,
        monitors: Arc<MonitorRegistry>,
        app_scheduler: Arc<dyn AppScheduler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            tasks,
            monitors,
            app_scheduler,
            next_record_id: AtomicI64::new(1),
            listener: OnceLock::new(),
        })
    }

    pub fn next_record_id(&self) -> i64 {
        self.next_record_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns `false` if a listener is already set.
    pub fn set_listener(&self, listener: Weak<dyn LifecycleListener>) -> bool {
        self.listener.set(listener).is_ok()
    }

    fn listener(&self) -> Option<Arc<dyn LifecycleListener>> {
        self.listener.get().and_then(Weak::upgrade)
    }
}

struct SchedulerBinding {
    object: ObjectRef,
    scheduler: Arc<dyn AbilityScheduler>,
}

struct Restart {
    count: i32,
    last: Option<Instant>,
    restarting: bool,
}

type TerminateCallback = Box<dyn FnOnce() + Send + 'static>;

struct RecordState {
    state: AbilityState,
    want: Want,
    scheduler: Option<SchedulerBinding>,
    pid: i32,
    connections: Vec<Arc<ConnectionRecord>>,
    callers: Vec<CallerRecord>,
    result: Option<AbilityResult>,
    restart: Restart,
    recovery_enabled: bool,
    saved_state: Option<PacMap>,
    terminating: bool,
    terminated: bool,
    on_terminated: Option<TerminateCallback>,
    conn_remote: Option<ObjectRef>,
    callee: Option<ObjectRef>,
    start_id: i32,
    started: bool,
    pending_commands: u32,
    commands_in_flight: u32,
    connect_after_command: bool,
    last_config: Option<Configuration>,
}

pub struct AbilityRecord {
    id: i64,
    token: Arc<Token>,
    ability_info: AbilityInfo,
    app_info: Option<ApplicationInfo>,
    request_code: i32,
    launcher_root: bool,
    start_time: i64,
    ctx: Arc<RecordContext>,
    inner: Mutex<RecordState>,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

impl AbilityRecord {
    pub fn new(
        ctx: Arc<RecordContext>,
        ability_info: AbilityInfo,
        app_info: Option<ApplicationInfo>,
        want: Want,
        request_code: i32,
    ) -> Arc<Self> {
        let id = ctx.next_record_id();
        let launcher_root = want.is_home_intent() && app_info.as_ref().is_some_and(|a| a.is_launcher_app);
        let count = if launcher_root {
            ctx.config.root_launcher_restart_max
        } else {
            ctx.config.resident_restart_max
        };
        Arc::new(Self {
            id,
            token: Token::new(id),
            ability_info,
            app_info,
            request_code,
            launcher_root,
            start_time: now_millis(),
            ctx,
            inner: Mutex::new(RecordState {
                state: AbilityState::Initial,
                want,
                scheduler: None,
                pid: 0,
                connections: Vec::new(),
                callers: Vec::new(),
                result: None,
                restart: Restart { count, last: None, restarting: false },
                recovery_enabled: false,
                saved_state: None,
                terminating: false,
                terminated: false,
                on_terminated: None,
                conn_remote: None,
                callee: None,
                start_id: 0,
                started: false,
                pending_commands: 0,
                commands_in_flight: 0,
                connect_after_command: false,
                last_config: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn token(&self) -> &Arc<Token> {
        &self.token
    }

    /// Identity of the token, the key the service files this record under.
    pub fn token_id(&self) -> ObjectId {
        self.token.object_id()
    }

    pub fn token_object(&self) -> ObjectRef {
        self.token.as_object()
    }

    pub fn ability_info(&self) -> &AbilityInfo {
        &self.ability_info
    }

    pub fn app_info(&self) -> Option<&ApplicationInfo> {
        self.app_info.as_ref()
    }

    pub fn element(&self) -> ElementName {
        self.ability_info.element()
    }

    pub fn request_code(&self) -> i32 {
        self.request_code
    }

    pub fn is_launcher_root(&self) -> bool {
        self.launcher_root
    }

    pub fn is_resident(&self) -> bool {
        self.app_info.as_ref().is_some_and(|a| a.keep_alive)
    }

    pub fn state(&self) -> AbilityState {
        self.lock().state
    }

    pub fn want(&self) -> Want {
        self.lock().want.clone()
    }

    pub fn set_want(&self, want: Want) {
        self.lock().want = want;
    }

    pub fn pid(&self) -> i32 {
        self.lock().pid
    }

    pub fn set_pid(&self, pid: i32) {
        self.lock().pid = pid;
    }

    /// A scheduler is attached.
    pub fn is_ready(&self) -> bool {
        self.lock().scheduler.is_some()
    }

    pub fn is_terminating(&self) -> bool {
        let st = self.lock();
        st.terminating || st.terminated
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    // ------------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------------

    /// Binds the scheduler reached through `object`. `None` detaches.
    pub fn set_scheduler(&self, object: Option<ObjectRef>) {
        match object {
            Some(object) => {
                let proxy = Arc::new(AbilitySchedulerProxy::new(object.clone()));
                self.attach_scheduler(object, proxy);
            }
            None => {
                self.lock().scheduler = None;
                debug!(record = self.id, "scheduler detached");
            }
        }
    }

    /// Binds an in-process scheduler. `object` is its identity: the handle
    /// death recipients are registered on.
    pub fn attach_scheduler(&self, object: ObjectRef, scheduler: Arc<dyn AbilityScheduler>) {
        self.lock().scheduler = Some(SchedulerBinding { object, scheduler });
        self.ctx.tasks.cancel(&self.timeout_name(TimeoutKind::Load));
        debug!(record = self.id, element = %self.element(), "scheduler attached");
    }

    pub fn scheduler_object(&self) -> Option<ObjectRef> {
        self.lock().scheduler.as_ref().map(|b| b.object.clone())
    }

    fn scheduler(&self) -> Option<Arc<dyn AbilityScheduler>> {
        self.lock().scheduler.as_ref().map(|b| b.scheduler.clone())
    }

    /// Queues `request` for this record's process.
    fn post_scheduler(&self, request: SchedulerRequest) -> bool {
        let Some(scheduler) = self.scheduler() else {
            warn!(record = self.id, code = request.code(), "no scheduler, request dropped");
            return false;
        };
        let name = format!("scheduler#{}:{}", self.id, request.code());
        match self.ctx.tasks.submit(name, async move { request.dispatch(scheduler.as_ref()).await }) {
            Ok(()) => true,
            Err(e) => {
                warn!(record = self.id, error = %e, "failed to post scheduler request");
                false
            }
        }
    }

    /// The process hosting this record died.
    pub fn on_scheduler_died(&self) {
        {
            let mut st = self.lock();
            st.scheduler = None;
            st.conn_remote = None;
            st.callee = None;
            st.commands_in_flight = 0;
            warn!(record = self.id, element = %self.element(), state = %st.state, "ability process died");
        }
        self.cancel_timeout(TimeoutKind::Command);
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    fn timeout_name(&self, kind: TimeoutKind) -> String {
        format!("{}#{}", kind.name(), self.id)
    }

    fn arm_timeout(self: &Arc<Self>, kind: TimeoutKind, delay: Duration) {
        let weak = Arc::downgrade(self);
        self.ctx.tasks.submit_delayed(self.timeout_name(kind), delay, async move {
            if let Some(record) = weak.upgrade() {
                record.on_timeout(kind);
            }
        });
    }

    fn cancel_timeout(&self, kind: TimeoutKind) {
        self.ctx.tasks.cancel(&self.timeout_name(kind));
    }

    fn on_timeout(self: &Arc<Self>, kind: TimeoutKind) {
        warn!(record = self.id, element = %self.element(), kind = kind.name(), "lifecycle timeout");
        match kind {
            TimeoutKind::Load => {}
            TimeoutKind::Foreground => {
                let changed = self.replace_state_if(AbilityState::Foregrounding, AbilityState::ForegroundFailed);
                if changed {
                    self.notify_state(AbilityState::ForegroundFailed);
                }
            }
            TimeoutKind::Background => {
                let changed = self.replace_state_if(AbilityState::Backgrounding, AbilityState::Background);
                if changed {
                    self.notify_state(AbilityState::Background);
                }
            }
            TimeoutKind::Terminate => self.finish_terminate(),
            TimeoutKind::Command => self.lock().commands_in_flight = 0,
        }
        if let Some(listener) = self.ctx.listener() {
            listener.on_lifecycle_timeout(self.clone(), kind);
        }
    }

    fn replace_state_if(&self, from: AbilityState, to: AbilityState) -> bool {
        let mut st = self.lock();
        if st.state != from {
            return false;
        }
        st.state = to;
        true
    }

    fn notify_state(&self, state: AbilityState) {
        self.ctx.monitors.notify(&StateChange {
            record_id: self.id,
            element: self.element(),
            state,
            token: self.token_object(),
        });
    }

    /// Asks the app manager to bring up this ability's process.
    pub fn load_ability(self: &Arc<Self>) -> Result<()> {
        if self.ability_info.ability_type == AbilityType::Unknown {
            error!(record = self.id, element = %self.element(), "cannot load an ability of unknown type");
            return Err(Error::UnknownAbilityType);
        }
        let Some(app) = self.app_info.clone() else {
            warn!(record = self.id, element = %self.element(), "no application info, load skipped");
            return Err(Error::InvalidValue);
        };
        if !self.can_restart_root_launcher() || !self.can_restart_resident() {
            warn!(record = self.id, element = %self.element(), "restart not allowed yet");
            return Err(Error::RestartNotAllowed);
        }

        info!(record = self.id, element = %self.element(), "loading ability");
        self.arm_timeout(TimeoutKind::Load, self.ctx.config.load_timeout);
        let app_scheduler = self.ctx.app_scheduler.clone();
        let token = self.token_object();
        let ability = self.ability_info.clone();
        let want = self.want();
        let weak = Arc::downgrade(self);
        let submitted = self.ctx.tasks.submit(format!("load#{}", self.id), async move {
            match app_scheduler.load_ability(token, ability, app, want).await {
                Ok(pid) => {
                    if let Some(record) = weak.upgrade() {
                        record.set_pid(pid);
                    }
                }
                Err(e) => warn!(error = %e, "app manager failed to load ability"),
            }
        });
        if let Err(e) = submitted {
            self.cancel_timeout(TimeoutKind::Load);
            return Err(e);
        }
        Ok(())
    }

    /// Moves the record into `to` if it is ready, not terminating, and in
    /// one of `from`. Returns the transaction to post.
    fn begin_transition(&self, op: &str, from: &[AbilityState], to: AbilityState) -> Option<Want> {
        let want = {
            let mut st = self.lock();
            if st.scheduler.is_none() {
                warn!(record = self.id, op, state = %st.state, "not ready, lifecycle request dropped");
                return None;
            }
            if st.terminating || st.terminated {
                warn!(record = self.id, op, "terminating, lifecycle request dropped");
                return None;
            }
            if !from.is_empty() && !from.contains(&st.state) {
                warn!(record = self.id, op, state = %st.state, "lifecycle request dropped in this state");
                return None;
            }
            debug!(record = self.id, op, from = %st.state, to = %to, "lifecycle transition");
            st.state = to;
            st.want.clone()
        };
        self.notify_state(to);
        Some(want)
    }

    pub fn activate(&self) {
        let Some(want) = self.begin_transition(
            "activate",
            &[AbilityState::Initial, AbilityState::Inactive],
            AbilityState::Activating,
        ) else {
            return;
        };
        let info = LifecycleStateInfo::new(AbilityState::Active);
        self.post_scheduler(SchedulerRequest::AbilityTransaction { want, info });
    }

    pub fn inactivate(&self) {
        let Some(want) = self.begin_transition("inactivate", &[], AbilityState::Inactivating) else {
            return;
        };
        let info = LifecycleStateInfo::new(AbilityState::Inactive);
        self.post_scheduler(SchedulerRequest::AbilityTransaction { want, info });
    }

    pub fn foreground(self: &Arc<Self>, scene_flag: u32) {
        let Some(want) = self.begin_transition(
            "foreground",
            &[AbilityState::Initial, AbilityState::Inactive, AbilityState::Background],
            AbilityState::Foregrounding,
        ) else {
            return;
        };
        let mut info = LifecycleStateInfo::new(AbilityState::Foreground);
        info.scene_flag = scene_flag;
        self.arm_timeout(TimeoutKind::Foreground, self.ctx.config.foreground_timeout);
        self.post_scheduler(SchedulerRequest::AbilityTransaction { want, info });
    }

    pub fn background(self: &Arc<Self>) {
        let Some(want) =
            self.begin_transition("background", &[AbilityState::Foreground], AbilityState::Backgrounding)
        else {
            return;
        };
        if self.is_recovery_enabled() {
            self.post_scheduler(SchedulerRequest::SaveState);
        }
        self.arm_timeout(TimeoutKind::Background, self.ctx.config.background_timeout);
        let info = LifecycleStateInfo::new(AbilityState::Background);
        self.post_scheduler(SchedulerRequest::AbilityTransaction { want, info });
    }

    /// Starts termination. `callback` runs once the record is gone. Returns
    /// `false` (and drops `callback`) if termination already started.
    pub fn terminate<F>(self: &Arc<Self>, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let (ready, want) = {
            let mut st = self.lock();
            if st.terminating || st.terminated {
                debug!(record = self.id, "already terminating");
                return false;
            }
            st.terminating = true;
            st.state = AbilityState::Terminating;
            st.on_terminated = Some(Box::new(callback));
            (st.scheduler.is_some(), st.want.clone())
        };
        info!(record = self.id, element = %self.element(), ready, "terminating ability");
        self.notify_state(AbilityState::Terminating);
        for kind in [TimeoutKind::Load, TimeoutKind::Foreground, TimeoutKind::Background] {
            self.cancel_timeout(kind);
        }

        if !ready {
            self.finish_terminate();
            return true;
        }
        self.arm_timeout(TimeoutKind::Terminate, self.ctx.config.terminate_timeout);
        let info = LifecycleStateInfo::new(AbilityState::Initial);
        if !self.post_scheduler(SchedulerRequest::AbilityTransaction { want, info }) {
            self.cancel_timeout(TimeoutKind::Terminate);
            self.finish_terminate();
        }
        true
    }

    fn finish_terminate(&self) {
        let callback = {
            let mut st = self.lock();
            if st.terminated {
                return;
            }
            st.terminated = true;
            st.terminating = false;
            st.state = AbilityState::Initial;
            st.scheduler = None;
            st.on_terminated.take()
        };
        self.cancel_timeout(TimeoutKind::Terminate);
        self.token.invalidate();
        info!(record = self.id, element = %self.element(), "ability terminated");
        self.notify_state(AbilityState::Initial);
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Applies the app's report that it reached `target`.
    pub fn complete_transition(&self, target: AbilityState) -> Result<()> {
        let current = self.state();
        let allowed = match (current, target) {
            (AbilityState::Activating, AbilityState::Active) => true,
            (AbilityState::Inactivating, AbilityState::Inactive) => true,
            (AbilityState::Foregrounding, AbilityState::Foreground)
            | (AbilityState::Foregrounding, AbilityState::ForegroundFailed)
            | (AbilityState::Foregrounding, AbilityState::ForegroundInvalidMode) => true,
            (AbilityState::Backgrounding, AbilityState::Background) => true,
            (AbilityState::Terminating, AbilityState::Initial) => {
                self.finish_terminate();
                return Ok(());
            }
            _ => false,
        };
        if !allowed {
            warn!(record = self.id, from = %current, to = %target, "unexpected transition report");
            return Err(Error::InvalidValue);
        }
        if !self.replace_state_if(current, target) {
            warn!(record = self.id, to = %target, "state changed while completing transition");
            return Err(Error::InvalidValue);
        }
        match current {
            AbilityState::Foregrounding => self.cancel_timeout(TimeoutKind::Foreground),
            AbilityState::Backgrounding => self.cancel_timeout(TimeoutKind::Background),
            _ => {}
        }
        debug!(record = self.id, state = %target, "transition complete");
        self.notify_state(target);
        Ok(())
    }

    /// Administrative override.
    pub fn set_ability_state(&self, state: AbilityState) {
        self.lock().state = state;
        self.notify_state(state);
    }

    // ------------------------------------------------------------------------
    // Service operations
    // ------------------------------------------------------------------------

    pub fn connect_ability(&self) -> bool {
        let want = self.want();
        self.post_scheduler(SchedulerRequest::Connect { want })
    }

    pub fn disconnect_ability(&self) -> bool {
        let want = self.want();
        self.post_scheduler(SchedulerRequest::Disconnect { want })
    }

    /// Delivers the start command. Restarted abilities get `restart = true`.
    /// The command stays in flight until the ability acknowledges it or the
    /// command timeout fires.
    pub fn command_ability(self: &Arc<Self>) -> bool {
        let (want, restart, start_id) = {
            let mut st = self.lock();
            st.start_id += 1;
            st.commands_in_flight += 1;
            (st.want.clone(), st.restart.restarting, st.start_id)
        };
        self.arm_timeout(TimeoutKind::Command, self.ctx.config.command_timeout);
        if self.post_scheduler(SchedulerRequest::Command { want, restart, start_id }) {
            return true;
        }
        let remaining = {
            let mut st = self.lock();
            st.commands_in_flight = st.commands_in_flight.saturating_sub(1);
            st.commands_in_flight
        };
        if remaining == 0 {
            self.cancel_timeout(TimeoutKind::Command);
        }
        false
    }

    /// The ability finished `on_command`. Only an inactive or active ability
    /// can report one.
    pub fn complete_command(&self) -> Result<()> {
        let remaining = {
            let mut st = self.lock();
            if !matches!(st.state, AbilityState::Inactive | AbilityState::Active) {
                warn!(record = self.id, state = %st.state, "command done in a state that takes no commands");
                return Err(Error::InvalidConnectionState);
            }
            st.commands_in_flight = st.commands_in_flight.saturating_sub(1);
            st.commands_in_flight
        };
        if remaining == 0 {
            self.cancel_timeout(TimeoutKind::Command);
        }
        Ok(())
    }

    pub fn is_command_in_flight(&self) -> bool {
        self.lock().commands_in_flight > 0
    }

    /// Marks a connect that waits for the start command to finish.
    pub fn defer_connect(&self) {
        self.lock().connect_after_command = true;
    }

    /// Takes the deferred connect once no command is in flight.
    pub fn take_deferred_connect(&self) -> bool {
        let mut st = self.lock();
        if st.commands_in_flight > 0 {
            return false;
        }
        std::mem::take(&mut st.connect_after_command)
    }

    /// Records a start request for a service. The command is delivered once
    /// the service is inactive.
    pub fn request_start(&self) {
        let mut st = self.lock();
        st.started = true;
        st.pending_commands += 1;
    }

    /// Started explicitly, as opposed to only bound by connections.
    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn clear_started(&self) {
        let mut st = self.lock();
        st.started = false;
        st.pending_commands = 0;
    }

    pub fn take_pending_commands(&self) -> u32 {
        std::mem::take(&mut self.lock().pending_commands)
    }

    pub fn save_ability_state(&self) -> bool {
        self.post_scheduler(SchedulerRequest::SaveState)
    }

    /// Pushes the saved state, if any, back to the ability.
    pub fn restore_ability_state(&self) -> bool {
        let Some(state) = self.saved_state() else {
            return false;
        };
        self.post_scheduler(SchedulerRequest::RestoreState { state })
    }

    pub fn set_saved_state(&self, state: PacMap) {
        self.lock().saved_state = Some(state);
    }

    pub fn saved_state(&self) -> Option<PacMap> {
        self.lock().saved_state.clone()
    }

    pub fn update_configuration(&self, config: Configuration) -> bool {
        self.lock().last_config = Some(config.clone());
        self.post_scheduler(SchedulerRequest::UpdateConfiguration { config })
    }

    pub fn configuration(&self) -> Option<Configuration> {
        self.lock().last_config.clone()
    }

    /// Asks the ability to publish its callee.
    pub fn call_request(&self) -> bool {
        self.post_scheduler(SchedulerRequest::Call)
    }

    pub fn set_conn_remote(&self, remote: Option<ObjectRef>) {
        self.lock().conn_remote = remote;
    }

    pub fn conn_remote(&self) -> Option<ObjectRef> {
        self.lock().conn_remote.clone()
    }

    pub fn set_callee(&self, callee: Option<ObjectRef>) {
        self.lock().callee = callee;
    }

    pub fn callee(&self) -> Option<ObjectRef> {
        self.lock().callee.clone()
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    /// Adds `connection` unless it is null or already listed.
    pub fn add_connect_record(&self, connection: Option<&Arc<ConnectionRecord>>) {
        let Some(connection) = connection else {
            debug!(record = self.id, "null connection ignored");
            return;
        };
        let mut st = self.lock();
        if st.connections.iter().any(|c| Arc::ptr_eq(c, connection)) {
            return;
        }
        st.connections.push(connection.clone());
    }

    /// Removes `connection` if listed. Null is ignored.
    pub fn remove_connect_record(&self, connection: Option<&Arc<ConnectionRecord>>) {
        let Some(connection) = connection else {
            debug!(record = self.id, "null connection ignored");
            return;
        };
        self.lock().connections.retain(|c| !Arc::ptr_eq(c, connection));
    }

    pub fn connections(&self) -> Vec<Arc<ConnectionRecord>> {
        self.lock().connections.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    // ------------------------------------------------------------------------
    // Callers and results
    // ------------------------------------------------------------------------

    /// Registers a caller. An ability that calls again with the same request
    /// code replaces its earlier entry.
    pub fn add_caller(&self, caller: CallerRecord) {
        let mut st = self.lock();
        if let Some(ability) = caller.caller_ability() {
            let code = caller.request_code();
            st.callers
                .retain(|c| !(c.request_code() == code && c.is_ability(ability.id())));
        }
        st.callers.push(caller);
    }

    /// Whether the ability with record id `caller_id` started this one with
    /// `request_code`.
    pub fn is_called_by(&self, caller_id: i64, request_code: i32) -> bool {
        self.lock()
            .callers
            .iter()
            .any(|c| c.request_code() == request_code && c.is_ability(caller_id))
    }

    pub fn caller_count(&self) -> usize {
        self.lock().callers.len()
    }

    /// Moves every caller entry out, system ability callers included.
    pub fn take_callers(&self) -> Vec<CallerRecord> {
        std::mem::take(&mut self.lock().callers)
    }

    /// Stores the result on every calling ability. System ability callers
    /// are sent the result right away.
    pub fn save_result_to_callers(&self, result_code: i32, want: &Want) {
        let mut direct = Vec::new();
        {
            let st = self.lock();
            for caller in &st.callers {
                match caller.kind() {
                    CallerKind::Ability(weak) => match weak.upgrade() {
                        Some(ability) => {
                            direct.push((Some(ability), None, caller.request_code()));
                        }
                        None => debug!(record = self.id, "caller already gone"),
                    },
                    CallerKind::SystemAbility(sa) => {
                        direct.push((None, Some(sa.clone()), caller.request_code()));
                    }
                }
            }
        }
        for (ability, system, request_code) in direct {
            if let Some(ability) = ability {
                ability.set_result(AbilityResult { request_code, result_code, want: want.clone() });
            }
            if let Some(system) = system {
                let want = want.clone();
                let submitted = self.ctx.tasks.submit(format!("sa-result#{}", self.id), async move {
                    if let Err(e) = system.send_result(request_code, result_code, want).await {
                        warn!(src = %system.src_ability_id(), error = %e, "failed to send result to system ability");
                    }
                });
                if let Err(e) = submitted {
                    warn!(record = self.id, error = %e, "system ability result dropped");
                }
            }
        }
    }

    /// Drains the caller list, delivering each stored result once.
    pub fn send_result_to_callers(&self) {
        let callers = std::mem::take(&mut self.lock().callers);
        for caller in callers {
            if let Some(ability) = caller.caller_ability() {
                ability.send_result();
            }
        }
    }

    pub fn set_result(&self, result: AbilityResult) {
        self.lock().result = Some(result);
    }

    pub fn result(&self) -> Option<AbilityResult> {
        self.lock().result.clone()
    }

    /// Delivers the stored result through the scheduler and clears it.
    /// Without a result, or without a scheduler, nothing happens.
    pub fn send_result(&self) -> bool {
        let result = {
            let mut st = self.lock();
            if st.scheduler.is_none() || st.result.is_none() {
                return false;
            }
            st.result.take()
        };
        let Some(result) = result else {
            return false;
        };
        self.post_scheduler(SchedulerRequest::SendResult {
            request_code: result.request_code,
            result_code: result.result_code,
            want: result.want,
        })
    }

    // ------------------------------------------------------------------------
    // Restart and recovery
    // ------------------------------------------------------------------------

    /// Records a restart attempt (`is_restart`) or its end. A restarting root
    /// launcher spends one attempt; a restarting resident takes
    /// `can_restart_count`. Ending a restart refills the budget.
    pub fn set_restarting(&self, is_restart: bool, can_restart_count: i32) {
        let mut st = self.lock();
        st.restart.restarting = is_restart;
        if self.launcher_root {
            if is_restart {
                st.restart.count -= 1;
                st.restart.last = Some(Instant::now());
            } else {
                st.restart.count = self.ctx.config.root_launcher_restart_max;
            }
        } else if self.is_resident() {
            if is_restart {
                st.restart.count = can_restart_count;
                st.restart.last = Some(Instant::now());
            } else {
                st.restart.count = self.ctx.config.resident_restart_max;
            }
        }
        debug!(record = self.id, is_restart, count = st.restart.count, "restart bookkeeping");
    }

    pub fn is_restarting(&self) -> bool {
        self.lock().restart.restarting
    }

    pub fn restart_count(&self) -> i32 {
        self.lock().restart.count
    }

    pub fn set_restart_time(&self, at: Instant) {
        self.lock().restart.last = Some(at);
    }

    pub fn last_restart(&self) -> Option<Instant> {
        self.lock().restart.last
    }

    /// Bounded attempts per time window: once the budget is spent, another
    /// restart is allowed after `restart_interval`.
    pub fn can_restart_resident(&self) -> bool {
        let st = self.lock();
        if !(st.restart.restarting && st.restart.count < 0) {
            return true;
        }
        match st.restart.last {
            Some(last) => last.elapsed() >= self.ctx.config.restart_interval,
            None => true,
        }
    }

    pub fn can_restart_root_launcher(&self) -> bool {
        let st = self.lock();
        !(self.launcher_root && st.restart.restarting && st.restart.count < 0)
    }

    pub fn enable_recovery(&self) {
        self.lock().recovery_enabled = true;
    }

    pub fn is_recovery_enabled(&self) -> bool {
        self.lock().recovery_enabled
    }

    /// Marks (or unmarks) the want as a recovery relaunch.
    pub fn update_recovery_info(&self, relaunched: bool) {
        let mut st = self.lock();
        if relaunched {
            st.want.params.set(PARAM_RECOVERY_RESTART, ParamValue::Bool(true));
        } else {
            st.want.params.remove(PARAM_RECOVERY_RESTART);
        }
    }

    pub fn recovery_info(&self) -> bool {
        self.lock().want.is_recovery_restart()
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn running_info(&self) -> AbilityRunningInfo {
        let st = self.lock();
        AbilityRunningInfo {
            element: self.element(),
            pid: st.pid,
            uid: self.app_info.as_ref().map(|a| a.uid).unwrap_or_default(),
            process_name: self.ability_info.bundle_name.clone(),
            start_time: self.start_time,
            ability_state: st.state,
        }
    }

    pub fn dump(&self) -> Vec<String> {
        let lines = {
            let st = self.lock();
            vec![
                format!("AbilityRecord #{} {}", self.id, self.element()),
                format!(
                    "  type={} state={} ready={} pid={}",
                    self.ability_info.ability_type.name(),
                    st.state,
                    st.scheduler.is_some(),
                    st.pid
                ),
                format!(
                    "  callers={} connections={} restart_count={} restarting={} recovery={}",
                    st.callers.len(),
                    st.connections.len(),
                    st.restart.count,
                    st.restart.restarting,
                    st.recovery_enabled
                ),
            ]
        };
        let mut lines = lines;
        for connection in self.connections() {
            lines.push(format!("    {}", connection.dump()));
        }
        lines
    }
}

impl std::fmt::Debug for AbilityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilityRecord")
            .field("id", &self.id)
            .field("element", &self.element())
            .field("state", &self.state())
            .finish()
    }
}
