//! # Ability Manager Service
//!
//! The in-process implementation of `AbilityManager`. It owns every ability
//! record, keyed by token, and drives them through their lifecycle in answer
//! to requests from clients and reports from application processes.
//!
//! ## Tables
//!
//! - token identity -> record, for every live record;
//! - element -> record, for singleton pages and for service abilities;
//! - connection callback identity -> connection records made through it.
//!
//! A record leaves every table when its termination completes. Nothing here
//! holds a table entry while calling into a record or a collaborator.
//!
//! ## Death handling
//!
//! The service watches every attached scheduler and every connection
//! callback. A dead scheduler leaves its record not ready; resident records
//! are reloaded while the restart policy allows it, the rest are torn down.
//! A dead callback drops every connection made through it.

pub mod collaborator;
mod connect;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use ipc::DeathRecipient;
use ipc::ObjectId;
use ipc::ObjectRef;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::RuntimeConfig;
use crate::connection::ObserverController;
use crate::error;
use crate::error::Error;
use crate::error::Result;
use crate::info::AbilityInfo;
use crate::info::AbilityRunningInfo;
use crate::info::AbilityType;
use crate::info::ApplicationInfo;
use crate::info::Configuration;
use crate::info::ExtensionAbilityType;
use crate::info::ExtensionRunningInfo;
use crate::info::LaunchMode;
use crate::info::StartOptions;
use crate::manager::AbilityManager;
use crate::monitor::MonitorRegistry;
use crate::record::AbilityRecord;
use crate::record::AbilityResult;
use crate::record::CallerRecord;
use crate::record::LifecycleListener;
use crate::record::RecordContext;
use crate::record::SystemAbilityCallerRecord;
use crate::record::TimeoutKind;
use crate::state::AbilityState;
use crate::task::TaskHandler;
use crate::want::ElementName;
use crate::want::PARAM_CALLER_ABILITY_ID;
use crate::want::PacMap;
use crate::want::Want;

use collaborator::AppScheduler;
use collaborator::BundleResolver;
use collaborator::PERMISSION_CLEAN_BACKGROUND_PROCESSES;
use collaborator::PERMISSION_KILL_APP_PROCESSES;
use collaborator::PERMISSION_UPDATE_CONFIGURATION;
use collaborator::PermissionVerifier;

/// Collaborators and shared infrastructure handed to the service.
pub struct ServiceContext {
    pub config: Arc<RuntimeConfig>,
    pub bundles: Arc<dyn BundleResolver>,
    pub app_scheduler: Arc<dyn AppScheduler>,
    pub permissions: Arc<dyn PermissionVerifier>,
    pub tasks: TaskHandler,
    pub monitors: Arc<MonitorRegistry>,
}

impl ServiceContext {
    /// Spawns the service task loop, so it must run inside a tokio runtime.
    /// Every permission is granted until `with_permissions` says otherwise.
    pub fn new(config: RuntimeConfig, bundles: Arc<dyn BundleResolver>, app_scheduler: Arc<dyn AppScheduler>) -> Self {
        let tasks = TaskHandler::new("ability-manager", config.task_queue_capacity);
        Self {
            config: Arc::new(config),
            bundles,
            app_scheduler,
            permissions: Arc::new(collaborator::AllowAll),
            tasks,
            monitors: MonitorRegistry::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionVerifier>) -> Self {
        self.permissions = permissions;
        self
    }
}

pub struct AbilityManagerService {
    ctx: ServiceContext,
    records_ctx: Arc<RecordContext>,
    records: DashMap<ObjectId, Arc<AbilityRecord>>,
    singletons: DashMap<ElementName, Arc<AbilityRecord>>,
    services: DashMap<ElementName, Arc<AbilityRecord>>,
    connections: DashMap<ObjectId, connect::CallbackConnections>,
    observers: ObserverController,
    next_connection_id: AtomicI64,
    top: Mutex<Weak<AbilityRecord>>,
    this: Weak<AbilityManagerService>,
}

impl AbilityManagerService {
    pub fn new(ctx: ServiceContext) -> Arc<Self> {
        let records_ctx = RecordContext::new(
            ctx.config.clone(),
            ctx.tasks.clone(),
            ctx.monitors.clone(),
            ctx.app_scheduler.clone(),
        );
        let service = Arc::new_cyclic(|this: &Weak<Self>| Self {
            ctx,
            records_ctx,
            records: DashMap::new(),
            singletons: DashMap::new(),
            services: DashMap::new(),
            connections: DashMap::new(),
            observers: ObserverController::new(),
            next_connection_id: AtomicI64::new(1),
            top: Mutex::new(Weak::new()),
            this: this.clone(),
        });
        let listener: Weak<dyn LifecycleListener> = service.this.clone();
        service.records_ctx.set_listener(listener);
        info!("ability manager service started");
        service
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.ctx.config
    }

    pub fn tasks(&self) -> &TaskHandler {
        &self.ctx.tasks
    }

    pub fn monitors(&self) -> &Arc<MonitorRegistry> {
        &self.ctx.monitors
    }

    pub fn record_by_token(&self, token: &ObjectRef) -> Option<Arc<AbilityRecord>> {
        self.records.get(&token.object_id()).map(|r| r.value().clone())
    }

    /// Live records for `element`, oldest first.
    pub fn records_for(&self, element: &ElementName) -> Vec<Arc<AbilityRecord>> {
        let mut found: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.value().element().same_ability(element))
            .map(|r| r.value().clone())
            .collect();
        found.sort_by_key(|r| r.id());
        found
    }

    pub fn service_record(&self, element: &ElementName) -> Option<Arc<AbilityRecord>> {
        self.services
            .iter()
            .find(|r| r.key().same_ability(element))
            .map(|r| r.value().clone())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn all_records(&self) -> Vec<Arc<AbilityRecord>> {
        let mut all: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.id());
        all
    }

    fn require_record(&self, token: Option<&ObjectRef>) -> Result<Arc<AbilityRecord>> {
        let Some(token) = token else {
            warn!("request without a token");
            return Err(Error::InvalidValue);
        };
        self.record_by_token(token).ok_or_else(|| {
            warn!(token = %token.object_id(), "unknown ability token");
            Error::InvalidValue
        })
    }

    fn verify(&self, permission: &str) -> Result<()> {
        if self.ctx.permissions.verify(permission) {
            return Ok(());
        }
        warn!(permission, "permission denied");
        Err(Error::PermissionDenied)
    }

    fn resolve(&self, want: &Want) -> Result<(AbilityInfo, ApplicationInfo)> {
        let Some(ability) = self.ctx.bundles.resolve_ability(&want.element) else {
            warn!(element = %want.element, "no such ability");
            return Err(Error::ResolveAbility);
        };
        let Some(app) = self.ctx.bundles.resolve_application(&ability.bundle_name) else {
            warn!(bundle = %ability.bundle_name, "no such application");
            return Err(Error::ResolveApp);
        };
        Ok((ability, app))
    }

    /// Builds the caller entry for `caller`: an ability if the token is one
    /// of ours, a system ability if the want names one.
    fn caller_entry(&self, caller: Option<&ObjectRef>, request_code: i32, want: &Want) -> Option<CallerRecord> {
        let caller = caller?;
        if let Some(record) = self.record_by_token(caller) {
            return Some(CallerRecord::ability(request_code, &record));
        }
        if let Some(src) = want.params.get_string(PARAM_CALLER_ABILITY_ID) {
            return Some(CallerRecord::system_ability(
                request_code,
                SystemAbilityCallerRecord::new(src, caller.clone()),
            ));
        }
        debug!(caller = %caller.object_id(), "unrecognized caller token ignored");
        None
    }

    fn create_record(&self, ability: AbilityInfo, app: ApplicationInfo, want: Want, request_code: i32) -> Arc<AbilityRecord> {
        let record = AbilityRecord::new(self.records_ctx.clone(), ability, Some(app), want, request_code);
        self.records.insert(record.token_id(), record.clone());
        debug!(record = record.id(), element = %record.element(), "record created");
        record
    }

    /// Loads a fresh record, forgetting it again if the load is refused.
    fn load(&self, record: &Arc<AbilityRecord>) -> Result<()> {
        if let Err(e) = record.load_ability() {
            self.forget(record);
            return Err(e);
        }
        Ok(())
    }

    fn forget(&self, record: &Arc<AbilityRecord>) {
        self.records.remove(&record.token_id());
        let element = record.element();
        self.singletons.remove_if(&element, |_, r| Arc::ptr_eq(r, record));
        self.services.remove_if(&element, |_, r| Arc::ptr_eq(r, record));
        let mut top = self.top.lock().unwrap_or_else(PoisonError::into_inner);
        if top.upgrade().is_some_and(|t| Arc::ptr_eq(&t, record)) {
            *top = Weak::new();
        }
    }

    // ------------------------------------------------------------------------
    // Start
    // ------------------------------------------------------------------------

    fn start(&self, want: Want, caller: Option<&ObjectRef>, request_code: i32) -> Result<()> {
        let (ability, app) = self.resolve(&want)?;
        let caller = self.caller_entry(caller, request_code, &want);
        match ability.ability_type {
            AbilityType::Unknown => {
                warn!(element = %want.element, "ability of unknown type");
                Err(Error::UnknownAbilityType)
            }
            AbilityType::Service | AbilityType::Extension => self.start_service(ability, app, want).map(|_| ()),
            AbilityType::Page | AbilityType::Data => self.start_page(ability, app, want, caller, request_code),
        }
    }

    fn start_page(
        &self,
        ability: AbilityInfo,
        app: ApplicationInfo,
        want: Want,
        caller: Option<CallerRecord>,
        request_code: i32,
    ) -> Result<()> {
        let element = ability.element();
        if ability.launch_mode == LaunchMode::Singleton {
            let existing = self.singletons.get(&element).map(|r| r.value().clone());
            if let Some(record) = existing.filter(|r| !r.is_terminating()) {
                debug!(record = record.id(), "reusing singleton");
                record.set_want(want);
                if let Some(caller) = caller {
                    record.add_caller(caller);
                }
                if record.is_ready() {
                    record.foreground(0);
                }
                return Ok(());
            }
        }

        let singleton = ability.launch_mode == LaunchMode::Singleton;
        let record = self.create_record(ability, app, want, request_code);
        if let Some(caller) = caller {
            record.add_caller(caller);
        }
        if singleton {
            self.singletons.insert(element, record.clone());
        }
        self.load(&record)
    }

    /// Returns the service record for the want, creating and loading it if
    /// needed. `started` marks an explicit start as opposed to a bind.
    fn service_for(&self, ability: AbilityInfo, app: ApplicationInfo, want: Want, started: bool) -> Result<Arc<AbilityRecord>> {
        let element = ability.element();
        let existing = self.services.get(&element).map(|r| r.value().clone());
        if let Some(record) = existing.filter(|r| !r.is_terminating()) {
            if started {
                record.set_want(want);
                record.request_start();
                if record.is_ready() && record.state() == AbilityState::Inactive {
                    self.run_pending_commands(&record);
                }
            }
            return Ok(record);
        }
        let record = self.create_record(ability, app, want, -1);
        if started {
            record.request_start();
        }
        self.services.insert(element, record.clone());
        self.load(&record)?;
        Ok(record)
    }

    fn start_service(&self, ability: AbilityInfo, app: ApplicationInfo, want: Want) -> Result<Arc<AbilityRecord>> {
        self.service_for(ability, app, want, true)
    }

    fn run_pending_commands(&self, record: &Arc<AbilityRecord>) {
        for _ in 0..record.take_pending_commands() {
            record.command_ability();
        }
    }

    fn stop_service(&self, want: &Want) -> Result<()> {
        let Some(record) = self.service_record(&want.element) else {
            warn!(element = %want.element, "stop of a service that is not running");
            return Err(Error::ResolveAbility);
        };
        if !record.ability_info().ability_type.is_service_like() {
            return Err(Error::TargetNotService);
        }
        record.clear_started();
        if record.connection_count() > 0 {
            debug!(record = record.id(), "service still bound, kept running");
            return Ok(());
        }
        self.terminate_record(&record);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle reports
    // ------------------------------------------------------------------------

    fn attach(&self, scheduler: ObjectRef, token: &ObjectRef) -> Result<()> {
        let record = self.require_record(Some(token))?;
        if record.is_terminating() {
            warn!(record = record.id(), "attach to a terminating record");
            return Err(Error::InvalidState);
        }
        self.watch_scheduler(&record, &scheduler);
        record.set_scheduler(Some(scheduler));
        info!(record = record.id(), element = %record.element(), "ability attached");
        self.on_attached(&record);
        Ok(())
    }

    fn on_attached(&self, record: &Arc<AbilityRecord>) {
        if record.recovery_info() && record.saved_state().is_some() {
            record.restore_ability_state();
            record.update_recovery_info(false);
        }
        if record.ability_info().ability_type.is_service_like() {
            record.inactivate();
            return;
        }
        if self.has_pending_calls(record) {
            record.call_request();
        }
        record.foreground(0);
    }

    fn watch_scheduler(&self, record: &Arc<AbilityRecord>, scheduler: &ObjectRef) {
        let recipient: Arc<dyn DeathRecipient> = Arc::new(SchedulerDeath {
            service: self.this.clone(),
            record: Arc::downgrade(record),
        });
        if !scheduler.add_death_recipient(recipient) {
            warn!(record = record.id(), "scheduler already dead");
        }
    }

    fn transition_done(&self, token: &ObjectRef, state: i32, saved_state: PacMap) -> Result<()> {
        let record = self.require_record(Some(token))?;
        let Some(target) = AbilityState::from_i32(state) else {
            warn!(record = record.id(), state, "unknown state reported");
            return Err(Error::InvalidValue);
        };
        if !saved_state.is_empty() {
            record.set_saved_state(saved_state);
        }
        record.complete_transition(target)?;

        match target {
            AbilityState::Inactive if record.ability_info().ability_type.is_service_like() => {
                self.run_pending_commands(&record);
                if record.is_command_in_flight() {
                    record.defer_connect();
                } else {
                    self.connect_pending(&record);
                }
            }
            AbilityState::Foreground => {
                *self.top.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(&record);
                record.send_result();
            }
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------------

    /// Terminates `record`; its tables, callers, and connections are cleaned
    /// up once termination completes.
    fn terminate_record(&self, record: &Arc<AbilityRecord>) -> bool {
        let service = self.this.clone();
        let target = Arc::downgrade(record);
        record.terminate(move || {
            if let (Some(service), Some(record)) = (service.upgrade(), target.upgrade()) {
                service.cleanup(&record);
            }
        })
    }

    fn cleanup(&self, record: &Arc<AbilityRecord>) {
        self.forget(record);
        for connection in record.connections() {
            record.remove_connect_record(Some(&connection));
            self.drop_connection(&connection);
            connection.abort();
            self.post_disconnect_done(connection, error::ERR_OK);
        }
        record.send_result_to_callers();
        debug!(record = record.id(), "record cleaned up");
    }

    fn terminate_with_result(&self, token: Option<&ObjectRef>, result_code: i32, want: Option<Want>) -> Result<()> {
        let record = self.require_record(token)?;
        if let Some(want) = want {
            record.save_result_to_callers(result_code, &want);
        }
        if !self.terminate_record(&record) {
            debug!(record = record.id(), "terminate already in progress");
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Death and timeouts
    // ------------------------------------------------------------------------

    fn on_scheduler_died(&self, record: Arc<AbilityRecord>) {
        if !self.records.contains_key(&record.token_id()) {
            return;
        }
        record.on_scheduler_died();
        self.drop_dead_connections(&record);

        if record.is_terminating() {
            if let Err(e) = record.complete_transition(AbilityState::Initial) {
                warn!(record = record.id(), error = %e, "could not finish termination");
            }
            return;
        }
        if record.is_resident() || record.is_launcher_root() {
            record.set_restarting(true, record.restart_count() - 1);
            if record.can_restart_resident() && record.can_restart_root_launcher() {
                info!(record = record.id(), element = %record.element(), "restarting ability");
                record.set_ability_state(AbilityState::Initial);
                if record.is_started() {
                    record.request_start();
                }
                if record.load_ability().is_ok() {
                    return;
                }
            }
            warn!(record = record.id(), element = %record.element(), "restart not allowed, ability dropped");
        }
        self.terminate_record(&record);
    }

    /// Takes down every connection to a record whose process is gone and
    /// tells each client.
    fn drop_dead_connections(&self, record: &Arc<AbilityRecord>) {
        for connection in record.connections() {
            record.remove_connect_record(Some(&connection));
            self.drop_connection(&connection);
            connection.abort();
            self.post_disconnect_done(connection, error::ERR_DEAD_OBJECT);
        }
    }

    fn recover(&self, token: &ObjectRef, reason: i32) {
        let Some(record) = self.record_by_token(token) else {
            warn!(token = %token.object_id(), "recovery of an unknown ability");
            return;
        };
        if !record.is_recovery_enabled() {
            warn!(record = record.id(), "recovery requested but not enabled");
            return;
        }
        let Some(app) = record.app_info().cloned() else {
            return;
        };
        info!(record = record.id(), reason, "recovering ability");

        record.save_ability_state();
        self.forget(&record);
        record.on_scheduler_died();
        self.drop_dead_connections(&record);
        record.token().invalidate();

        let relaunched = self.create_record(record.ability_info().clone(), app, record.want(), record.request_code());
        relaunched.enable_recovery();
        relaunched.update_recovery_info(true);
        if let Some(state) = record.saved_state() {
            relaunched.set_saved_state(state);
        }
        for caller in record.take_callers() {
            relaunched.add_caller(caller);
        }
        if relaunched.ability_info().launch_mode == LaunchMode::Singleton {
            self.singletons.insert(relaunched.element(), relaunched.clone());
        }

        let pid = record.pid();
        let app_scheduler = self.ctx.app_scheduler.clone();
        let service = self.this.clone();
        let submitted = self.ctx.tasks.submit(format!("recover#{}", record.id()), async move {
            if pid > 0 {
                if let Err(e) = app_scheduler.kill_process_by_pid(pid).await {
                    warn!(pid, error = %e, "failed to kill process for recovery");
                }
            }
            if let Some(service) = service.upgrade() {
                if let Err(e) = service.load(&relaunched) {
                    warn!(record = relaunched.id(), error = %e, "recovery relaunch failed");
                }
            }
        });
        if let Err(e) = submitted {
            warn!(error = %e, "recovery dropped");
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    fn extension_infos(&self, upper_limit: i32) -> Vec<ExtensionRunningInfo> {
        let limit = usize::try_from(upper_limit).unwrap_or(0);
        let mut services: Vec<_> = self.services.iter().map(|r| r.value().clone()).collect();
        services.sort_by_key(|r| r.id());
        services
            .into_iter()
            .take(limit)
            .map(|record| {
                let running = record.running_info();
                let mut client_packages: Vec<String> = record
                    .connections()
                    .iter()
                    .map(|c| c.connection_data().caller_name)
                    .filter(|name| !name.is_empty())
                    .collect();
                client_packages.dedup();
                ExtensionRunningInfo {
                    element: running.element,
                    pid: running.pid,
                    uid: running.uid,
                    process_name: running.process_name,
                    start_time: running.start_time,
                    client_packages,
                    extension_type: record.ability_info().extension_type,
                }
            })
            .collect()
    }

    fn dump(&self, args: &str) -> Vec<String> {
        let filter = args.trim();
        let mut lines = vec![format!(
            "AbilityManagerService records={} services={} callbacks={} observers={}",
            self.records.len(),
            self.services.len(),
            self.connections.len(),
            self.observers.len(),
        )];
        for record in self.all_records() {
            if !filter.is_empty() && filter != "-a" && !record.element().uri().contains(filter) {
                continue;
            }
            lines.extend(record.dump());
        }
        lines
    }
}

struct SchedulerDeath {
    service: Weak<AbilityManagerService>,
    record: Weak<AbilityRecord>,
}

impl DeathRecipient for SchedulerDeath {
    fn on_remote_died(&self, object: ObjectId) {
        let (Some(service), Some(record)) = (self.service.upgrade(), self.record.upgrade()) else {
            return;
        };
        // A reattached record has a new scheduler; only the current one counts.
        if record.scheduler_object().is_some_and(|s| s.object_id() != object) {
            return;
        }
        warn!(record = record.id(), %object, "scheduler died");
        service.on_scheduler_died(record);
    }
}

impl LifecycleListener for AbilityManagerService {
    fn on_lifecycle_timeout(&self, record: Arc<AbilityRecord>, kind: TimeoutKind) {
        match kind {
            TimeoutKind::Load if !record.is_ready() => {
                warn!(record = record.id(), element = %record.element(), "ability never attached");
                for connection in record.connections() {
                    record.remove_connect_record(Some(&connection));
                    self.drop_connection(&connection);
                    connection.abort();
                    self.post_connect_failed(connection, error::LOAD_ABILITY_TIMEOUT);
                }
                self.terminate_record(&record);
            }
            TimeoutKind::Foreground => {
                debug!(record = record.id(), state = %record.state(), "foreground timed out");
            }
            TimeoutKind::Command if record.is_ready() => {
                warn!(record = record.id(), element = %record.element(), "start command never acknowledged");
                if record.take_deferred_connect() {
                    self.connect_pending(&record);
                }
            }
            _ => {}
        }
    }
}

#[async_trait::async_trait]
impl AbilityManager for AbilityManagerService {
    async fn terminate_ability(&self, token: Option<ObjectRef>, result_code: i32, want: Option<Want>) -> Result<()> {
        self.terminate_with_result(token.as_ref(), result_code, want)
    }

    async fn close_ability(&self, token: Option<ObjectRef>, result_code: i32, want: Option<Want>) -> Result<()> {
        self.terminate_with_result(token.as_ref(), result_code, want)
    }

    async fn attach_ability_thread(&self, scheduler: ObjectRef, token: ObjectRef) -> Result<()> {
        self.attach(scheduler, &token)
    }

    async fn ability_transition_done(&self, token: ObjectRef, state: i32, saved_state: PacMap) -> Result<()> {
        self.transition_done(&token, state, saved_state)
    }

    async fn schedule_connect_ability_done(&self, token: Option<ObjectRef>, remote: Option<ObjectRef>) -> Result<()> {
        let record = self.require_record(token.as_ref())?;
        self.connect_done(&record, remote);
        Ok(())
    }

    async fn schedule_disconnect_ability_done(&self, token: ObjectRef) -> Result<()> {
        let record = self.require_record(Some(&token))?;
        self.disconnect_done(&record);
        Ok(())
    }

    async fn terminate_ability_by_caller(&self, caller: Option<ObjectRef>, request_code: i32) -> Result<()> {
        let caller = self.require_record(caller.as_ref())?;
        let targets: Vec<_> = self
            .all_records()
            .into_iter()
            .filter(|r| r.is_called_by(caller.id(), request_code))
            .collect();
        if targets.is_empty() {
            warn!(caller = caller.id(), request_code, "no ability started with this request code");
            return Err(Error::ResolveAbility);
        }
        for target in targets {
            self.terminate_record(&target);
        }
        Ok(())
    }

    async fn minimize_ability(&self, token: ObjectRef, from_user: bool) -> Result<()> {
        let record = self.require_record(Some(&token))?;
        debug!(record = record.id(), from_user, "minimize");
        record.background();
        Ok(())
    }

    async fn schedule_command_ability_done(&self, token: ObjectRef) -> Result<()> {
        let record = self.require_record(Some(&token))?;
        record.complete_command()?;
        debug!(record = record.id(), "command done");
        if record.take_deferred_connect() {
            self.connect_pending(&record);
        }
        Ok(())
    }

    async fn schedule_recover_ability(&self, token: ObjectRef, reason: i32) {
        self.recover(&token, reason);
    }

    async fn enable_recover_ability(&self, token: ObjectRef) {
        match self.record_by_token(&token) {
            Some(record) => record.enable_recovery(),
            None => warn!(token = %token.object_id(), "recovery enable for an unknown ability"),
        }
    }

    async fn send_result_to_ability(&self, request_code: i32, result_code: i32, want: Want) -> Result<()> {
        let Some(record) = self.records_for(&want.element).into_iter().rev().find(|r| !r.is_terminating()) else {
            warn!(element = %want.element, "result for an ability that is not running");
            return Err(Error::ResolveAbility);
        };
        record.set_result(AbilityResult { request_code, result_code, want });
        record.send_result();
        Ok(())
    }

    async fn move_ability_to_background(&self, token: Option<ObjectRef>) -> Result<()> {
        let record = self.require_record(token.as_ref())?;
        record.background();
        Ok(())
    }

    async fn call_request_done(&self, token: ObjectRef, callee: ObjectRef) -> Result<()> {
        let record = self.require_record(Some(&token))?;
        self.call_done(&record, callee);
        Ok(())
    }

    async fn start_ability(&self, want: Want, user_id: i32, request_code: i32) -> Result<()> {
        debug!(element = %want.element, user_id, request_code, "start ability");
        self.start(want, None, request_code)
    }

    async fn start_ability_with_caller(
        &self,
        want: Want,
        caller: Option<ObjectRef>,
        user_id: i32,
        request_code: i32,
    ) -> Result<()> {
        debug!(element = %want.element, user_id, request_code, "start ability for caller");
        self.start(want, caller.as_ref(), request_code)
    }

    async fn start_ability_with_options(
        &self,
        want: Want,
        options: StartOptions,
        caller: Option<ObjectRef>,
        user_id: i32,
        request_code: i32,
    ) -> Result<()> {
        debug!(element = %want.element, display = options.display_id, mode = options.window_mode, user_id, "start ability with options");
        self.start(want, caller.as_ref(), request_code)
    }

    async fn start_extension_ability(
        &self,
        want: Want,
        _caller: Option<ObjectRef>,
        user_id: i32,
        extension_type: ExtensionAbilityType,
    ) -> Result<()> {
        debug!(element = %want.element, user_id, ?extension_type, "start extension");
        let (ability, app) = self.resolve(&want)?;
        if !ability.ability_type.is_service_like() {
            return Err(Error::TargetNotService);
        }
        self.start_service(ability, app, want).map(|_| ())
    }

    async fn stop_extension_ability(
        &self,
        want: Want,
        _caller: Option<ObjectRef>,
        user_id: i32,
        extension_type: ExtensionAbilityType,
    ) -> Result<()> {
        debug!(element = %want.element, user_id, ?extension_type, "stop extension");
        self.stop_service(&want)
    }

    async fn stop_service_ability(&self, want: Want, user_id: i32, _token: Option<ObjectRef>) -> Result<()> {
        debug!(element = %want.element, user_id, "stop service");
        self.stop_service(&want)
    }

    async fn start_ability_by_call(
        &self,
        want: Want,
        connection: ObjectRef,
        caller: Option<ObjectRef>,
        account_id: i32,
    ) -> Result<()> {
        debug!(element = %want.element, account_id, "start ability by call");
        self.start_by_call(want, connection, caller)
    }

    async fn release_call(&self, connection: ObjectRef, element: ElementName) -> Result<()> {
        self.release(&connection, &element)
    }

    async fn connect_ability(
        &self,
        want: Want,
        connection: ObjectRef,
        caller: Option<ObjectRef>,
        user_id: i32,
    ) -> Result<()> {
        debug!(element = %want.element, user_id, "connect ability");
        self.connect(want, connection, caller)
    }

    async fn disconnect_ability(&self, connection: ObjectRef) -> Result<()> {
        self.disconnect(&connection)
    }

    async fn register_connection_observer(&self, observer: ObjectRef) -> Result<()> {
        if !self.observers.add(observer) {
            debug!("connection observer already registered");
        }
        Ok(())
    }

    async fn unregister_connection_observer(&self, observer: ObjectRef) -> Result<()> {
        if !self.observers.remove(&observer) {
            warn!(observer = %observer.object_id(), "unregister of an unknown connection observer");
            return Err(Error::InvalidValue);
        }
        Ok(())
    }

    async fn get_ability_running_info(&self) -> Result<Vec<AbilityRunningInfo>> {
        Ok(self.all_records().iter().map(|r| r.running_info()).collect())
    }

    async fn get_extension_running_info(&self, upper_limit: i32) -> Result<Vec<ExtensionRunningInfo>> {
        Ok(self.extension_infos(upper_limit))
    }

    async fn get_top_ability(&self) -> Result<ElementName> {
        let top = self.top.lock().unwrap_or_else(PoisonError::into_inner).upgrade();
        Ok(top.map(|r| r.element()).unwrap_or_default())
    }

    async fn get_ability_token_by_callee(&self, callee: ObjectRef) -> Result<Option<ObjectRef>> {
        Ok(self.token_by_callee(&callee))
    }

    async fn dump_state(&self, args: String) -> Result<Vec<String>> {
        Ok(self.dump(&args))
    }

    async fn kill_process(&self, bundle_name: String) -> Result<()> {
        self.verify(PERMISSION_CLEAN_BACKGROUND_PROCESSES)?;
        if bundle_name.is_empty() {
            return Err(Error::InvalidValue);
        }
        info!(bundle = %bundle_name, "killing process");
        self.ctx.app_scheduler.kill_process(&bundle_name).await
    }

    async fn force_exit_app(&self, pid: i32, reason: i32) -> Result<()> {
        self.verify(PERMISSION_KILL_APP_PROCESSES)?;
        if pid <= 0 {
            return Err(Error::InvalidValue);
        }
        info!(pid, reason, "force exit");
        self.ctx.app_scheduler.kill_process_by_pid(pid).await
    }

    async fn update_configuration(&self, config: Configuration) -> Result<()> {
        self.verify(PERMISSION_UPDATE_CONFIGURATION)?;
        for record in self.all_records() {
            if record.is_ready() {
                record.update_configuration(config.clone());
            }
        }
        Ok(())
    }

    async fn delegator_do_ability_foreground(&self, token: ObjectRef) -> Result<()> {
        self.require_record(Some(&token))?.foreground(0);
        Ok(())
    }

    async fn delegator_do_ability_background(&self, token: ObjectRef) -> Result<()> {
        self.require_record(Some(&token))?.background();
        Ok(())
    }

    async fn do_ability_foreground(&self, token: ObjectRef, flag: u32) -> Result<()> {
        self.require_record(Some(&token))?.foreground(flag);
        Ok(())
    }

    async fn do_ability_background(&self, token: ObjectRef, flag: u32) -> Result<()> {
        debug!(flag, "do ability background");
        self.require_record(Some(&token))?.background();
        Ok(())
    }
}

impl std::fmt::Debug for AbilityManagerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilityManagerService")
            .field("records", &self.records.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}
