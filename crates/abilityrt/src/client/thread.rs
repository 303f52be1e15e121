//! # Ability Thread
//!
//! The app-side end of an ability's scheduler. Requests from the manager are
//! posted to the app's main task loop, handed to the `AbilityLifecycle`, and
//! then reported back to the manager.
//!
//! ## Invariants
//!
//! - Scheduler calls never run lifecycle code inline; they only enqueue.
//! - Callbacks for one ability run in the order the manager scheduled them.
//! - State saved by `schedule_save_ability_state` travels with the next
//!   background report.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use ipc::LocalObject;
use ipc::ObjectRef;
use tracing::debug;
use tracing::warn;

use super::lifecycle::AbilityLifecycle;
use crate::error::Result;
use crate::info::Configuration;
use crate::info::LifecycleStateInfo;
use crate::manager::AbilityManager;
use crate::scheduler::AbilityScheduler;
use crate::scheduler::AbilitySchedulerStub;
use crate::state::AbilityState;
use crate::task::TaskHandler;
use crate::want::PacMap;
use crate::want::Want;

#[derive(Default)]
struct ThreadState {
    started: bool,
    saved: Option<PacMap>,
}

pub struct AbilityThread {
    token: ObjectRef,
    manager: Arc<dyn AbilityManager>,
    lifecycle: Arc<dyn AbilityLifecycle>,
    tasks: TaskHandler,
    state: Mutex<ThreadState>,
    this: Weak<AbilityThread>,
}

impl AbilityThread {
    pub fn new(
        token: ObjectRef,
        manager: Arc<dyn AbilityManager>,
        lifecycle: Arc<dyn AbilityLifecycle>,
        tasks: TaskHandler,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            token,
            manager,
            lifecycle,
            tasks,
            state: Mutex::new(ThreadState::default()),
            this: this.clone(),
        })
    }

    pub fn token(&self) -> &ObjectRef {
        &self.token
    }

    /// Publishes this thread as a scheduler object and attaches it to the
    /// manager. Returns the published object.
    pub async fn attach(self: &Arc<Self>) -> Result<ObjectRef> {
        let scheduler: Arc<dyn AbilityScheduler> = self.clone();
        let object = LocalObject::wrap(AbilitySchedulerStub::new(scheduler));
        self.manager.attach_ability_thread(object.clone(), self.token.clone()).await?;
        Ok(object)
    }

    fn lock(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post<F, Fut>(&self, name: &str, work: F)
    where
        F: FnOnce(Arc<AbilityThread>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(thread) = self.this.upgrade() else {
            return;
        };
        if let Err(e) = self.tasks.submit(name, work(thread)) {
            warn!(task = name, error = %e, "ability callback dropped");
        }
    }

    /// Runs `on_start` the first time the ability comes up.
    fn ensure_started(&self, want: &Want) -> bool {
        let first = {
            let mut st = self.lock();
            !std::mem::replace(&mut st.started, true)
        };
        if first {
            self.lifecycle.on_start(want);
        }
        first
    }

    async fn report(&self, state: AbilityState, saved: PacMap) {
        if let Err(e) = self
            .manager
            .ability_transition_done(self.token.clone(), state.as_i32(), saved)
            .await
        {
            warn!(state = %state, error = %e, "transition report rejected");
        }
    }

    async fn run_transaction(&self, want: Want, info: LifecycleStateInfo) {
        debug!(target_state = %info.state, "ability transaction");
        match info.state {
            AbilityState::Initial => {
                self.lifecycle.on_stop();
                self.lock().started = false;
                self.report(AbilityState::Initial, PacMap::new()).await;
            }
            AbilityState::Active | AbilityState::Inactive => {
                if !self.ensure_started(&want) && info.is_new_want {
                    self.lifecycle.on_new_want(&want);
                }
                self.report(info.state, PacMap::new()).await;
            }
            AbilityState::Foreground => {
                if !self.ensure_started(&want) && info.is_new_want {
                    self.lifecycle.on_new_want(&want);
                }
                self.lifecycle.on_foreground(&want);
                self.report(AbilityState::Foreground, PacMap::new()).await;
            }
            AbilityState::Background => {
                self.lifecycle.on_background();
                let saved = self.lock().saved.take().unwrap_or_default();
                self.report(AbilityState::Background, saved).await;
            }
            other => warn!(state = %other, "transaction to a transitional state ignored"),
        }
    }
}

#[async_trait::async_trait]
impl AbilityScheduler for AbilityThread {
    async fn schedule_ability_transaction(&self, want: Want, info: LifecycleStateInfo) {
        self.post("transaction", move |thread| async move { thread.run_transaction(want, info).await });
    }

    async fn send_result(&self, request_code: i32, result_code: i32, want: Want) {
        self.post("result", move |thread| async move {
            thread.lifecycle.on_ability_result(request_code, result_code, &want);
        });
    }

    async fn schedule_connect_ability(&self, want: Want) {
        self.post("connect", move |thread| async move {
            let remote = thread.lifecycle.on_connect(&want);
            let token = thread.token.clone();
            if let Err(e) = thread.manager.schedule_connect_ability_done(Some(token), remote).await {
                warn!(error = %e, "connect report rejected");
            }
        });
    }

    async fn schedule_disconnect_ability(&self, want: Want) {
        self.post("disconnect", move |thread| async move {
            thread.lifecycle.on_disconnect(&want);
            if let Err(e) = thread.manager.schedule_disconnect_ability_done(thread.token.clone()).await {
                warn!(error = %e, "disconnect report rejected");
            }
        });
    }

    async fn schedule_command_ability(&self, want: Want, restart: bool, start_id: i32) {
        self.post("command", move |thread| async move {
            thread.lifecycle.on_command(&want, restart, start_id);
            if let Err(e) = thread.manager.schedule_command_ability_done(thread.token.clone()).await {
                warn!(error = %e, "command report rejected");
            }
        });
    }

    async fn schedule_save_ability_state(&self) {
        self.post("save-state", move |thread| async move {
            let saved = thread.lifecycle.on_save_state();
            thread.lock().saved = Some(saved);
        });
    }

    async fn schedule_restore_ability_state(&self, state: PacMap) {
        self.post("restore-state", move |thread| async move {
            thread.lifecycle.on_restore_state(&state);
        });
    }

    async fn schedule_update_configuration(&self, config: Configuration) {
        self.post("configuration", move |thread| async move {
            thread.lifecycle.on_configuration_updated(&config);
        });
    }

    async fn schedule_call(&self) {
        self.post("call", move |thread| async move {
            let Some(callee) = thread.lifecycle.on_call() else {
                warn!("ability published no callee");
                return;
            };
            if let Err(e) = thread.manager.call_request_done(thread.token.clone(), callee).await {
                warn!(error = %e, "call report rejected");
            }
        });
    }
}
