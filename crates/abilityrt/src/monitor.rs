//! # Ability Monitors
//!
//! Lets a test delegator wait until some ability reaches some state.
//!
//! ## Invariants
//!
//! - A waiter resolves exactly once: with the matching state change, with
//!   `Error::Timeout` when its deadline passes, or with `Error::Cancelled`.
//! - A timed-out or dropped waiter is removed from the registry, so a later
//!   state change never wakes a stale waiter.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use ipc::ObjectRef;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Error;
use crate::error::Result;
use crate::state::AbilityState;
use crate::want::ElementName;

/// Selects abilities by name, optionally restricted to one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityMonitor {
    pub ability_name: String,
    pub module_name: Option<String>,
}

impl AbilityMonitor {
    pub fn new(ability_name: impl Into<String>) -> Self {
        Self { ability_name: ability_name.into(), module_name: None }
    }

    pub fn in_module(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = Some(module_name.into());
        self
    }

    pub fn matches(&self, element: &ElementName) -> bool {
        if element.ability_name != self.ability_name {
            return false;
        }
        match &self.module_name {
            Some(module) => *module == element.module_name,
            None => true,
        }
    }
}

/// A record entering a state.
#[derive(Clone)]
pub struct StateChange {
    pub record_id: i64,
    pub element: ElementName,
    pub state: AbilityState,
    pub token: ObjectRef,
}

impl std::fmt::Debug for StateChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateChange")
            .field("record_id", &self.record_id)
            .field("element", &self.element)
            .field("state", &self.state)
            .field("token", &self.token.object_id())
            .finish()
    }
}

struct Waiter {
    id: u64,
    monitor: AbilityMonitor,
    state: AbilityState,
    tx: oneshot::Sender<StateChange>,
}

#[derive(Default)]
pub struct MonitorRegistry {
    next_id: AtomicU64,
    waiters: Mutex<Vec<Waiter>>,
}

impl MonitorRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a waiter now. Resolve it with `PendingWait::wait`.
    pub fn register(self: &Arc<Self>, monitor: AbilityMonitor, state: AbilityState) -> PendingWait {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock().push(Waiter { id, monitor, state, tx });
        PendingWait { id, rx: Some(rx), registry: Arc::downgrade(self) }
    }

    /// Waits for the next matching ability to reach `state`. `None` waits
    /// indefinitely.
    pub async fn wait_for(
        self: &Arc<Self>,
        monitor: AbilityMonitor,
        state: AbilityState,
        timeout: Option<Duration>,
    ) -> Result<StateChange> {
        self.register(monitor, state).wait(timeout).await
    }

    /// Drops one waiter; it resolves with `Error::Cancelled`.
    pub fn cancel(&self, id: u64) -> bool {
        let mut waiters = self.lock();
        let before = waiters.len();
        waiters.retain(|w| w.id != id);
        waiters.len() != before
    }

    pub fn cancel_all(&self) {
        self.lock().clear();
    }

    /// Resolves every waiter that matches `change`.
    pub fn notify(&self, change: &StateChange) {
        let matched: Vec<Waiter> = {
            let mut waiters = self.lock();
            let (matched, rest): (Vec<Waiter>, Vec<Waiter>) = std::mem::take(&mut *waiters)
                .into_iter()
                .partition(|w| w.state == change.state && w.monitor.matches(&change.element));
            *waiters = rest;
            matched
        };
        for waiter in matched {
            debug!(waiter = waiter.id, element = %change.element, state = %change.state, "monitor matched");
            let _ = waiter.tx.send(change.clone());
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Waiter>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered waiter. Dropping it unregisters it.
pub struct PendingWait {
    id: u64,
    rx: Option<oneshot::Receiver<StateChange>>,
    registry: Weak<MonitorRegistry>,
}

impl PendingWait {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<StateChange> {
        let Some(rx) = self.rx.take() else {
            return Err(Error::Cancelled);
        };
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    debug!(waiter = self.id, "monitor wait timed out");
                    return Err(Error::Timeout);
                }
            },
            None => rx.await,
        };
        outcome.map_err(|_| Error::Cancelled)
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.cancel(self.id);
        }
    }
}
