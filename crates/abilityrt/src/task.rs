//! # Task Handler
//!
//! A named, bounded, single-consumer event loop. Work that must not run on an
//! IPC dispatch path (scheduler calls, result delivery, app callbacks) is
//! posted here and runs in submission order.
//!
//! ## Invariants
//!
//! - Tasks run one at a time, in the order `submit` accepted them.
//! - A full queue rejects with `Error::LimitReached`; nothing is buffered
//!   beyond the configured capacity.
//! - A delayed task is keyed by name. Re-arming a name replaces the pending
//!   task; `cancel` removes it before it fires.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;

struct Job {
    name: String,
    task: BoxFuture<'static, ()>,
}

struct Inner {
    name: String,
    tx: mpsc::Sender<Job>,
    delayed: DashMap<String, (u64, JoinHandle<()>)>,
    generation: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for entry in self.delayed.iter() {
            entry.value().1.abort();
        }
    }
}

/// Cheap to clone; every clone feeds the same loop.
#[derive(Clone)]
pub struct TaskHandler {
    inner: Arc<Inner>,
}

impl TaskHandler {
    /// Spawns the loop. Must be called inside a tokio runtime.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let loop_name = name.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                trace!(handler = %loop_name, task = %job.name, "running task");
                job.task.await;
            }
            debug!(handler = %loop_name, "task handler stopped");
        });
        Self {
            inner: Arc::new(Inner {
                name,
                tx,
                delayed: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queues `task` behind everything already submitted.
    pub fn submit<F>(&self, name: impl Into<String>, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job = Job { name: name.into(), task: task.boxed() };
        match self.inner.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(handler = %self.inner.name, task = %job.name, "task queue full");
                Err(Error::LimitReached)
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(handler = %self.inner.name, task = %job.name, "task handler closed");
                Err(Error::InnerError)
            }
        }
    }

    /// Queues `task` once `delay` has elapsed. A pending task with the same
    /// name is replaced.
    pub fn submit_delayed<F>(&self, name: impl Into<String>, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handler = self.clone();
        let key = name.clone();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let spawn_timer = move || {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                handler.inner.delayed.remove_if(&key, |_, (g, _)| *g == generation);
                if let Err(e) = handler.submit(key.clone(), task) {
                    warn!(handler = %handler.inner.name, task = %key, error = %e, "delayed task dropped");
                }
            })
        };
        // The slot stays locked until the timer is filed, so a timer that
        // fires at once still finds its own entry to remove.
        match self.inner.delayed.entry(name) {
            Entry::Occupied(mut slot) => {
                let (_, old) = slot.insert((generation, spawn_timer()));
                old.abort();
            }
            Entry::Vacant(slot) => {
                slot.insert((generation, spawn_timer()));
            }
        }
    }

    /// Cancels a delayed task that has not fired yet.
    pub fn cancel(&self, name: &str) -> bool {
        match self.inner.delayed.remove(name) {
            Some((_, (_, handle))) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn has_delayed(&self, name: &str) -> bool {
        self.inner.delayed.contains_key(name)
    }

    /// Resolves once every task submitted before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel::<()>();
        let job = Job {
            name: "flush".to_string(),
            task: async move {
                let _ = tx.send(());
            }
            .boxed(),
        };
        if self.inner.tx.send(job).await.is_err() {
            return;
        }
        let _ = rx.await;
    }
}

impl std::fmt::Debug for TaskHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandler").field("name", &self.inner.name).finish()
    }
}
