//! # Connection Registry
//!
//! The client-side index of outstanding service connections, so that an
//! explicit disconnect and a death notification can both find the same
//! connection by id.
//!
//! ## Invariants
//!
//! - An id is never handed out while a connection holding it is live. Ids
//!   come from a counter that wraps to 0 past `i32::MAX`; on wraparound, ids
//!   still in use are skipped.
//! - `remove` releases a connection at most once. Removing an unknown id is
//!   a no-op, so several cleanup paths may race on the same id.
//! - The registry lock is never held while a connection runs its own code.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use ipc::ObjectRef;
use ipc::same_object;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::want::Want;

/// A client-held connection.
pub trait ServiceConnection: Send + Sync + 'static {
    fn set_connection_id(&self, id: i64);

    fn connection_id(&self) -> i64;

    /// The callback object handed to the service, while still held.
    fn connection_object(&self) -> Option<ObjectRef>;

    /// Drops any remote reference the connection holds.
    fn release(&self);
}

/// What a connection was made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionKey {
    pub id: i64,
    pub want: Want,
    pub account_id: i32,
}

pub const DEFAULT_ACCOUNT_ID: i32 = -1;

const MAX_CONNECTION_ID: i64 = i32::MAX as i64;

struct Entries {
    next_id: i64,
    connections: BTreeMap<i64, (ConnectionKey, Arc<dyn ServiceConnection>)>,
}

impl Entries {
    fn allocate(&mut self) -> Result<i64> {
        if self.connections.len() as i64 > MAX_CONNECTION_ID {
            return Err(Error::LimitReached);
        }
        loop {
            let id = self.next_id;
            self.next_id = if id >= MAX_CONNECTION_ID { 0 } else { id + 1 };
            if !self.connections.contains_key(&id) {
                return Ok(id);
            }
            debug!(id, "connection id still live, skipping");
        }
    }
}

pub struct ConnectionRegistry {
    inner: Mutex<Entries>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// A registry whose next id is `first_id`.
    pub fn starting_at(first_id: i64) -> Self {
        Self {
            inner: Mutex::new(Entries {
                next_id: first_id.clamp(0, MAX_CONNECTION_ID),
                connections: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `connection` and stamps it with its new id.
    pub fn insert(&self, connection: Option<Arc<dyn ServiceConnection>>, want: Want, account_id: i32) -> Result<i64> {
        let Some(connection) = connection else {
            error!(element = %want.element, "insert of a null connection");
            return Err(Error::InvalidValue);
        };
        let id = {
            let mut entries = self.lock();
            let id = entries.allocate()?;
            let key = ConnectionKey { id, want, account_id };
            entries.connections.insert(id, (key, connection.clone()));
            id
        };
        connection.set_connection_id(id);
        debug!(id, "connection registered");
        Ok(id)
    }

    /// Releases and forgets a connection. Unknown ids are ignored.
    pub fn remove(&self, id: i64) -> bool {
        let removed = self.lock().connections.remove(&id);
        match removed {
            Some((_, connection)) => {
                connection.release();
                debug!(id, "connection removed");
                true
            }
            None => {
                warn!(id, "remove of an unknown connection");
                false
            }
        }
    }

    pub fn find_by_id(&self, id: i64) -> Option<Arc<dyn ServiceConnection>> {
        self.lock().connections.get(&id).map(|(_, c)| c.clone())
    }

    /// First connection made to the same ability for the same account.
    pub fn find_by_want(&self, want: &Want, account_id: i32) -> Option<(i64, Arc<dyn ServiceConnection>)> {
        self.lock()
            .connections
            .values()
            .find(|(key, _)| key.want.element == want.element && key.account_id == account_id)
            .map(|(key, c)| (key.id, c.clone()))
    }

    pub fn find_by_object(&self, object: &ObjectRef) -> Option<i64> {
        self.lock()
            .connections
            .values()
            .find(|(_, c)| c.connection_object().is_some_and(|o| same_object(&o, object)))
            .map(|(key, _)| key.id)
    }

    pub fn key(&self, id: i64) -> Option<ConnectionKey> {
        self.lock().connections.get(&id).map(|(key, _)| key.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().connections.is_empty()
    }

    /// Releases every connection.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut self.lock().connections);
        for (_, (_, connection)) in drained {
            connection.release();
        }
    }
}
