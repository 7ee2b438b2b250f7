//! Async requests awaiting a worker result, and the tables results are published into.

use crate::error::{Result, SonorityError};
use crate::worker::WorkHandle;
use crate::world::EntityId;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Results published by worker jobs, keyed by request.
///
/// The lock is held only for one insert or lookup, never across a decode.
pub struct ResultTable<K, V> {
    inner: Arc<Mutex<HashMap<K, Result<V>>>>,
}

impl<K, V> Clone for ResultTable<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Default for ResultTable<K, V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash, V> ResultTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Result<V>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` unless a result for `key` is already present.
    ///
    /// Returns whether the value was stored.
    pub fn publish(&self, key: K, value: Result<V>) -> bool {
        let mut table = self.lock();
        if table.contains_key(&key) {
            return false;
        }
        table.insert(key, value);
        true
    }

    pub fn take(&self, key: &K) -> Option<Result<V>> {
        self.lock().remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Outcome of polling a pending request.
pub enum Resolution<V> {
    /// Still running and inside its deadline
    Waiting,
    Ready(V),
    Failed(SonorityError),
    /// Finished without publishing anything (aborted or panicked)
    Dropped,
}

/// One outstanding async request.
pub struct PendingRequest<K> {
    pub key: K,
    pub entity: Option<EntityId>,
    pub name: String,
    pub work: WorkHandle,
    pub deadline: Instant,
}

impl<K: Eq + Hash + Clone> PendingRequest<K> {
    pub fn new(
        key: K,
        entity: Option<EntityId>,
        name: impl Into<String>,
        work: WorkHandle,
        timeout: Duration,
    ) -> Self {
        Self {
            key,
            entity,
            name: name.into(),
            work,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Returns whether the unit has finished, blocking on it if the deadline has passed.
    pub fn settle(&self, now: Instant) -> bool {
        if self.work.is_done() {
            return true;
        }
        if self.is_expired(now) {
            log::debug!("Waiting on overdue load of {}", self.name);
            self.work.wait_until_done();
            return true;
        }
        false
    }

    /// Settles the request and takes its result from `table`.
    pub fn poll<V>(&self, table: &ResultTable<K, V>, now: Instant) -> Resolution<V> {
        if !self.settle(now) {
            return Resolution::Waiting;
        }
        match table.take(&self.key) {
            Some(Ok(value)) => Resolution::Ready(value),
            Some(Err(error)) => Resolution::Failed(error),
            None => Resolution::Dropped,
        }
    }

    /// Aborts the unit if it has not started yet.
    pub fn abort(&self) {
        self.work.abort();
    }
}
