use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;

use crate::waiter::{Waiter, WaiterId};

/// The waiters queued for one key, in arrival order.
struct QueueEntry {
    /// The worker that owns this entry.
    epoch: u64,
    waiters: BTreeMap<WaiterId, Waiter>,
}

/// The mutable state behind a [`Registry`].
///
/// Invariant: an entry for a key exists if and only if it holds at least one waiter. Every
/// method here is a short map/list edit; none of them may be held across an `.await`.
#[derive(Default)]
pub(crate) struct RegistryState {
    entries: HashMap<String, QueueEntry>,
    next_waiter: u64,
    next_epoch: u64,
}

impl RegistryState {
    /// Queues `waiter` behind `key`.
    ///
    /// Returns the id of the new waiter, and the epoch of a worker that needs to be started if
    /// this waiter created the entry.
    pub(crate) fn push(&mut self, key: &str, waiter: Waiter) -> (WaiterId, Option<u64>) {
        let id = WaiterId(self.next_waiter);
        self.next_waiter += 1;

        if let Some(entry) = self.entries.get_mut(key) {
            entry.waiters.insert(id, waiter);
            return (id, None);
        }

        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let entry = QueueEntry {
            epoch,
            waiters: BTreeMap::from([(id, waiter)]),
        };
        self.entries.insert(key.to_owned(), entry);
        (id, Some(epoch))
    }

    pub(crate) fn set_timer(&mut self, key: &str, id: WaiterId, timer: AbortHandle) {
        if let Some(waiter) = self
            .entries
            .get_mut(key)
            .and_then(|entry| entry.waiters.get_mut(&id))
        {
            waiter.set_timer(timer);
        }
    }

    fn owned_entry(&mut self, key: &str, epoch: u64) -> Option<&mut QueueEntry> {
        self.entries
            .get_mut(key)
            .filter(|entry| entry.epoch == epoch)
    }

    /// The id of the oldest waiter for `key`, if the entry is still owned by `epoch`.
    pub(crate) fn head(&mut self, key: &str, epoch: u64) -> Option<WaiterId> {
        let entry = self.owned_entry(key, epoch)?;
        debug_assert!(!entry.waiters.is_empty(), "empty queue entry for {key}");
        entry.waiters.keys().next().copied()
    }

    /// Removes the oldest waiter for `key`, deleting the entry once it is empty.
    pub(crate) fn pop_head(&mut self, key: &str, epoch: u64) -> Option<(WaiterId, Waiter)> {
        let entry = self.owned_entry(key, epoch)?;
        let head = entry.waiters.pop_first();
        if entry.waiters.is_empty() {
            self.entries.remove(key);
        }
        head
    }

    /// Removes every waiter for `key` along with the entry.
    pub(crate) fn drain(&mut self, key: &str, epoch: u64) -> Vec<(WaiterId, Waiter)> {
        if self.owned_entry(key, epoch).is_none() {
            return Vec::new();
        }
        self.entries
            .remove(key)
            .map(|entry| entry.waiters.into_iter().collect())
            .unwrap_or_default()
    }

    /// Removes one specific waiter, deleting the entry if it was the last one.
    pub(crate) fn remove(&mut self, key: &str, id: WaiterId) -> Option<Waiter> {
        let entry = self.entries.get_mut(key)?;
        let waiter = entry.waiters.remove(&id);
        if entry.waiters.is_empty() {
            self.entries.remove(key);
        }
        waiter
    }
}

/// Handle to the shared registry of per-key queues.
///
/// Cloning the handle shares the same state. All mutations are serialized by a single lock.
#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("keys", &self.len())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the state consistent, so a panic elsewhere while the lock
    // was held cannot corrupt it.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether any request for `key` is currently queued.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// The number of requests currently queued for `key`.
    pub fn queued(&self, key: &str) -> usize {
        self.lock()
            .entries
            .get(key)
            .map_or(0, |entry| entry.waiters.len())
    }

    /// The number of keys with queued requests.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no requests are queued at all.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}
