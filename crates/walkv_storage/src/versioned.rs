//! In-memory versioned storage layer with explicit persistence steps.

use crate::error::{StorageError, StorageResult};
use crate::layer::{PersistenceListener, StorageLayer, TaggedValue};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct KeyVersions {
    /// Last durable version.
    persisted: Option<TaggedValue>,
    /// Queued versions, oldest first.
    pending: VecDeque<TaggedValue>,
}

#[derive(Debug, Default)]
struct KeyEntry {
    versions: Mutex<KeyVersions>,
    /// Held for a whole persistence pass so same-key callbacks stay ordered.
    persist_guard: Mutex<()>,
}

/// An in-memory storage layer with per-key version queues.
///
/// Queued writes stay pending until a persistence step runs, either
/// explicitly ([`InMemoryStorage::persist_key`],
/// [`InMemoryStorage::persist_pending`]) or from a
/// [`crate::BackgroundPersister`]. Each version that becomes durable is
/// reported to the registered [`PersistenceListener`].
///
/// # Crash Simulation
///
/// [`InMemoryStorage::crash`] forgets every version that was not yet
/// persisted, detaches the listener and makes every further call fail with
/// [`StorageError::Unavailable`]. [`InMemoryStorage::restart`] brings the
/// layer back in recovery mode, where the persisted snapshot may be read.
///
/// # Example
///
/// ```rust
/// use walkv_storage::{InMemoryStorage, StorageLayer};
///
/// let storage = InMemoryStorage::new();
/// storage.queue_write(7, 0, b"v1".to_vec()).unwrap();
/// assert_eq!(storage.persisted_value(7), None);
///
/// storage.persist_pending().unwrap();
/// assert_eq!(storage.persisted_value(7).unwrap().value, b"v1");
/// ```
#[derive(Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<u64, Arc<KeyEntry>>>,
    listener: RwLock<Option<Arc<dyn PersistenceListener>>>,
    blocked: RwLock<HashSet<u64>>,
    crashed: AtomicBool,
    /// Set until the first write is queued after (re)start.
    writes_queued: AtomicBool,
    queued_total: AtomicU64,
}

impl InMemoryStorage {
    /// Creates an empty storage layer, ready for recovery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.crashed.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }

    fn entry(&self, key: u64) -> Option<Arc<KeyEntry>> {
        self.entries.read().get(&key).cloned()
    }

    /// Persists every queued version of `key`, oldest first.
    ///
    /// Returns the number of versions persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer is unavailable or the listener rejects
    /// a callback.
    pub fn persist_key(&self, key: u64) -> StorageResult<usize> {
        self.ensure_available()?;
        let Some(entry) = self.entry(key) else {
            return Ok(0);
        };

        let _guard = entry.persist_guard.lock();
        let mut persisted = 0;
        loop {
            let version = {
                let mut versions = entry.versions.lock();
                let Some(version) = versions.pending.pop_front() else {
                    break;
                };
                versions.persisted = Some(version.clone());
                version
            };
            persisted += 1;

            let listener = self.listener.read().clone();
            if let Some(listener) = listener {
                listener.write_persisted(key, version.tag, &version.value)?;
            }
        }
        Ok(persisted)
    }

    /// Runs one persistence pass over every key that is not blocked.
    ///
    /// Returns `true` if anything was persisted.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while persisting a key.
    pub fn persist_pending(&self) -> StorageResult<bool> {
        self.ensure_available()?;
        let keys: Vec<u64> = self.entries.read().keys().copied().collect();
        let blocked = self.blocked.read().clone();

        let mut did_work = false;
        for key in keys {
            if blocked.contains(&key) {
                continue;
            }
            did_work |= self.persist_key(key)? > 0;
        }
        Ok(did_work)
    }

    /// Prevents [`InMemoryStorage::persist_pending`] from persisting `keys`.
    ///
    /// Replaces any previously blocked set. Pass an empty slice to unblock.
    pub fn block_persistence_for_keys(&self, keys: &[u64]) {
        *self.blocked.write() = keys.iter().copied().collect();
    }

    /// Returns the most recently queued (or persisted) version of `key`.
    #[must_use]
    pub fn latest_value(&self, key: u64) -> Option<TaggedValue> {
        let entry = self.entry(key)?;
        let versions = entry.versions.lock();
        versions
            .pending
            .back()
            .cloned()
            .or_else(|| versions.persisted.clone())
    }

    /// Returns the durable version of `key`.
    #[must_use]
    pub fn persisted_value(&self, key: u64) -> Option<TaggedValue> {
        let entry = self.entry(key)?;
        let persisted = entry.versions.lock().persisted.clone();
        persisted
    }

    /// Returns the queued, not yet persisted versions of `key`.
    #[must_use]
    pub fn pending_versions(&self, key: u64) -> Vec<TaggedValue> {
        self.entry(key)
            .map(|entry| entry.versions.lock().pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of versions waiting for persistence.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .map(|entry| entry.versions.lock().pending.len())
            .sum()
    }

    /// Returns how many writes were ever queued, across restarts.
    #[must_use]
    pub fn queued_total(&self) -> u64 {
        self.queued_total.load(Ordering::SeqCst)
    }

    /// Simulates a crash.
    ///
    /// Unpersisted versions are lost, the listener is detached, and every
    /// call fails until [`InMemoryStorage::restart`].
    pub fn crash(&self) {
        self.crashed.store(true, Ordering::SeqCst);
        *self.listener.write() = None;
        for entry in self.entries.read().values() {
            entry.versions.lock().pending.clear();
        }
        debug!("storage layer crashed");
    }

    /// Brings the layer back after a crash, in recovery mode.
    pub fn restart(&self) {
        self.writes_queued.store(false, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
    }

    /// Returns whether the layer is currently crashed.
    #[must_use]
    pub fn is_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }
}

impl StorageLayer for InMemoryStorage {
    fn read_persisted_snapshot(&self) -> StorageResult<HashMap<u64, TaggedValue>> {
        self.ensure_available()?;
        if self.writes_queued.load(Ordering::SeqCst) {
            return Err(StorageError::SnapshotOutsideRecovery);
        }

        Ok(self
            .entries
            .read()
            .iter()
            .filter_map(|(key, entry)| {
                let persisted = entry.versions.lock().persisted.clone();
                persisted.map(|value| (*key, value))
            })
            .collect())
    }

    fn queue_write(&self, key: u64, tag: u64, value: Vec<u8>) -> StorageResult<()> {
        self.ensure_available()?;
        self.writes_queued.store(true, Ordering::SeqCst);

        let entry = match self.entry(key) {
            Some(entry) => entry,
            None => Arc::clone(self.entries.write().entry(key).or_default()),
        };
        entry
            .versions
            .lock()
            .pending
            .push_back(TaggedValue::new(tag, value));
        self.queued_total.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_persistence_listener(
        &self,
        listener: Arc<dyn PersistenceListener>,
    ) -> StorageResult<()> {
        self.ensure_available()?;
        *self.listener.write() = Some(listener);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("keys", &self.entries.read().len())
            .field("pending", &self.pending_count())
            .field("crashed", &self.is_crashed())
            .finish_non_exhaustive()
    }
}
