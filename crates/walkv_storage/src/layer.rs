//! Storage layer trait definitions.

use crate::error::StorageResult;
use std::collections::HashMap;
use std::sync::Arc;

/// A value paired with the tag of the log record that made it
/// durable-eligible.
///
/// Tags are log offsets, so for any single key they increase with every
/// newer committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedValue {
    /// Log offset of the record carrying this value.
    pub tag: u64,
    /// The value bytes.
    pub value: Vec<u8>,
}

impl TaggedValue {
    /// Creates a new tagged value.
    #[must_use]
    pub fn new(tag: u64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }
}

/// Receives a callback each time a queued write becomes durable.
///
/// Callbacks for one key arrive in the order the writes were queued.
/// Callbacks for different keys may arrive in any order, from any thread.
pub trait PersistenceListener: Send + Sync {
    /// Called once per queued write when it has been persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener could not act on the notification
    /// (for example because the log device became unavailable).
    fn write_persisted(&self, key: u64, tag: u64, value: &[u8]) -> StorageResult<()>;
}

/// A versioned key-value storage layer that persists writes asynchronously.
///
/// # Ordering
///
/// - Writes to the same key persist in the order they were queued
/// - Writes to different keys may persist in any order
pub trait StorageLayer: Send + Sync {
    /// Returns the last persisted value of every key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::SnapshotOutsideRecovery`] if a write
    /// has been queued since the layer (re)started, or
    /// [`crate::StorageError::Unavailable`] after a crash.
    fn read_persisted_snapshot(&self) -> StorageResult<HashMap<u64, TaggedValue>>;

    /// Schedules `value` for persistence under `key`, tagged with `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer is unavailable.
    fn queue_write(&self, key: u64, tag: u64, value: Vec<u8>) -> StorageResult<()>;

    /// Sets the listener that receives persistence callbacks.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer is unavailable.
    fn set_persistence_listener(&self, listener: Arc<dyn PersistenceListener>)
        -> StorageResult<()>;
}
