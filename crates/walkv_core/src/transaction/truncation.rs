//! Outstanding-tag tracking and log truncation.

use crate::stats::ManagerStats;
use crate::types::Tag;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use walkv_storage::{LogDevice, PersistenceListener, StorageResult};

/// Tracks tags queued to the storage layer and advances the log truncation
/// offset as they become durable.
///
/// This is the only manager state touched from storage threads. The ordered
/// set and the truncation decision share one lock, so two callbacks can
/// never move the truncation offset out of order.
///
/// # Invariants
///
/// - The truncation offset never exceeds the smallest outstanding tag
/// - The truncation offset never decreases
pub struct TruncationTracker {
    log: Arc<dyn LogDevice>,
    outstanding: Mutex<BTreeSet<Tag>>,
    stats: Arc<ManagerStats>,
}

impl TruncationTracker {
    pub(crate) fn new(log: Arc<dyn LogDevice>, stats: Arc<ManagerStats>) -> Self {
        Self {
            log,
            outstanding: Mutex::new(BTreeSet::new()),
            stats,
        }
    }

    /// Starts tracking `tag`. Must be called before the write is queued.
    pub(crate) fn track(&self, tag: Tag) {
        self.outstanding.lock().insert(tag);
    }

    /// Returns the outstanding tags in ascending order.
    #[must_use]
    pub fn outstanding(&self) -> Vec<Tag> {
        self.outstanding.lock().iter().copied().collect()
    }

    /// Returns the smallest outstanding tag.
    #[must_use]
    pub fn min_outstanding(&self) -> Option<Tag> {
        self.outstanding.lock().first().copied()
    }

    /// Returns the number of outstanding tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Returns `true` if no tag is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outstanding.lock().is_empty()
    }

    /// Handles a durable write.
    ///
    /// Removes `tag` and, if it was the smallest outstanding tag, moves the
    /// truncation offset up to it. Tags that are not outstanding are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the log device rejects the truncation.
    pub fn persisted(&self, key: u64, tag: Tag) -> StorageResult<()> {
        let mut outstanding = self.outstanding.lock();
        let was_min = outstanding.first() == Some(&tag);
        if !outstanding.remove(&tag) {
            debug!(key, tag, "ignoring persistence of untracked tag");
            return Ok(());
        }
        self.stats.record_persisted();

        if was_min {
            let current = self.log.truncation_offset()?;
            if tag > current {
                self.log.set_truncation_offset(tag)?;
                self.stats.record_truncation_advance();
                debug!(from = current, to = tag, "log truncation advanced");
            }
        }
        Ok(())
    }
}

impl PersistenceListener for TruncationTracker {
    fn write_persisted(&self, key: u64, tag: u64, _value: &[u8]) -> StorageResult<()> {
        self.persisted(key, tag)
    }
}

impl std::fmt::Debug for TruncationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TruncationTracker")
            .field("outstanding", &self.len())
            .finish_non_exhaustive()
    }
}
