//! Transaction manager statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = manager.stats().snapshot();
//! println!("Committed: {}", stats.transactions_committed);
//! println!("Log bytes: {}", stats.bytes_appended);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction manager counters.
///
/// All counters are atomic; the persistence-related ones are updated from
/// storage callbacks on other threads.
#[derive(Debug, Default)]
pub struct ManagerStats {
    // Transaction counters
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,

    // Log counters
    records_appended: AtomicU64,
    chunks_appended: AtomicU64,
    bytes_appended: AtomicU64,

    // Storage counters
    writes_forwarded: AtomicU64,
    writes_persisted: AtomicU64,
    truncation_advances: AtomicU64,
}

impl ManagerStats {
    /// Creates a zeroed stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one logical record appended as `chunks` physical appends.
    pub(crate) fn record_append(&self, bytes: usize, chunks: usize) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
        self.chunks_appended
            .fetch_add(chunks as u64, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_forward(&self) {
        self.writes_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persisted(&self) {
        self.writes_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_truncation_advance(&self) {
        self.truncation_advances.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            records_appended: self.records_appended.load(Ordering::Relaxed),
            chunks_appended: self.chunks_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            writes_forwarded: self.writes_forwarded.load(Ordering::Relaxed),
            writes_persisted: self.writes_persisted.load(Ordering::Relaxed),
            truncation_advances: self.truncation_advances.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`ManagerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions aborted.
    pub transactions_aborted: u64,
    /// Logical records appended to the log.
    pub records_appended: u64,
    /// Physical appends issued.
    pub chunks_appended: u64,
    /// Bytes appended to the log.
    pub bytes_appended: u64,
    /// Writes forwarded to the storage layer, including recovery replays.
    pub writes_forwarded: u64,
    /// Persistence callbacks received for outstanding writes.
    pub writes_persisted: u64,
    /// Times the truncation offset moved forward.
    pub truncation_advances: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(ManagerStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_append_counts_chunks_and_bytes() {
        let stats = ManagerStats::new();
        stats.record_append(300, 3);
        stats.record_append(16, 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.records_appended, 2);
        assert_eq!(snapshot.chunks_appended, 4);
        assert_eq!(snapshot.bytes_appended, 316);
    }

    #[test]
    fn transaction_counters() {
        let stats = ManagerStats::new();
        stats.record_start();
        stats.record_start();
        stats.record_commit();
        stats.record_abort();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.transactions_started, 2);
        assert_eq!(snapshot.transactions_committed, 1);
        assert_eq!(snapshot.transactions_aborted, 1);
    }
}
