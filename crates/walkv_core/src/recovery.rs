//! Crash recovery.
//!
//! Recovery runs once, before the manager serves any call:
//!
//! 1. Seed the committed table from the storage layer's persisted snapshot
//! 2. Register the truncation tracker as the persistence listener
//! 3. Scan the log from the truncation offset and collect every transaction
//!    with a `Commit` record
//! 4. Pad a torn tail so later appends start on a record boundary
//! 5. Replay, in log order, the writes of committed transactions and queue
//!    them to the storage layer again
//!
//! Writes of transactions without a `Commit` record are skipped, which rolls
//! them back.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::log::{LogRecord, LogScanner, RecordAssembler, ScannedRecord, TornRecord};
use crate::stats::ManagerStats;
use crate::transaction::TruncationTracker;
use crate::types::{Key, TransactionId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use walkv_storage::{LogDevice, PersistenceListener, StorageLayer, TaggedValue};

/// Commit status collected by the first recovery pass.
#[derive(Debug, Default)]
pub struct Recovery {
    committed_txns: HashSet<TransactionId>,
    max_txid: Option<TransactionId>,
    records_scanned: u64,
}

impl Recovery {
    /// Creates an empty recovery context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First pass: records which transactions reached a `Commit` record.
    ///
    /// # Errors
    ///
    /// Returns the first error yielded by `records`.
    pub fn scan_committed<I>(&mut self, records: I) -> CoreResult<()>
    where
        I: Iterator<Item = CoreResult<ScannedRecord>>,
    {
        for result in records {
            let scanned = result?;
            self.records_scanned += 1;

            let txid = scanned.record.txid();
            self.max_txid = self.max_txid.max(Some(txid));
            if let LogRecord::Commit { txid } = scanned.record {
                self.committed_txns.insert(txid);
            }
        }
        Ok(())
    }

    /// Checks if a transaction was committed.
    #[must_use]
    pub fn is_committed(&self, txid: TransactionId) -> bool {
        self.committed_txns.contains(&txid)
    }

    /// Returns the number of committed transactions seen.
    #[must_use]
    pub fn committed_count(&self) -> usize {
        self.committed_txns.len()
    }

    /// Returns the highest transaction ID seen in any record.
    #[must_use]
    pub fn max_txid(&self) -> Option<TransactionId> {
        self.max_txid
    }

    /// Returns the number of records scanned.
    #[must_use]
    pub fn records_scanned(&self) -> u64 {
        self.records_scanned
    }
}

/// Summary of one recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Truncation offset the scan started at.
    pub scan_start: u64,
    /// Offset the scan stopped at.
    pub scan_end: u64,
    /// Logical records read by the first pass.
    pub records_scanned: u64,
    /// Transactions with a `Commit` record.
    pub committed_transactions: usize,
    /// Writes replayed and queued to the storage layer.
    pub replayed_writes: usize,
    /// Writes of uncommitted transactions.
    pub skipped_writes: usize,
    /// Highest transaction ID seen.
    pub max_txid: Option<TransactionId>,
    /// Keys in the persisted snapshot.
    pub snapshot_keys: usize,
    /// Torn record found at the end of the log.
    pub torn_tail: Option<TornRecord>,
    /// Zero bytes appended to complete the torn record.
    pub padded_bytes: usize,
}

/// State rebuilt by [`run`].
pub(crate) struct RecoveredState {
    pub committed: HashMap<Key, TaggedValue>,
    pub report: RecoveryReport,
}

/// Runs the full recovery procedure.
pub(crate) fn run(
    config: &Config,
    log: &dyn LogDevice,
    storage: &dyn StorageLayer,
    assembler: RecordAssembler,
    tracker: &Arc<TruncationTracker>,
    stats: &ManagerStats,
) -> CoreResult<RecoveredState> {
    let mut committed = storage.read_persisted_snapshot()?;
    let snapshot_keys = committed.len();
    storage.set_persistence_listener(Arc::clone(tracker) as Arc<dyn PersistenceListener>)?;

    let scan_start = log.truncation_offset()?;
    let mut scanner = LogScanner::new(log, assembler, scan_start)?;
    let mut recovery = Recovery::new();
    recovery.scan_committed(&mut scanner)?;
    let scan_end = scanner.position();
    let torn_tail = scanner.torn_tail();

    let mut padded_bytes = 0;
    if let Some(torn) = torn_tail {
        if !config.repair_torn_tail {
            warn!(
                offset = torn.offset,
                declared = torn.declared,
                available = torn.available,
                "torn record at end of log and repair is disabled"
            );
            return Err(CoreError::TornTail {
                offset: torn.offset,
                declared: torn.declared,
                available: torn.available,
            });
        }
        padded_bytes = assembler.pad(log, &torn)?;
        warn!(
            offset = torn.offset,
            declared = torn.declared,
            available = torn.available,
            padded = padded_bytes,
            "padded torn record at end of log"
        );
    }

    let mut replayed_writes = 0;
    let mut skipped_writes = 0;
    for result in LogScanner::range(log, assembler, scan_start, scan_end) {
        let ScannedRecord { offset, record, .. } = result?;
        let LogRecord::Write { txid, key, value } = record else {
            continue;
        };
        if !recovery.is_committed(txid) {
            skipped_writes += 1;
            continue;
        }

        committed.insert(key, TaggedValue::new(offset, value.clone()));
        tracker.track(offset);
        storage.queue_write(key, offset, value)?;
        stats.record_forward();
        replayed_writes += 1;
    }

    let report = RecoveryReport {
        scan_start,
        scan_end,
        records_scanned: recovery.records_scanned(),
        committed_transactions: recovery.committed_count(),
        replayed_writes,
        skipped_writes,
        max_txid: recovery.max_txid(),
        snapshot_keys,
        torn_tail,
        padded_bytes,
    };
    info!(
        scan_start,
        scan_end,
        records = report.records_scanned,
        committed = report.committed_transactions,
        replayed = replayed_writes,
        skipped = skipped_writes,
        snapshot_keys,
        "recovery complete"
    );

    Ok(RecoveredState { committed, report })
}
