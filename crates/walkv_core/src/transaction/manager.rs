//! Transaction manager.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::log::{LogRecord, RecordAssembler};
use crate::recovery::{self, RecoveryReport};
use crate::stats::ManagerStats;
use crate::transaction::state::Transaction;
use crate::transaction::truncation::TruncationTracker;
use crate::types::{Key, Tag, TransactionId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use walkv_storage::{LogDevice, PersistenceListener, StorageLayer, TaggedValue};

/// Gives a key-value store atomic, durable transactions through
/// write-ahead logging.
///
/// The manager provides:
/// - Buffered writes that stay invisible until commit
/// - Commits that reach the log device before any write is forwarded to
///   the storage layer
/// - Crash recovery that replays committed transactions from the log
/// - Log truncation driven by storage persistence callbacks
///
/// ## Threading
///
/// `start`, `write`, `commit` and `abort` take `&mut self` and are called
/// sequentially by the owner. Persistence callbacks arrive on storage
/// threads and only touch the shared [`TruncationTracker`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use walkv_core::{Config, TransactionId, TransactionManager};
/// use walkv_storage::{InMemoryLogDevice, InMemoryStorage};
///
/// let log = Arc::new(InMemoryLogDevice::new());
/// let storage = Arc::new(InMemoryStorage::new());
/// let mut manager = TransactionManager::recover(Config::default(), log, storage).unwrap();
///
/// let txid = TransactionId::new(1);
/// manager.start(txid).unwrap();
/// manager.write(txid, 10, b"a".to_vec()).unwrap();
/// manager.commit(txid).unwrap();
/// assert_eq!(manager.read(TransactionId::new(2), 10), Some(&b"a"[..]));
/// ```
pub struct TransactionManager {
    config: Config,
    log: Arc<dyn LogDevice>,
    storage: Arc<dyn StorageLayer>,
    assembler: RecordAssembler,
    /// Latest committed value of every key.
    committed: HashMap<Key, TaggedValue>,
    active: HashMap<TransactionId, Transaction>,
    tracker: Arc<TruncationTracker>,
    stats: Arc<ManagerStats>,
    recovery: RecoveryReport,
}

impl TransactionManager {
    /// Recovers from `log` and `storage` and returns a manager ready to
    /// serve calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the log is
    /// corrupted, or either collaborator fails.
    pub fn recover(
        config: Config,
        log: Arc<dyn LogDevice>,
        storage: Arc<dyn StorageLayer>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let assembler = RecordAssembler::for_device(&config, log.as_ref())?;
        let stats = Arc::new(ManagerStats::new());
        let tracker = Arc::new(TruncationTracker::new(
            Arc::clone(&log),
            Arc::clone(&stats),
        ));

        let recovered = recovery::run(
            &config,
            log.as_ref(),
            storage.as_ref(),
            assembler,
            &tracker,
            &stats,
        )?;

        Ok(Self {
            config,
            log,
            storage,
            assembler,
            committed: recovered.committed,
            active: HashMap::new(),
            tracker,
            stats,
            recovery: recovered.report,
        })
    }

    /// Starts a transaction.
    ///
    /// Transaction IDs must strictly increase; this is not checked.
    ///
    /// # Errors
    ///
    /// Returns an error if `txid` is already active.
    pub fn start(&mut self, txid: TransactionId) -> CoreResult<()> {
        if self.active.contains_key(&txid) {
            return Err(CoreError::TransactionAlreadyActive { txid });
        }
        self.active.insert(txid, Transaction::new(txid));
        self.stats.record_start();
        Ok(())
    }

    /// Returns the latest committed value of `key`.
    ///
    /// `_txid` is ignored: reads never see uncommitted writes, not even the
    /// caller's own.
    #[must_use]
    pub fn read(&self, _txid: TransactionId, key: Key) -> Option<&[u8]> {
        self.committed.get(&key).map(|tagged| tagged.value.as_slice())
    }

    /// Returns the committed value of `key` together with its tag.
    #[must_use]
    pub fn committed_value(&self, key: Key) -> Option<&TaggedValue> {
        self.committed.get(&key)
    }

    /// Buffers a write in an active transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if `txid` is not active.
    pub fn write(&mut self, txid: TransactionId, key: Key, value: Vec<u8>) -> CoreResult<()> {
        self.active
            .get_mut(&txid)
            .ok_or(CoreError::UnknownTransaction { txid })?
            .write(key, value)
    }

    /// Commits a transaction.
    ///
    /// Appends every buffered record followed by a `Commit` record, then
    /// publishes the writes to readers, and finally forwards them to the
    /// storage layer tagged by their log offsets.
    ///
    /// The transaction is finished whatever the outcome. If an append
    /// fails it is discarded and never becomes visible.
    ///
    /// # Errors
    ///
    /// Returns an error if `txid` is not active or a collaborator fails.
    pub fn commit(&mut self, txid: TransactionId) -> CoreResult<()> {
        let mut txn = self
            .active
            .remove(&txid)
            .ok_or(CoreError::UnknownTransaction { txid })?;
        let (records, writes) = txn.seal_for_commit()?;

        let mut tags: Vec<Tag> = Vec::with_capacity(writes.len());
        for record in &records {
            let appended = self.assembler.append(self.log.as_ref(), record)?;
            self.stats.record_append(appended.len, appended.chunks);
            if matches!(record, LogRecord::Write { .. }) {
                tags.push(appended.offset);
            }
        }

        for (write, tag) in writes.iter().zip(&tags) {
            self.committed
                .insert(write.key, TaggedValue::new(*tag, write.value.clone()));
            self.tracker.track(*tag);
        }
        let count = writes.len();
        for (write, tag) in writes.into_iter().zip(tags) {
            self.storage.queue_write(write.key, tag, write.value)?;
            self.stats.record_forward();
        }

        self.stats.record_commit();
        debug!(%txid, writes = count, "transaction committed");
        Ok(())
    }

    /// Aborts a transaction, discarding its buffered writes.
    ///
    /// Nothing is written to the log.
    ///
    /// # Errors
    ///
    /// Returns an error if `txid` is not active.
    pub fn abort(&mut self, txid: TransactionId) -> CoreResult<()> {
        let mut txn = self
            .active
            .remove(&txid)
            .ok_or(CoreError::UnknownTransaction { txid })?;
        txn.abort()?;
        self.stats.record_abort();
        debug!(%txid, "transaction aborted");
        Ok(())
    }

    /// Handles a persistence callback directly.
    ///
    /// Equivalent to the callback delivered through
    /// [`TransactionManager::persistence_listener`].
    ///
    /// # Errors
    ///
    /// Returns an error if the log device rejects the truncation.
    pub fn write_persisted(&self, key: Key, tag: Tag, _value: &[u8]) -> CoreResult<()> {
        Ok(self.tracker.persisted(key, tag)?)
    }

    /// Returns the listener registered with the storage layer.
    #[must_use]
    pub fn persistence_listener(&self) -> Arc<dyn PersistenceListener> {
        Arc::clone(&self.tracker) as Arc<dyn PersistenceListener>
    }

    /// Returns the tags queued to storage but not yet durable.
    #[must_use]
    pub fn outstanding_tags(&self) -> Vec<Tag> {
        self.tracker.outstanding()
    }

    /// Returns the number of active transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Checks if `txid` is active.
    #[must_use]
    pub fn is_active(&self, txid: TransactionId) -> bool {
        self.active.contains_key(&txid)
    }

    /// Returns the number of keys with a committed value.
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    /// Returns the statistics counters.
    #[must_use]
    pub fn stats(&self) -> &ManagerStats {
        &self.stats
    }

    /// Returns the report of the recovery that created this manager.
    #[must_use]
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the chunk length used for log I/O.
    #[must_use]
    pub fn chunk_len(&self) -> usize {
        self.assembler.chunk_len()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .field("committed", &self.committed.len())
            .field("active", &self.active.len())
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walkv_storage::{InMemoryLogDevice, InMemoryStorage};

    struct Fixture {
        log: Arc<InMemoryLogDevice>,
        storage: Arc<InMemoryStorage>,
        manager: TransactionManager,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(Config::default())
        }

        fn with_config(config: Config) -> Self {
            let log = Arc::new(InMemoryLogDevice::new());
            let storage = Arc::new(InMemoryStorage::new());
            let manager = TransactionManager::recover(
                config,
                Arc::clone(&log) as Arc<dyn LogDevice>,
                Arc::clone(&storage) as Arc<dyn StorageLayer>,
            )
            .unwrap();
            Self {
                log,
                storage,
                manager,
            }
        }

        /// Simulates a crash and recovers a fresh manager over the same
        /// devices.
        fn crash_and_recover(&mut self) {
            self.storage.crash();
            self.storage.restart();
            self.manager = TransactionManager::recover(
                self.manager.config().clone(),
                Arc::clone(&self.log) as Arc<dyn LogDevice>,
                Arc::clone(&self.storage) as Arc<dyn StorageLayer>,
            )
            .unwrap();
        }

        fn commit_one(&mut self, id: u64, key: Key, value: &[u8]) {
            let txid = TransactionId::new(id);
            self.manager.start(txid).unwrap();
            self.manager.write(txid, key, value.to_vec()).unwrap();
            self.manager.commit(txid).unwrap();
        }
    }

    fn t(id: u64) -> TransactionId {
        TransactionId::new(id)
    }

    #[test]
    fn read_your_commits() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");
        assert_eq!(fx.manager.read(t(2), 10), Some(&b"a"[..]));
    }

    #[test]
    fn read_missing_key() {
        let fx = Fixture::new();
        assert_eq!(fx.manager.read(t(1), 99), None);
    }

    #[test]
    fn writes_invisible_before_commit() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");

        fx.manager.start(t(2)).unwrap();
        fx.manager.write(t(2), 10, b"b".to_vec()).unwrap();
        fx.manager.write(t(2), 11, b"c".to_vec()).unwrap();
        assert_eq!(fx.manager.read(t(2), 10), Some(&b"a"[..]));
        assert_eq!(fx.manager.read(t(3), 11), None);

        fx.manager.commit(t(2)).unwrap();
        assert_eq!(fx.manager.read(t(3), 10), Some(&b"b"[..]));
        assert_eq!(fx.manager.read(t(3), 11), Some(&b"c"[..]));
    }

    #[test]
    fn abort_leaves_no_trace() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");
        let end = fx.log.end_offset().unwrap();
        let queued = fx.storage.queued_total();

        fx.manager.start(t(3)).unwrap();
        fx.manager.write(t(3), 10, b"b".to_vec()).unwrap();
        fx.manager.abort(t(3)).unwrap();

        assert_eq!(fx.manager.read(t(4), 10), Some(&b"a"[..]));
        assert_eq!(fx.log.end_offset().unwrap(), end);
        assert_eq!(fx.storage.queued_total(), queued);
        assert!(!fx.manager.is_active(t(3)));
    }

    #[test]
    fn commit_appends_writes_then_marker() {
        let mut fx = Fixture::new();
        fx.manager.start(t(1)).unwrap();
        fx.manager.write(t(1), 1, b"x".to_vec()).unwrap();
        fx.manager.write(t(1), 2, b"yy".to_vec()).unwrap();
        fx.manager.commit(t(1)).unwrap();

        // 25 + 26 + 16
        assert_eq!(fx.log.end_offset().unwrap(), 67);
        assert_eq!(fx.manager.committed_value(1).unwrap().tag, 0);
        assert_eq!(fx.manager.committed_value(2).unwrap().tag, 25);
        assert_eq!(fx.manager.outstanding_tags(), vec![0, 25]);

        assert_eq!(fx.storage.latest_value(1).unwrap(), TaggedValue::new(0, b"x".to_vec()));
        assert_eq!(fx.storage.latest_value(2).unwrap(), TaggedValue::new(25, b"yy".to_vec()));
    }

    #[test]
    fn large_value_is_chunked() {
        let mut fx = Fixture::new();
        let value: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        fx.commit_one(1, 5, &value);

        let stats = fx.manager.stats().snapshot();
        assert_eq!(stats.records_appended, 2);
        assert_eq!(stats.chunks_appended, 8 + 1);
        assert_eq!(stats.bytes_appended, 1024 + 16);

        fx.crash_and_recover();
        assert_eq!(fx.manager.read(t(2), 5), Some(value.as_slice()));
    }

    #[test]
    fn empty_commit_appends_marker_only() {
        let mut fx = Fixture::new();
        fx.manager.start(t(1)).unwrap();
        fx.manager.commit(t(1)).unwrap();

        assert_eq!(fx.log.end_offset().unwrap(), 16);
        assert!(fx.manager.outstanding_tags().is_empty());
    }

    #[test]
    fn unknown_transaction_is_rejected() {
        let mut fx = Fixture::new();
        assert!(matches!(
            fx.manager.write(t(9), 1, vec![1]),
            Err(CoreError::UnknownTransaction { .. })
        ));
        assert!(matches!(
            fx.manager.commit(t(9)),
            Err(CoreError::UnknownTransaction { .. })
        ));
        assert!(matches!(
            fx.manager.abort(t(9)),
            Err(CoreError::UnknownTransaction { .. })
        ));
    }

    #[test]
    fn finished_transaction_is_rejected() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");
        assert!(matches!(
            fx.manager.write(t(1), 10, vec![1]),
            Err(CoreError::UnknownTransaction { .. })
        ));

        fx.manager.start(t(2)).unwrap();
        fx.manager.abort(t(2)).unwrap();
        assert!(matches!(
            fx.manager.commit(t(2)),
            Err(CoreError::UnknownTransaction { .. })
        ));
    }

    #[test]
    fn duplicate_start_is_rejected() {
        let mut fx = Fixture::new();
        fx.manager.start(t(1)).unwrap();
        assert!(matches!(
            fx.manager.start(t(1)),
            Err(CoreError::TransactionAlreadyActive { .. })
        ));
        assert_eq!(fx.manager.active_count(), 1);
    }

    #[test]
    fn interleaved_transactions() {
        let mut fx = Fixture::new();
        fx.manager.start(t(1)).unwrap();
        fx.manager.start(t(2)).unwrap();
        fx.manager.write(t(1), 1, b"one".to_vec()).unwrap();
        fx.manager.write(t(2), 2, b"two".to_vec()).unwrap();
        fx.manager.abort(t(1)).unwrap();
        fx.manager.commit(t(2)).unwrap();

        assert_eq!(fx.manager.read(t(3), 1), None);
        assert_eq!(fx.manager.read(t(3), 2), Some(&b"two"[..]));
        assert_eq!(fx.manager.active_count(), 0);
    }

    #[test]
    fn persistence_advances_truncation() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");
        fx.commit_one(2, 11, b"b");
        let second_tag = fx.manager.committed_value(11).unwrap().tag;

        fx.storage.persist_key(10).unwrap();
        // Tag 0 is already the truncation offset.
        assert_eq!(fx.log.truncation_offset().unwrap(), 0);

        fx.storage.persist_key(11).unwrap();
        assert_eq!(fx.log.truncation_offset().unwrap(), second_tag);
        assert!(fx.manager.outstanding_tags().is_empty());
    }

    #[test]
    fn out_of_order_persistence_respects_minimum() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");
        fx.commit_one(2, 11, b"b");
        fx.commit_one(3, 12, b"c");
        let tag_11 = fx.manager.committed_value(11).unwrap().tag;
        let tag_12 = fx.manager.committed_value(12).unwrap().tag;

        fx.storage.persist_key(12).unwrap();
        assert_eq!(fx.log.truncation_offset().unwrap(), 0);
        fx.storage.persist_key(10).unwrap();
        assert_eq!(fx.log.truncation_offset().unwrap(), 0);
        assert_eq!(fx.manager.outstanding_tags(), vec![tag_11]);

        fx.storage.persist_key(11).unwrap();
        assert_eq!(fx.log.truncation_offset().unwrap(), tag_11);
        assert!(tag_11 < tag_12);
    }

    #[test]
    fn concrete_scenario() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");
        assert_eq!(fx.manager.read(t(2), 10), Some(&b"a"[..]));

        fx.manager.start(t(3)).unwrap();
        fx.manager.write(t(3), 10, b"b".to_vec()).unwrap();
        fx.manager.abort(t(3)).unwrap();
        assert_eq!(fx.manager.read(t(2), 10), Some(&b"a"[..]));

        // Crash before the write is persisted.
        assert_eq!(fx.storage.queued_total(), 1);
        fx.crash_and_recover();

        assert_eq!(fx.manager.read(t(4), 10), Some(&b"a"[..]));
        assert_eq!(fx.storage.queued_total(), 2);
        assert_eq!(fx.storage.pending_versions(10), vec![TaggedValue::new(0, b"a".to_vec())]);
        assert_eq!(fx.manager.recovery_report().replayed_writes, 1);
    }

    #[test]
    fn recovery_skips_uncommitted_writes() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");

        // Write records of transaction 2 reach the log without a commit marker.
        let assembler = RecordAssembler::new(128).unwrap();
        assembler
            .append(
                fx.log.as_ref(),
                &LogRecord::Write {
                    txid: t(2),
                    key: 10,
                    value: b"lost".to_vec(),
                },
            )
            .unwrap();

        fx.crash_and_recover();
        assert_eq!(fx.manager.read(t(3), 10), Some(&b"a"[..]));

        let report = fx.manager.recovery_report();
        assert_eq!(report.committed_transactions, 1);
        assert_eq!(report.replayed_writes, 1);
        assert_eq!(report.skipped_writes, 1);
        assert_eq!(report.max_txid, Some(t(2)));
    }

    #[test]
    fn recovery_uses_persisted_snapshot() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");
        fx.commit_one(2, 11, b"b");
        fx.storage.persist_pending().unwrap();
        let truncation = fx.log.truncation_offset().unwrap();

        fx.crash_and_recover();
        let report = fx.manager.recovery_report();
        assert_eq!(report.snapshot_keys, 2);
        assert_eq!(report.scan_start, truncation);
        assert_eq!(fx.manager.read(t(3), 10), Some(&b"a"[..]));
        assert_eq!(fx.manager.read(t(3), 11), Some(&b"b"[..]));
    }

    #[test]
    fn recovery_is_repeatable() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");
        fx.commit_one(2, 10, b"b");

        fx.crash_and_recover();
        fx.crash_and_recover();
        assert_eq!(fx.manager.read(t(3), 10), Some(&b"b"[..]));
        assert_eq!(fx.manager.recovery_report().replayed_writes, 2);
    }

    #[test]
    fn torn_tail_is_padded_and_later_commits_survive() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");

        let encoded = LogRecord::Write {
            txid: t(2),
            key: 11,
            value: vec![9; 300],
        }
        .encode()
        .unwrap();
        fx.log.append(&encoded[..128]).unwrap();

        fx.crash_and_recover();
        let torn_at = 41;
        let report = fx.manager.recovery_report().clone();
        assert_eq!(report.torn_tail.map(|torn| torn.offset), Some(torn_at));
        assert_eq!(report.padded_bytes, 324 - 128);
        assert_eq!(fx.log.end_offset().unwrap(), torn_at + 324);

        fx.commit_one(3, 12, b"c");
        fx.crash_and_recover();
        assert_eq!(fx.manager.read(t(4), 11), None);
        assert_eq!(fx.manager.read(t(4), 12), Some(&b"c"[..]));
        assert_eq!(fx.manager.recovery_report().torn_tail, None);
        assert_eq!(fx.manager.recovery_report().skipped_writes, 1);
    }

    #[test]
    fn torn_tail_blocks_recovery_when_repair_disabled() {
        let mut fx = Fixture::with_config(Config::new().repair_torn_tail(false));
        let encoded = LogRecord::Write {
            txid: t(1),
            key: 11,
            value: vec![1; 300],
        }
        .encode()
        .unwrap();
        fx.log.append(&encoded[..128]).unwrap();

        fx.storage.crash();
        fx.storage.restart();
        let result = TransactionManager::recover(
            Config::new().repair_torn_tail(false),
            Arc::clone(&fx.log) as Arc<dyn LogDevice>,
            Arc::clone(&fx.storage) as Arc<dyn StorageLayer>,
        );
        assert!(matches!(
            result,
            Err(CoreError::TornTail {
                offset: 0,
                declared: 324,
                available: 128,
            })
        ));
        // Nothing was appended behind the torn record.
        assert_eq!(fx.log.end_offset().unwrap(), 128);

        fx.manager = TransactionManager::recover(
            Config::default(),
            Arc::clone(&fx.log) as Arc<dyn LogDevice>,
            Arc::clone(&fx.storage) as Arc<dyn StorageLayer>,
        )
        .unwrap();
        assert_eq!(fx.manager.recovery_report().padded_bytes, 324 - 128);

        fx.commit_one(2, 12, b"c");
        assert_eq!(fx.manager.read(t(3), 12), Some(&b"c"[..]));
        fx.crash_and_recover();
        assert_eq!(fx.manager.read(t(3), 12), Some(&b"c"[..]));
        assert_eq!(fx.manager.read(t(3), 11), None);
    }

    #[test]
    fn device_limit_caps_chunk_len() {
        let log = Arc::new(InMemoryLogDevice::with_max_record_len(16));
        let storage = Arc::new(InMemoryStorage::new());
        let mut manager = TransactionManager::recover(
            Config::default(),
            Arc::clone(&log) as Arc<dyn LogDevice>,
            storage,
        )
        .unwrap();
        assert_eq!(manager.chunk_len(), 16);

        manager.start(t(1)).unwrap();
        manager.write(t(1), 1, b"v".to_vec()).unwrap();
        manager.commit(t(1)).unwrap();
        assert_eq!(manager.read(t(2), 1), Some(&b"v"[..]));
        assert_eq!(manager.stats().snapshot().chunks_appended, 2 + 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = TransactionManager::recover(
            Config::new().max_chunk_len(8),
            Arc::new(InMemoryLogDevice::new()),
            Arc::new(InMemoryStorage::new()),
        );
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn stats_track_lifecycle() {
        let mut fx = Fixture::new();
        fx.commit_one(1, 10, b"a");
        fx.manager.start(t(2)).unwrap();
        fx.manager.abort(t(2)).unwrap();
        fx.storage.persist_pending().unwrap();

        let stats = fx.manager.stats().snapshot();
        assert_eq!(stats.transactions_started, 2);
        assert_eq!(stats.transactions_committed, 1);
        assert_eq!(stats.transactions_aborted, 1);
        assert_eq!(stats.writes_forwarded, 1);
        assert_eq!(stats.writes_persisted, 1);
    }
}
