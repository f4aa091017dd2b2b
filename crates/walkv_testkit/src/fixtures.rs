//! Test fixtures.
//!
//! [`TestBed`] wires an in-memory log, an in-memory storage layer and a
//! crashable log wrapper to a live [`TransactionManager`], and can crash and
//! restart the whole stack while keeping the durable state.

use crate::crash::CrashableLogDevice;
use std::sync::Arc;
use walkv_core::{Config, CoreResult, Key, RecoveryReport, TransactionId, TransactionManager};
use walkv_storage::{InMemoryLogDevice, InMemoryStorage, LogDevice, StorageLayer};

/// A transaction manager over crashable in-memory collaborators.
pub struct TestBed {
    config: Config,
    log: Arc<InMemoryLogDevice>,
    storage: Arc<InMemoryStorage>,
    device: Arc<CrashableLogDevice>,
    manager: Option<TransactionManager>,
    next_txid: u64,
}

impl TestBed {
    /// Creates a test bed with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial recovery fails.
    pub fn new() -> CoreResult<Self> {
        Self::with_config(Config::default(), walkv_storage::DEFAULT_MAX_RECORD_LEN)
    }

    /// Creates a test bed whose log accepts appends of up to
    /// `max_record_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_config(config: Config, max_record_len: usize) -> CoreResult<Self> {
        let log = Arc::new(InMemoryLogDevice::with_max_record_len(max_record_len));
        let storage = Arc::new(InMemoryStorage::new());
        let device = Arc::new(CrashableLogDevice::new(
            Arc::clone(&log) as Arc<dyn LogDevice>
        ));
        let mut bed = Self {
            config,
            log,
            storage,
            device,
            manager: None,
            next_txid: 1,
        };
        bed.recover()?;
        Ok(bed)
    }

    fn recover(&mut self) -> CoreResult<&RecoveryReport> {
        let manager = TransactionManager::recover(
            self.config.clone(),
            Arc::clone(&self.device) as Arc<dyn LogDevice>,
            Arc::clone(&self.storage) as Arc<dyn StorageLayer>,
        )?;
        Ok(self.manager.insert(manager).recovery_report())
    }

    /// Returns the live manager.
    ///
    /// # Panics
    ///
    /// Panics between [`TestBed::crash`] and [`TestBed::restart`].
    pub fn manager(&mut self) -> &mut TransactionManager {
        self.manager
            .as_mut()
            .expect("manager is down; call restart() after crash()")
    }

    /// Returns whether a manager is running.
    pub fn is_running(&self) -> bool {
        self.manager.is_some()
    }

    /// Returns the underlying log, bypassing crash injection.
    pub fn log(&self) -> &Arc<InMemoryLogDevice> {
        &self.log
    }

    /// Returns the storage layer.
    pub fn storage(&self) -> &Arc<InMemoryStorage> {
        &self.storage
    }

    /// Returns the crashable log wrapper the manager writes through.
    pub fn device(&self) -> &Arc<CrashableLogDevice> {
        &self.device
    }

    /// Allocates the next transaction ID. IDs increase across restarts.
    pub fn next_txid(&mut self) -> TransactionId {
        let txid = TransactionId::new(self.next_txid);
        self.next_txid += 1;
        txid
    }

    /// Starts a transaction with a fresh ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager rejects the start.
    pub fn begin(&mut self) -> CoreResult<TransactionId> {
        let txid = self.next_txid();
        self.manager().start(txid)?;
        Ok(txid)
    }

    /// Runs a transaction that writes `writes` and commits.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the manager.
    pub fn commit(&mut self, writes: &[(Key, Vec<u8>)]) -> CoreResult<TransactionId> {
        let txid = self.begin()?;
        for (key, value) in writes {
            self.manager().write(txid, *key, value.clone())?;
        }
        self.manager().commit(txid)?;
        Ok(txid)
    }

    /// Reads the committed value of `key`.
    ///
    /// Returns `None` while the manager is down.
    pub fn read(&self, key: Key) -> Option<Vec<u8>> {
        let manager = self.manager.as_ref()?;
        manager
            .read(TransactionId::new(self.next_txid), key)
            .map(<[u8]>::to_vec)
    }

    /// Persists every pending storage write.
    ///
    /// # Errors
    ///
    /// Returns an error if storage or the truncation callback fails.
    pub fn persist_all(&self) -> CoreResult<()> {
        self.storage.persist_pending()?;
        Ok(())
    }

    /// Crashes the log wrapper and the storage layer and drops the manager.
    pub fn crash(&mut self) {
        self.device.crash_now();
        self.storage.crash();
        self.manager = None;
    }

    /// Brings storage back, installs a fresh log wrapper over the same
    /// bytes, and runs recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if recovery fails.
    pub fn restart(&mut self) -> CoreResult<&RecoveryReport> {
        self.manager = None;
        self.storage.restart();
        self.device = Arc::new(CrashableLogDevice::new(
            Arc::clone(&self.log) as Arc<dyn LogDevice>
        ));
        self.recover()
    }
}

impl std::fmt::Debug for TestBed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestBed")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .field("running", &self.manager.is_some())
            .field("next_txid", &self.next_txid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bed_commits_and_reads() {
        let mut bed = TestBed::new().unwrap();
        bed.commit(&[(1, b"a".to_vec()), (2, b"b".to_vec())]).unwrap();
        assert_eq!(bed.read(1), Some(b"a".to_vec()));
        assert_eq!(bed.read(2), Some(b"b".to_vec()));
    }

    #[test]
    fn txids_increase_across_restarts() {
        let mut bed = TestBed::new().unwrap();
        let first = bed.commit(&[(1, b"a".to_vec())]).unwrap();
        bed.crash();
        bed.restart().unwrap();
        let second = bed.commit(&[(1, b"b".to_vec())]).unwrap();
        assert!(second > first);
    }

    #[test]
    fn reads_fail_while_down() {
        let mut bed = TestBed::new().unwrap();
        bed.commit(&[(1, b"a".to_vec())]).unwrap();
        bed.crash();
        assert!(!bed.is_running());
        assert_eq!(bed.read(1), None);

        bed.restart().unwrap();
        assert_eq!(bed.read(1), Some(b"a".to_vec()));
    }

    #[test]
    fn restart_requeues_unpersisted_writes() {
        let mut bed = TestBed::new().unwrap();
        bed.commit(&[(1, b"a".to_vec())]).unwrap();
        bed.crash();
        let replayed = bed.restart().unwrap().replayed_writes;
        assert_eq!(replayed, 1);
        assert_eq!(bed.storage().pending_count(), 1);
    }

    #[test]
    fn persist_all_drains_outstanding_tags() {
        let mut bed = TestBed::new().unwrap();
        bed.commit(&[(1, b"a".to_vec())]).unwrap();
        bed.commit(&[(2, b"b".to_vec())]).unwrap();
        bed.persist_all().unwrap();
        assert!(bed.manager().outstanding_tags().is_empty());
        assert_eq!(bed.storage().pending_count(), 0);
    }
}
