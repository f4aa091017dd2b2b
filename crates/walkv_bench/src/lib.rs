//! Benchmark utilities.

use rand::Rng;
use std::sync::Arc;
use walkv_core::{Config, CoreResult, Key, TransactionId, TransactionManager};
use walkv_storage::{InMemoryLogDevice, InMemoryStorage, LogDevice, StorageLayer};

/// Generate random value data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// A manager over in-memory devices with its own transaction counter.
pub struct BenchEnv {
    /// The log the manager appends to.
    pub log: Arc<InMemoryLogDevice>,
    /// The storage layer writes are forwarded to.
    pub storage: Arc<InMemoryStorage>,
    /// The manager under test.
    pub manager: TransactionManager,
    next_txid: u64,
}

impl BenchEnv {
    /// Creates an environment over an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if recovery of the empty log fails.
    pub fn new() -> CoreResult<Self> {
        Self::over(Arc::new(InMemoryLogDevice::new()))
    }

    /// Creates an environment by recovering from `log`.
    ///
    /// # Errors
    ///
    /// Returns an error if recovery fails.
    pub fn over(log: Arc<InMemoryLogDevice>) -> CoreResult<Self> {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = TransactionManager::recover(
            Config::default(),
            Arc::clone(&log) as Arc<dyn LogDevice>,
            Arc::clone(&storage) as Arc<dyn StorageLayer>,
        )?;
        Ok(Self {
            log,
            storage,
            manager,
            next_txid: 1,
        })
    }

    /// Commits one transaction that writes `value` to `key`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the manager.
    pub fn commit_one(&mut self, key: Key, value: Vec<u8>) -> CoreResult<()> {
        let txid = TransactionId::new(self.next_txid);
        self.next_txid += 1;
        self.manager.start(txid)?;
        self.manager.write(txid, key, value)?;
        self.manager.commit(txid)
    }
}

/// Builds a log holding `txns` committed single-write transactions over
/// `keys` distinct keys. Nothing is persisted, so recovery replays all of
/// them.
///
/// # Errors
///
/// Returns the first error raised while committing.
pub fn populated_log(txns: usize, keys: u64, value_size: usize) -> CoreResult<Arc<InMemoryLogDevice>> {
    let mut env = BenchEnv::new()?;
    let value = random_data(value_size);
    for i in 0..txns {
        env.commit_one(i as u64 % keys, value.clone())?;
    }
    Ok(env.log)
}
