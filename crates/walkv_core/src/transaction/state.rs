//! Transaction state.

use crate::error::{CoreError, CoreResult};
use crate::log::LogRecord;
use crate::types::{Key, TransactionId};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// A buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    /// Key being written.
    pub key: Key,
    /// New value.
    pub value: Vec<u8>,
}

/// An active transaction.
///
/// Holds the write-set and the log buffer that mirrors it. Neither is
/// visible to readers or the log until commit.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    /// Writes in call order.
    writes: Vec<PendingWrite>,
    /// Records to append on commit, in order.
    log: Vec<LogRecord>,
}

impl Transaction {
    /// Creates a new active transaction.
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            writes: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Buffers a write and its log record.
    pub(crate) fn write(&mut self, key: Key, value: Vec<u8>) -> CoreResult<()> {
        self.ensure_active()?;
        self.log.push(LogRecord::Write {
            txid: self.id,
            key,
            value: value.clone(),
        });
        self.writes.push(PendingWrite { key, value });
        Ok(())
    }

    /// Returns the buffered writes in call order.
    #[must_use]
    pub fn writes(&self) -> &[PendingWrite] {
        &self.writes
    }

    /// Returns the buffered log records.
    #[must_use]
    pub fn log_records(&self) -> &[LogRecord] {
        &self.log
    }

    /// Returns the number of buffered writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Seals the log buffer with a `Commit` record and returns the records
    /// to append together with the write-set.
    pub(crate) fn seal_for_commit(&mut self) -> CoreResult<(Vec<LogRecord>, Vec<PendingWrite>)> {
        self.ensure_active()?;
        self.log.push(LogRecord::Commit { txid: self.id });
        self.state = TransactionState::Committed;
        Ok((
            std::mem::take(&mut self.log),
            std::mem::take(&mut self.writes),
        ))
    }

    /// Discards all buffered state.
    pub(crate) fn abort(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        self.log.clear();
        self.writes.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }

    fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed | TransactionState::Aborted => {
                Err(CoreError::UnknownTransaction { txid: self.id })
            }
        }
    }
}
