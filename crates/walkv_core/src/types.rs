//! Core type definitions for walkv.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are chosen by the caller and must strictly increase
/// across the process lifetime and across crashes. The manager trusts this
/// ordering and never generates or validates IDs itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for TransactionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Key of a stored value.
pub type Key = u64;

/// Log offset identifying a durable write.
pub type Tag = u64;
