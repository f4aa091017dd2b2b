//! Error types for walkv core.

use crate::types::TransactionId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in walkv core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Log device or storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] walkv_storage::StorageError),

    /// The log contains a structurally invalid record.
    #[error("log corruption: {message}")]
    LogCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The log ends in a torn record and repair is disabled.
    #[error("torn record at offset {offset}: {available} of {declared} bytes present")]
    TornTail {
        /// Offset of the torn record.
        offset: u64,
        /// Length its header declares.
        declared: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// The transaction was never started or has already finished.
    #[error("unknown transaction {txid}")]
    UnknownTransaction {
        /// The offending transaction.
        txid: TransactionId,
    },

    /// The transaction is already active.
    #[error("transaction {txid} already active")]
    TransactionAlreadyActive {
        /// The offending transaction.
        txid: TransactionId,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns `true` if this error means a device stopped serving requests.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Storage(walkv_storage::StorageError::Unavailable)
        )
    }
}
