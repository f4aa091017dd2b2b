//! Error types for log device and storage layer operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in a log device or storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read fell outside the legal `[truncation, end)` window.
    #[error(
        "log read out of range: offset {offset}, len {len}, window [{truncation}, {end})"
    )]
    ReadOutOfRange {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current truncation offset.
        truncation: u64,
        /// The current end offset.
        end: u64,
    },

    /// A physical record exceeded the device's maximum length.
    #[error("physical record of {len} bytes exceeds maximum of {max} bytes")]
    RecordTooLarge {
        /// Length of the rejected record.
        len: usize,
        /// Maximum physical record length of the device.
        max: usize,
    },

    /// A truncation request was decreasing or beyond the end of the log.
    #[error("invalid truncation to {requested}: current {current}, end {end}")]
    InvalidTruncation {
        /// The requested truncation offset.
        requested: u64,
        /// The current truncation offset.
        current: u64,
        /// The current end offset.
        end: u64,
    },

    /// The device or storage layer has stopped serving requests (crash).
    #[error("device unavailable")]
    Unavailable,

    /// The persisted snapshot was requested outside of recovery.
    #[error("persisted snapshot requested outside of recovery")]
    SnapshotOutsideRecovery,

    /// Another process holds the log file lock.
    #[error("log file locked: another process has exclusive access")]
    Locked,

    /// The log file is corrupted.
    #[error("log file corrupted: {0}")]
    Corrupted(String),
}
