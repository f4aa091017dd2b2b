//! # walkv Core
//!
//! Write-ahead-logged transaction manager for key-value stores.
//!
//! This crate provides:
//! - The binary log record format and its chunked physical layout
//! - Transaction lifecycle: start, write, commit, abort, read
//! - Crash recovery that replays committed transactions from the log
//! - Log truncation driven by storage persistence callbacks
//!
//! The log device and the storage layer are collaborators defined in
//! `walkv_storage`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod log;
mod recovery;
mod stats;
mod transaction;
mod types;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use log::{LogRecord, LogRecordType, LogScanner, RecordAssembler};
pub use recovery::{Recovery, RecoveryReport};
pub use stats::{ManagerStats, StatsSnapshot};
pub use transaction::{
    PendingWrite, Transaction, TransactionManager, TransactionState, TruncationTracker,
};
pub use types::{Key, Tag, TransactionId};
pub use walkv_storage::TaggedValue;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
