//! Transaction lifecycle, commit and log truncation.
//!
//! A transaction moves `Active → Committed` or `Active → Aborted` exactly
//! once:
//! - **Atomicity**: a transaction is committed if and only if its `Commit`
//!   record is fully readable in the log
//! - **Isolation**: buffered writes are invisible to reads until commit
//! - **Durability**: records reach the log before any write is forwarded to
//!   the storage layer

mod manager;
mod state;
mod truncation;

pub use manager::TransactionManager;
pub use state::{PendingWrite, Transaction, TransactionState};
pub use truncation::TruncationTracker;
