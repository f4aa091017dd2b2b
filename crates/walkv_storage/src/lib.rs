//! # walkv Storage
//!
//! Collaborator interfaces for the walkv transaction manager, with
//! reference implementations.
//!
//! This crate provides the two lower-level services the transaction
//! manager sits on. Neither of them interprets what is stored in it.
//!
//! ## Design Principles
//!
//! - Log devices are append-only byte stores with a bounded append size
//! - Storage layers persist versioned key/value writes asynchronously and
//!   report each durable write back through a [`PersistenceListener`]
//! - Every failure is an explicit [`StorageError`]; a crash is modelled as a
//!   device that returns [`StorageError::Unavailable`] from then on
//! - Everything is `Send + Sync` with `&self` methods
//!
//! ## Available Implementations
//!
//! - [`InMemoryLogDevice`] - For testing and benchmarks
//! - [`FileLogDevice`] - Log device backed by a single locked file
//! - [`InMemoryStorage`] - Versioned storage layer with crash simulation
//! - [`BackgroundPersister`] - Drives [`InMemoryStorage`] persistence on a thread
//!
//! ## Example
//!
//! ```rust
//! use walkv_storage::{InMemoryLogDevice, LogDevice};
//!
//! let log = InMemoryLogDevice::new();
//! let offset = log.append(b"hello world").unwrap();
//! let data = log.read(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod device;
mod error;
mod file;
mod layer;
mod memory;
mod persister;
mod versioned;

pub use device::{LogDevice, DEFAULT_MAX_RECORD_LEN};
pub use error::{StorageError, StorageResult};
pub use file::FileLogDevice;
pub use layer::{PersistenceListener, StorageLayer, TaggedValue};
pub use memory::InMemoryLogDevice;
pub use persister::BackgroundPersister;
pub use versioned::InMemoryStorage;
