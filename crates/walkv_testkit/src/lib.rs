//! # walkv Testkit
//!
//! Test utilities for walkv.
//!
//! This crate provides:
//! - A crash-injecting log device wrapper
//! - A test bed that crashes and restarts a whole manager stack
//! - Named crash recovery scenarios
//! - Property-based test generators using proptest
//! - A seeded randomized crash stress driver
//!
//! ## Usage
//!
//! ```rust
//! use walkv_testkit::prelude::*;
//!
//! let mut bed = TestBed::new().unwrap();
//! bed.commit(&[(10, b"a".to_vec())]).unwrap();
//! bed.crash();
//! bed.restart().unwrap();
//! assert_eq!(bed.read(10), Some(b"a".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
