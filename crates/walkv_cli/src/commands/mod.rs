//! CLI command implementations.

pub mod dump_log;
pub mod simulate;
pub mod verify;
