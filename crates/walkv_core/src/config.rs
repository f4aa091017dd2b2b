//! Transaction manager configuration.

use crate::error::{CoreError, CoreResult};
use crate::log::HEADER_LEN;
use walkv_storage::DEFAULT_MAX_RECORD_LEN;

/// Configuration for a [`crate::TransactionManager`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Largest physical chunk written to or read from the log device.
    ///
    /// The effective chunk length is the smaller of this and the device's
    /// own maximum record length.
    pub max_chunk_len: usize,

    /// Whether recovery pads a torn multi-chunk record at the end of the log
    /// so later appends do not land inside its declared extent.
    ///
    /// When unset, recovery fails with [`CoreError::TornTail`] instead and
    /// leaves the log as it found it.
    pub repair_torn_tail: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_chunk_len: DEFAULT_MAX_RECORD_LEN,
            repair_torn_tail: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum physical chunk length.
    #[must_use]
    pub const fn max_chunk_len(mut self, len: usize) -> Self {
        self.max_chunk_len = len;
        self
    }

    /// Sets whether recovery repairs a torn tail.
    #[must_use]
    pub const fn repair_torn_tail(mut self, value: bool) -> Self {
        self.repair_torn_tail = value;
        self
    }

    /// Checks that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk length cannot hold a record header.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_chunk_len < HEADER_LEN {
            return Err(CoreError::invalid_config(format!(
                "max_chunk_len {} is smaller than the {HEADER_LEN}-byte record header",
                self.max_chunk_len
            )));
        }
        Ok(())
    }
}
