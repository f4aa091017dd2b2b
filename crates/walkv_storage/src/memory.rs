//! In-memory log device for testing.

use crate::device::{check_read_window, check_truncation, LogDevice, DEFAULT_MAX_RECORD_LEN};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct LogState {
    data: Vec<u8>,
    truncation: u64,
}

/// An in-memory log device.
///
/// This device keeps every appended byte in memory, including bytes before
/// the truncation offset (they become unreadable, not reclaimed). It is
/// suitable for:
/// - Unit tests
/// - Crash-recovery tests, where the device outlives the manager
/// - Benchmarks
///
/// # Thread Safety
///
/// Appends take a write lock, so offset allocation is atomic.
///
/// # Example
///
/// ```rust
/// use walkv_storage::{InMemoryLogDevice, LogDevice};
///
/// let log = InMemoryLogDevice::new();
/// let offset = log.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(log.end_offset().unwrap(), 9);
/// ```
#[derive(Debug)]
pub struct InMemoryLogDevice {
    state: RwLock<LogState>,
    max_record_len: usize,
}

impl Default for InMemoryLogDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLogDevice {
    /// Creates a new empty device with the default maximum record length.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_record_len(DEFAULT_MAX_RECORD_LEN)
    }

    /// Creates a new empty device accepting physical records of up to
    /// `max_record_len` bytes.
    #[must_use]
    pub fn with_max_record_len(max_record_len: usize) -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            max_record_len,
        }
    }

    /// Returns a copy of every byte ever appended.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.state.read().data.clone()
    }
}

impl LogDevice for InMemoryLogDevice {
    fn append(&self, record: &[u8]) -> StorageResult<u64> {
        if record.len() > self.max_record_len {
            return Err(StorageError::RecordTooLarge {
                len: record.len(),
                max: self.max_record_len,
            });
        }
        let mut state = self.state.write();
        let offset = state.data.len() as u64;
        state.data.extend_from_slice(record);
        Ok(offset)
    }

    fn read(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let state = self.state.read();
        let end = state.data.len() as u64;
        check_read_window(offset, len, state.truncation, end, self.max_record_len)?;

        let start = offset as usize;
        Ok(state.data[start..start + len].to_vec())
    }

    fn end_offset(&self) -> StorageResult<u64> {
        Ok(self.state.read().data.len() as u64)
    }

    fn truncation_offset(&self) -> StorageResult<u64> {
        Ok(self.state.read().truncation)
    }

    fn set_truncation_offset(&self, offset: u64) -> StorageResult<()> {
        let mut state = self.state.write();
        check_truncation(offset, state.truncation, state.data.len() as u64)?;
        state.truncation = offset;
        Ok(())
    }

    fn max_record_len(&self) -> usize {
        self.max_record_len
    }
}
