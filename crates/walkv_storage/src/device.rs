//! Log device trait definition.

use crate::error::StorageResult;

/// Default maximum length of one physical log record, in bytes.
pub const DEFAULT_MAX_RECORD_LEN: usize = 128;

/// An append-only, byte-addressed log device.
///
/// Log devices are **opaque byte stores** with a bounded append size and a
/// movable lower bound (the truncation offset). They know nothing about the
/// logical records written into them; a logical record larger than
/// [`LogDevice::max_record_len`] is split by the caller into consecutive
/// physical appends.
///
/// # Invariants
///
/// - `append` returns the offset at which the bytes were written; concurrent
///   appends never receive overlapping byte ranges
/// - `read` only succeeds inside `[truncation_offset, end_offset)`
/// - `truncation_offset` never decreases and never exceeds `end_offset`
/// - Devices must be `Send + Sync`; all methods take `&self` and serialize
///   internally
///
/// # Implementors
///
/// - [`super::InMemoryLogDevice`] - For testing
/// - [`super::FileLogDevice`] - For persistent storage
pub trait LogDevice: Send + Sync {
    /// Atomically appends `record` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `record` is longer than [`LogDevice::max_record_len`]
    /// - The device is unavailable
    /// - An I/O error occurs
    fn append(&self, record: &[u8]) -> StorageResult<u64>;

    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The range falls outside `[truncation_offset, end_offset)`
    /// - `len` exceeds [`LogDevice::max_record_len`]
    /// - The device is unavailable
    fn read(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Returns the current append position.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unavailable.
    fn end_offset(&self) -> StorageResult<u64>;

    /// Returns the lowest offset that may still be read.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unavailable.
    fn truncation_offset(&self) -> StorageResult<u64>;

    /// Moves the truncation offset forward, allowing reclamation of all
    /// bytes before `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `offset` is lower than the current truncation offset
    /// - `offset` is greater than the end offset
    /// - The device is unavailable
    fn set_truncation_offset(&self, offset: u64) -> StorageResult<()>;

    /// Returns the maximum length of a single physical append or read.
    fn max_record_len(&self) -> usize;
}

/// Validates a physical read against the device window.
pub(crate) fn check_read_window(
    offset: u64,
    len: usize,
    truncation: u64,
    end: u64,
    max: usize,
) -> StorageResult<()> {
    use crate::error::StorageError;

    if len > max {
        return Err(StorageError::RecordTooLarge { len, max });
    }
    let read_end = offset.saturating_add(len as u64);
    if offset < truncation || read_end > end {
        return Err(StorageError::ReadOutOfRange {
            offset,
            len,
            truncation,
            end,
        });
    }
    Ok(())
}

/// Validates a truncation request against the current window.
pub(crate) fn check_truncation(requested: u64, current: u64, end: u64) -> StorageResult<()> {
    if requested < current || requested > end {
        return Err(crate::error::StorageError::InvalidTruncation {
            requested,
            current,
            end,
        });
    }
    Ok(())
}
