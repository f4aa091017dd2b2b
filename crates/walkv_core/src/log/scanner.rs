//! Sequential log scanning.

use crate::error::CoreResult;
use crate::log::assembler::{AssembledRecord, RecordAssembler, TornRecord};
use crate::log::record::LogRecord;
use walkv_storage::LogDevice;

/// A logical record found by a [`LogScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Offset of the record's first byte; the tag of a `Write`.
    pub offset: u64,
    /// Encoded length.
    pub len: usize,
    /// The decoded record.
    pub record: LogRecord,
}

/// An iterator over the logical records of a log device.
///
/// The scan covers `[start, end)` where `end` is the device end offset at
/// construction time. Records appended afterwards are not visited.
///
/// # Error Handling
///
/// - A torn record at the end of the log ends the iteration and is
///   available from [`LogScanner::torn_tail`]
/// - A partial header or an invalid record yields an error, after which the
///   iterator is exhausted
///
/// # Example
///
/// ```rust
/// use walkv_core::log::{LogScanner, RecordAssembler};
/// use walkv_storage::InMemoryLogDevice;
///
/// let device = InMemoryLogDevice::new();
/// let assembler = RecordAssembler::new(128).unwrap();
/// let mut scanner = LogScanner::from_truncation(&device, assembler).unwrap();
/// assert!(scanner.next().is_none());
/// ```
pub struct LogScanner<'a> {
    device: &'a dyn LogDevice,
    assembler: RecordAssembler,
    position: u64,
    end: u64,
    torn: Option<TornRecord>,
    finished: bool,
}

impl<'a> LogScanner<'a> {
    /// Creates a scanner over `[start, device end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the end offset cannot be read.
    pub fn new(device: &'a dyn LogDevice, assembler: RecordAssembler, start: u64) -> CoreResult<Self> {
        let end = device.end_offset()?;
        Ok(Self::range(device, assembler, start, end))
    }

    /// Creates a scanner over an explicit `[start, end)` range.
    #[must_use]
    pub fn range(device: &'a dyn LogDevice, assembler: RecordAssembler, start: u64, end: u64) -> Self {
        Self {
            device,
            assembler,
            position: start,
            end,
            torn: None,
            finished: false,
        }
    }

    /// Creates a scanner starting at the device's truncation offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the device window cannot be read.
    pub fn from_truncation(device: &'a dyn LogDevice, assembler: RecordAssembler) -> CoreResult<Self> {
        let start = device.truncation_offset()?;
        Self::new(device, assembler, start)
    }

    /// Returns the offset of the next record to be read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the end of the scanned range.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Returns the torn record that ended the scan, if any.
    #[must_use]
    pub fn torn_tail(&self) -> Option<TornRecord> {
        self.torn
    }

    fn read_next(&mut self) -> CoreResult<Option<ScannedRecord>> {
        if self.finished || self.position >= self.end {
            self.finished = true;
            return Ok(None);
        }

        let offset = self.position;
        match self.assembler.read(self.device, offset, self.end)? {
            AssembledRecord::Complete { record, len } => {
                self.position += len as u64;
                Ok(Some(ScannedRecord {
                    offset,
                    len,
                    record,
                }))
            }
            AssembledRecord::Torn(torn) => {
                self.torn = Some(torn);
                self.finished = true;
                Ok(None)
            }
        }
    }
}

impl Iterator for LogScanner<'_> {
    type Item = CoreResult<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
