//! Logical log record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::{Key, TransactionId};

/// Length of the fixed header every record starts with.
/// txid (8) + type (4) + size (4) = 16 bytes
pub const HEADER_LEN: usize = 16;

/// Length of a `Write` record before its value.
/// header (16) + key (8) = 24 bytes
pub const WRITE_PREFIX_LEN: usize = HEADER_LEN + 8;

/// Byte range of the size field within the header.
const SIZE_FIELD: std::ops::Range<usize> = 12..16;

/// Type of a logical log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LogRecordType {
    /// Begin a transaction.
    Begin = 0,
    /// Write a key/value pair.
    Write = 1,
    /// Commit a transaction.
    Commit = 2,
    /// Abort a transaction.
    Abort = 3,
}

impl LogRecordType {
    /// Converts a raw type field to a record type.
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Begin),
            1 => Some(Self::Write),
            2 => Some(Self::Commit),
            3 => Some(Self::Abort),
            _ => None,
        }
    }

    /// Converts the record type to its raw type field.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Returns a short uppercase name for display.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Begin => "BEGIN",
            Self::Write => "WRITE",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
        }
    }
}

/// A logical record in the transaction log.
///
/// # Binary Layout
///
/// ```text
/// | txid (8) | type (4) | size (4) | key (8, Write only) | value (size - 24, Write only) |
/// ```
///
/// All integers are big-endian. `size` covers the whole record including the
/// header, so a reader that has seen the first [`HEADER_LEN`] bytes knows how
/// many more to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Begin a transaction.
    Begin {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Write a value under a key.
    Write {
        /// Transaction ID.
        txid: TransactionId,
        /// Key being written.
        key: Key,
        /// New value.
        value: Vec<u8>,
    },

    /// Commit a transaction.
    Commit {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Abort a transaction.
    Abort {
        /// Transaction ID.
        txid: TransactionId,
    },
}

impl LogRecord {
    /// Maximum value length of a `Write` record.
    ///
    /// The size field is 4 bytes and covers the 24-byte prefix.
    pub const MAX_VALUE_LEN: usize = u32::MAX as usize - WRITE_PREFIX_LEN;

    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Begin { .. } => LogRecordType::Begin,
            Self::Write { .. } => LogRecordType::Write,
            Self::Commit { .. } => LogRecordType::Commit,
            Self::Abort { .. } => LogRecordType::Abort,
        }
    }

    /// Returns the owning transaction.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        match self {
            Self::Begin { txid }
            | Self::Write { txid, .. }
            | Self::Commit { txid }
            | Self::Abort { txid } => *txid,
        }
    }

    /// Returns the encoded length of this record.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Write { value, .. } => WRITE_PREFIX_LEN + value.len(),
            _ => HEADER_LEN,
        }
    }

    /// Serializes the record into exactly [`LogRecord::size`] bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if a `Write` value exceeds [`Self::MAX_VALUE_LEN`].
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let size = self.size();
        let size_field = u32::try_from(size).map_err(|_| {
            CoreError::invalid_argument(format!(
                "value too large: record of {size} bytes exceeds the 4-byte size field"
            ))
        })?;

        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&self.txid().as_u64().to_be_bytes());
        buf.extend_from_slice(&self.record_type().as_u32().to_be_bytes());
        buf.extend_from_slice(&size_field.to_be_bytes());

        if let Self::Write { key, value, .. } = self {
            buf.extend_from_slice(&key.to_be_bytes());
            buf.extend_from_slice(value);
        }

        debug_assert_eq!(buf.len(), size);
        Ok(buf)
    }

    /// Reads the declared record size from a record header.
    ///
    /// # Errors
    ///
    /// Returns an error if `header` is shorter than [`HEADER_LEN`] or declares
    /// a size smaller than a header.
    pub fn declared_size(header: &[u8]) -> CoreResult<usize> {
        if header.len() < HEADER_LEN {
            return Err(CoreError::log_corruption(format!(
                "record header needs {HEADER_LEN} bytes, got {}",
                header.len()
            )));
        }
        let size = read_u32(&header[SIZE_FIELD]) as usize;
        if size < HEADER_LEN {
            return Err(CoreError::log_corruption(format!(
                "declared record size {size} is smaller than its header"
            )));
        }
        Ok(size)
    }

    /// Deserializes one record from the start of `bytes`.
    ///
    /// Only the declared number of bytes is consumed; anything after it is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the header is malformed, the type is
    /// unknown, the declared size does not fit the type, or `bytes` is
    /// shorter than the declared size.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let size = Self::declared_size(bytes)?;
        if bytes.len() < size {
            return Err(CoreError::log_corruption(format!(
                "declared record size {size} exceeds {} available bytes",
                bytes.len()
            )));
        }

        let txid = TransactionId::new(read_u64(&bytes[0..8]));
        let raw_type = read_u32(&bytes[8..12]);
        let record_type = LogRecordType::from_u32(raw_type)
            .ok_or_else(|| CoreError::log_corruption(format!("unknown record type {raw_type}")))?;

        match record_type {
            LogRecordType::Write => {
                if size < WRITE_PREFIX_LEN {
                    return Err(CoreError::log_corruption(format!(
                        "write record of {size} bytes is shorter than {WRITE_PREFIX_LEN}"
                    )));
                }
                let key = read_u64(&bytes[HEADER_LEN..WRITE_PREFIX_LEN]);
                let value = bytes[WRITE_PREFIX_LEN..size].to_vec();
                Ok(Self::Write { txid, key, value })
            }
            fixed => {
                if size != HEADER_LEN {
                    return Err(CoreError::log_corruption(format!(
                        "{} record declares {size} bytes, expected {HEADER_LEN}",
                        fixed.name()
                    )));
                }
                Ok(match fixed {
                    LogRecordType::Begin => Self::Begin { txid },
                    LogRecordType::Commit => Self::Commit { txid },
                    _ => Self::Abort { txid },
                })
            }
        }
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}
