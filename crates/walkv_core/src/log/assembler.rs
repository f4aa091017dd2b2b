//! Splitting logical records into physical chunks and back.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::log::record::{LogRecord, HEADER_LEN};
use walkv_storage::LogDevice;

/// Result of appending one logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendedRecord {
    /// Offset of the first chunk. This is the record's tag.
    pub offset: u64,
    /// Encoded length of the record.
    pub len: usize,
    /// Number of physical appends used.
    pub chunks: usize,
}

/// A record whose declared extent runs past the end of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TornRecord {
    /// Offset where the record starts.
    pub offset: u64,
    /// Size declared by the record header.
    pub declared: usize,
    /// Bytes actually present before the end of the log.
    pub available: usize,
}

impl TornRecord {
    /// Returns how many bytes are missing.
    #[must_use]
    pub fn missing(&self) -> usize {
        self.declared - self.available
    }
}

/// Outcome of reassembling the record at one offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembledRecord {
    /// A complete record.
    Complete {
        /// The decoded record.
        record: LogRecord,
        /// Its encoded length.
        len: usize,
    },
    /// The log ends inside the record.
    Torn(TornRecord),
}

/// Splits records into physical chunks on append and reassembles them on
/// read.
///
/// Both directions consume the record sequentially: chunk `i` covers bytes
/// `[i * chunk_len, (i + 1) * chunk_len)` of the encoding and lands at
/// `offset + i * chunk_len` in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordAssembler {
    chunk_len: usize,
}

impl RecordAssembler {
    /// Creates an assembler that uses chunks of at most `chunk_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_len` cannot hold a record header.
    pub fn new(chunk_len: usize) -> CoreResult<Self> {
        if chunk_len < HEADER_LEN {
            return Err(CoreError::invalid_config(format!(
                "chunk length {chunk_len} is smaller than the {HEADER_LEN}-byte record header"
            )));
        }
        Ok(Self { chunk_len })
    }

    /// Creates an assembler for `device`, honoring both the configured and
    /// the device maximum.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting chunk length cannot hold a header.
    pub fn for_device(config: &Config, device: &dyn LogDevice) -> CoreResult<Self> {
        Self::new(config.max_chunk_len.min(device.max_record_len()))
    }

    /// Returns the chunk length.
    #[must_use]
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Returns how many chunks a record of `len` bytes needs.
    #[must_use]
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_len)
    }

    /// Encodes `record` and appends it in chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or any append fails. A failure
    /// after the first chunk leaves a torn record at the end of the log.
    pub fn append(&self, device: &dyn LogDevice, record: &LogRecord) -> CoreResult<AppendedRecord> {
        let bytes = record.encode()?;
        self.append_bytes(device, &bytes)
    }

    /// Appends already encoded bytes in chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is empty, any append fails, or another
    /// writer interleaved an append between two chunks.
    pub fn append_bytes(&self, device: &dyn LogDevice, bytes: &[u8]) -> CoreResult<AppendedRecord> {
        if bytes.is_empty() {
            return Err(CoreError::invalid_argument("cannot append an empty record"));
        }

        let mut first = None;
        let mut expected = 0u64;
        let mut chunks = 0;
        for chunk in bytes.chunks(self.chunk_len) {
            let offset = device.append(chunk)?;
            match first {
                None => first = Some(offset),
                Some(_) if offset != expected => {
                    return Err(CoreError::log_corruption(format!(
                        "chunk landed at {offset}, expected {expected}: concurrent appender"
                    )));
                }
                Some(_) => {}
            }
            expected = offset + chunk.len() as u64;
            chunks += 1;
        }

        Ok(AppendedRecord {
            offset: first.unwrap_or_default(),
            len: bytes.len(),
            chunks,
        })
    }

    /// Reassembles the record starting at `offset` in a log ending at `end`.
    ///
    /// Reads the header first, then reads the whole declared extent from
    /// `offset` in sequential chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than [`HEADER_LEN`] bytes remain, the
    /// record is structurally invalid, or a read fails.
    pub fn read(&self, device: &dyn LogDevice, offset: u64, end: u64) -> CoreResult<AssembledRecord> {
        let available = end.saturating_sub(offset);
        if available < HEADER_LEN as u64 {
            return Err(CoreError::log_corruption(format!(
                "partial record header at offset {offset}: {available} bytes before end {end}"
            )));
        }

        let header = device.read(offset, HEADER_LEN)?;
        let declared = LogRecord::declared_size(&header).map_err(|err| at_offset(err, offset))?;
        if declared as u64 > available {
            return Ok(AssembledRecord::Torn(TornRecord {
                offset,
                declared,
                available: available as usize,
            }));
        }

        let mut bytes = Vec::with_capacity(declared);
        let mut position = offset;
        while bytes.len() < declared {
            let len = self.chunk_len.min(declared - bytes.len());
            bytes.extend_from_slice(&device.read(position, len)?);
            position += len as u64;
        }

        let record = LogRecord::decode(&bytes).map_err(|err| at_offset(err, offset))?;
        Ok(AssembledRecord::Complete {
            record,
            len: declared,
        })
    }

    /// Fills the missing bytes of a torn record with zeros.
    ///
    /// The log must still end exactly where the torn record was observed.
    /// Returns the number of bytes appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the log end moved or an append fails.
    pub fn pad(&self, device: &dyn LogDevice, torn: &TornRecord) -> CoreResult<usize> {
        let end = device.end_offset()?;
        if end != torn.offset + torn.available as u64 {
            return Err(CoreError::invalid_argument(format!(
                "log end {end} moved since torn record at {} was observed",
                torn.offset
            )));
        }

        let missing = torn.missing();
        let zeros = vec![0u8; self.chunk_len.min(missing)];
        let mut remaining = missing;
        while remaining > 0 {
            let len = remaining.min(zeros.len());
            device.append(&zeros[..len])?;
            remaining -= len;
        }
        Ok(missing)
    }
}

fn at_offset(err: CoreError, offset: u64) -> CoreError {
    match err {
        CoreError::LogCorruption { message } => {
            CoreError::log_corruption(format!("{message} at offset {offset}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionId;
    use proptest::prelude::*;
    use walkv_storage::InMemoryLogDevice;

    fn write(txid: u64, key: u64, len: usize) -> LogRecord {
        LogRecord::Write {
            txid: TransactionId::new(txid),
            key,
            value: (0..len).map(|i| (i % 251) as u8).collect(),
        }
    }

    #[test]
    fn chunk_len_below_header_is_rejected() {
        assert!(RecordAssembler::new(15).is_err());
        assert!(RecordAssembler::new(16).is_ok());
    }

    #[test]
    fn for_device_uses_smaller_limit() {
        let device = InMemoryLogDevice::with_max_record_len(64);
        let assembler = RecordAssembler::for_device(&Config::default(), &device).unwrap();
        assert_eq!(assembler.chunk_len(), 64);

        let config = Config::new().max_chunk_len(32);
        let assembler = RecordAssembler::for_device(&config, &device).unwrap();
        assert_eq!(assembler.chunk_len(), 32);
    }

    #[test]
    fn single_chunk_record() {
        let device = InMemoryLogDevice::new();
        let assembler = RecordAssembler::new(128).unwrap();
        let record = write(1, 10, 20);

        let appended = assembler.append(&device, &record).unwrap();
        assert_eq!(appended.offset, 0);
        assert_eq!(appended.len, 44);
        assert_eq!(appended.chunks, 1);

        let end = device.end_offset().unwrap();
        assert_eq!(
            assembler.read(&device, 0, end).unwrap(),
            AssembledRecord::Complete { record, len: 44 }
        );
    }

    #[test]
    fn multi_chunk_record_roundtrip() {
        let device = InMemoryLogDevice::new();
        let assembler = RecordAssembler::new(128).unwrap();

        let first = write(1, 1, 500);
        let second = write(1, 2, 1000);
        let a = assembler.append(&device, &first).unwrap();
        let b = assembler.append(&device, &second).unwrap();

        assert_eq!(a.offset, 0);
        assert_eq!(a.chunks, 5);
        assert_eq!(b.offset, 524);
        assert_eq!(b.chunks, 8);

        let end = device.end_offset().unwrap();
        assert_eq!(end, 524 + 1024);
        assert_eq!(
            assembler.read(&device, a.offset, end).unwrap(),
            AssembledRecord::Complete { record: first, len: 524 }
        );
        assert_eq!(
            assembler.read(&device, b.offset, end).unwrap(),
            AssembledRecord::Complete { record: second, len: 1024 }
        );
    }

    #[test]
    fn chunks_are_laid_out_sequentially() {
        let device = InMemoryLogDevice::new();
        let assembler = RecordAssembler::new(16).unwrap();
        let record = write(9, 3, 40);
        let encoded = record.encode().unwrap();

        assembler.append(&device, &record).unwrap();
        assert_eq!(device.data(), encoded);
    }

    #[test]
    fn read_with_different_chunk_len() {
        let device = InMemoryLogDevice::new();
        let record = write(2, 5, 300);
        RecordAssembler::new(128)
            .unwrap()
            .append(&device, &record)
            .unwrap();

        let reader = RecordAssembler::new(16).unwrap();
        let end = device.end_offset().unwrap();
        match reader.read(&device, 0, end).unwrap() {
            AssembledRecord::Complete { record: read, .. } => assert_eq!(read, record),
            other => panic!("expected complete record, got {other:?}"),
        }
    }

    #[test]
    fn torn_record_is_reported() {
        let device = InMemoryLogDevice::new();
        let assembler = RecordAssembler::new(128).unwrap();
        let encoded = write(1, 1, 300).encode().unwrap();
        device.append(&encoded[..128]).unwrap();
        device.append(&encoded[128..256]).unwrap();

        let torn = match assembler.read(&device, 0, 256).unwrap() {
            AssembledRecord::Torn(torn) => torn,
            other => panic!("expected torn record, got {other:?}"),
        };
        assert_eq!(
            torn,
            TornRecord {
                offset: 0,
                declared: 324,
                available: 256,
            }
        );
        assert_eq!(torn.missing(), 68);
    }

    #[test]
    fn pad_completes_torn_record() {
        let device = InMemoryLogDevice::new();
        let assembler = RecordAssembler::new(32).unwrap();
        let encoded = write(1, 1, 100).encode().unwrap();
        device.append(&encoded[..32]).unwrap();

        let end = device.end_offset().unwrap();
        let AssembledRecord::Torn(torn) = assembler.read(&device, 0, end).unwrap() else {
            panic!("expected torn record");
        };
        assert_eq!(assembler.pad(&device, &torn).unwrap(), 92);
        assert_eq!(device.end_offset().unwrap(), 124);

        // The padded record decodes with a zeroed tail.
        match assembler.read(&device, 0, 124).unwrap() {
            AssembledRecord::Complete { record, len } => {
                assert_eq!(len, 124);
                let LogRecord::Write { value, .. } = record else {
                    panic!("expected write record");
                };
                assert_eq!(&value[..8], &encoded[24..32]);
                assert!(value[8..].iter().all(|b| *b == 0));
            }
            other => panic!("expected complete record, got {other:?}"),
        }
    }

    #[test]
    fn pad_rejects_moved_end() {
        let device = InMemoryLogDevice::new();
        let assembler = RecordAssembler::new(32).unwrap();
        let torn = TornRecord {
            offset: 0,
            declared: 64,
            available: 0,
        };
        device.append(&[1; 8]).unwrap();
        assert!(assembler.pad(&device, &torn).is_err());
    }

    #[test]
    fn partial_header_is_corruption() {
        let device = InMemoryLogDevice::new();
        device.append(&[0; 10]).unwrap();
        let assembler = RecordAssembler::new(128).unwrap();
        assert!(matches!(
            assembler.read(&device, 0, 10),
            Err(CoreError::LogCorruption { .. })
        ));
    }

    #[test]
    fn empty_append_is_rejected() {
        let device = InMemoryLogDevice::new();
        let assembler = RecordAssembler::new(128).unwrap();
        assert!(assembler.append_bytes(&device, &[]).is_err());
        assert_eq!(device.end_offset().unwrap(), 0);
    }

    proptest! {
        #[test]
        fn chunked_roundtrip(
            chunk_len in 16usize..=128,
            lens in prop::collection::vec(0usize..2048, 1..6),
        ) {
            let device = InMemoryLogDevice::new();
            let assembler = RecordAssembler::new(chunk_len).unwrap();

            let records: Vec<LogRecord> = lens
                .iter()
                .enumerate()
                .map(|(i, len)| write(i as u64, i as u64 * 7, *len))
                .collect();
            let appended: Vec<AppendedRecord> = records
                .iter()
                .map(|r| assembler.append(&device, r).unwrap())
                .collect();

            let end = device.end_offset().unwrap();
            for (record, at) in records.iter().zip(&appended) {
                prop_assert_eq!(at.chunks, assembler.chunk_count(record.size()));
                match assembler.read(&device, at.offset, end).unwrap() {
                    AssembledRecord::Complete { record: read, len } => {
                        prop_assert_eq!(&read, record);
                        prop_assert_eq!(len, record.size());
                    }
                    AssembledRecord::Torn(torn) => prop_assert!(false, "unexpected torn {:?}", torn),
                }
            }
        }
    }
}
