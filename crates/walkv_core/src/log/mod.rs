//! Transaction log records and their physical layout.
//!
//! ## Record Format
//!
//! ```text
//! | txid (8) | type (4) | size (4) | key (8, Write only) | value (N, Write only) |
//! ```
//!
//! ## Chunking
//!
//! A log device accepts appends no larger than its maximum physical record
//! length. A logical record that is larger is split into consecutive chunks
//! by the [`RecordAssembler`] and stitched back together on read, driven by
//! the `size` field of the header. The header is always inside the first
//! chunk because a chunk is never shorter than [`HEADER_LEN`].
//!
//! ## Scan Policy
//!
//! - A record whose declared size runs past the end of the log is a **torn
//!   tail**. It is tolerated and ends the scan.
//! - A partial header, an unknown type or a size that does not fit the type
//!   is **log corruption** and aborts the scan.

mod assembler;
mod record;
mod scanner;

pub use assembler::{AppendedRecord, AssembledRecord, RecordAssembler, TornRecord};
pub use record::{LogRecord, LogRecordType, HEADER_LEN, WRITE_PREFIX_LEN};
pub use scanner::{LogScanner, ScannedRecord};
