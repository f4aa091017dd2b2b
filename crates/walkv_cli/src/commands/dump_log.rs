//! Dump log command implementation.

use serde::Serialize;
use std::path::Path;
use walkv_core::{Config, LogRecord, LogScanner, RecordAssembler};
use walkv_storage::{FileLogDevice, LogDevice};

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Offset of the record's first chunk.
    pub offset: u64,
    /// Encoded length in bytes.
    pub len: usize,
    /// Record type.
    pub record_type: &'static str,
    /// Transaction ID.
    pub txid: u64,
    /// Key written (writes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<u64>,
    /// Value size in bytes (writes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
}

impl From<(u64, usize, &LogRecord)> for LogRecordInfo {
    fn from((offset, len, record): (u64, usize, &LogRecord)) -> Self {
        let (key, value_size) = match record {
            LogRecord::Write { key, value, .. } => (Some(*key), Some(value.len())),
            _ => (None, None),
        };
        Self {
            offset,
            len,
            record_type: record.record_type().name(),
            txid: record.txid().as_u64(),
            key,
            value_size,
        }
    }
}

/// A record cut short by the end of the log.
#[derive(Debug, Serialize)]
pub struct TornTailInfo {
    /// Offset of the torn record.
    pub offset: u64,
    /// Length its header declares.
    pub declared: usize,
    /// Bytes actually present.
    pub available: usize,
}

/// Decoded contents of a log.
#[derive(Debug, Serialize)]
pub struct LogDump {
    /// Truncation offset of the device.
    pub truncation_offset: u64,
    /// End offset of the device.
    pub end_offset: u64,
    /// Records in log order.
    pub records: Vec<LogRecordInfo>,
    /// Torn record at the end of the log, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torn_tail: Option<TornTailInfo>,
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Log file not found: {}", path.display()).into());
    }

    let device = FileLogDevice::open(path)?;
    let dump = read_log(&device, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
        _ => {
            print_text_output(&dump);
        }
    }

    Ok(())
}

/// Decodes up to `limit` records starting at the truncation offset.
pub fn read_log(
    device: &dyn LogDevice,
    limit: Option<usize>,
) -> Result<LogDump, Box<dyn std::error::Error>> {
    let assembler = RecordAssembler::for_device(&Config::default(), device)?;
    let mut scanner = LogScanner::from_truncation(device, assembler)?;
    let max_records = limit.unwrap_or(usize::MAX);

    let mut records = Vec::new();
    while records.len() < max_records {
        let Some(scanned) = scanner.next() else {
            break;
        };
        let scanned = scanned?;
        records.push(LogRecordInfo::from((
            scanned.offset,
            scanned.len,
            &scanned.record,
        )));
    }

    Ok(LogDump {
        truncation_offset: device.truncation_offset()?,
        end_offset: scanner.end(),
        records,
        torn_tail: scanner.torn_tail().map(|torn| TornTailInfo {
            offset: torn.offset,
            declared: torn.declared,
            available: torn.available,
        }),
    })
}

fn print_text_output(dump: &LogDump) {
    println!(
        "Log Records ({} shown, offsets {}..{})",
        dump.records.len(),
        dump.truncation_offset,
        dump.end_offset
    );
    println!("================");
    println!();

    for record in &dump.records {
        print!(
            "[{:08}] {:7} txid={} len={}",
            record.offset, record.record_type, record.txid, record.len
        );
        if let Some(key) = record.key {
            print!(" key={}", key);
        }
        if let Some(size) = record.value_size {
            print!(" value={} bytes", size);
        }
        println!();
    }

    if let Some(torn) = &dump.torn_tail {
        println!();
        println!(
            "Torn tail at {}: {} of {} bytes present",
            torn.offset, torn.available, torn.declared
        );
    }
}
