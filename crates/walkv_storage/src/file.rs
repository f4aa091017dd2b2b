//! File-backed log device for persistent storage.

use crate::device::{check_read_window, check_truncation, LogDevice, DEFAULT_MAX_RECORD_LEN};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Size of the file header: truncation offset, then committed end.
const HEADER_LEN: u64 = 16;

/// Position of the committed end inside the header.
const END_FIELD: u64 = 8;

#[derive(Debug, Clone, Copy)]
struct Window {
    truncation: u64,
    end: u64,
}

/// A file-backed log device.
///
/// # File Layout
///
/// ```text
/// | truncation offset (8, big-endian) | committed end (8, big-endian) | log bytes ... |
/// ```
///
/// Log offsets exclude the header, so offset `0` is the first log byte.
/// Bytes before the truncation offset stay in the file but become unreadable.
///
/// An append writes its bytes first and then moves the committed end past
/// them. Bytes beyond the committed end belong to an append that never
/// returned; they are cut off when the file is opened.
///
/// # Durability
///
/// - With `sync_on_append`, the bytes are synced before the committed end
///   is written, and the header is synced after
/// - Truncation updates are always synced
///
/// # Locking
///
/// The device holds an exclusive advisory lock on the file for its lifetime,
/// so two processes never append to the same log.
///
/// # Example
///
/// ```no_run
/// use walkv_storage::{FileLogDevice, LogDevice};
/// use std::path::Path;
///
/// let log = FileLogDevice::open(Path::new("walkv.log")).unwrap();
/// let offset = log.append(b"persistent data").unwrap();
/// log.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileLogDevice {
    path: PathBuf,
    file: RwLock<File>,
    window: RwLock<Window>,
    max_record_len: usize,
    sync_on_append: bool,
}

impl FileLogDevice {
    /// Opens or creates a log file with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// process, or has a malformed header.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with(path, DEFAULT_MAX_RECORD_LEN, false)
    }

    /// Opens or creates a log file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the log file
    /// * `max_record_len` - Maximum physical record length
    /// * `sync_on_append` - Whether to sync file data after every append
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// process, or has a malformed header.
    pub fn open_with(
        path: &Path,
        max_record_len: usize,
        sync_on_append: bool,
    ) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let file_len = file.metadata()?.len();
        let window = if file_len == 0 {
            file.write_all(&[0u8; HEADER_LEN as usize])?;
            file.sync_all()?;
            Window {
                truncation: 0,
                end: 0,
            }
        } else if file_len < HEADER_LEN {
            return Err(StorageError::Corrupted(format!(
                "file of {file_len} bytes is shorter than its header"
            )));
        } else {
            let mut header = [0u8; HEADER_LEN as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            let window = decode_header(&header)?;

            let on_disk = file_len - HEADER_LEN;
            if on_disk < window.end {
                return Err(StorageError::Corrupted(format!(
                    "committed end {} beyond the {on_disk} log bytes on disk",
                    window.end
                )));
            }
            if on_disk > window.end {
                debug!(
                    path = %path.display(),
                    end = window.end,
                    discarded = on_disk - window.end,
                    "discarding bytes of an unfinished append"
                );
                file.set_len(HEADER_LEN + window.end)?;
                file.sync_all()?;
            }
            window
        };

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            window: RwLock::new(window),
            max_record_len,
            sync_on_append,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.file.read().sync_all()?;
        Ok(())
    }
}

fn decode_header(header: &[u8; HEADER_LEN as usize]) -> StorageResult<Window> {
    let mut truncation = [0u8; 8];
    let mut end = [0u8; 8];
    truncation.copy_from_slice(&header[..END_FIELD as usize]);
    end.copy_from_slice(&header[END_FIELD as usize..]);
    let window = Window {
        truncation: u64::from_be_bytes(truncation),
        end: u64::from_be_bytes(end),
    };
    if window.truncation > window.end {
        return Err(StorageError::Corrupted(format!(
            "truncation offset {} beyond end {}",
            window.truncation, window.end
        )));
    }
    Ok(window)
}

impl LogDevice for FileLogDevice {
    fn append(&self, record: &[u8]) -> StorageResult<u64> {
        if record.len() > self.max_record_len {
            return Err(StorageError::RecordTooLarge {
                len: record.len(),
                max: self.max_record_len,
            });
        }

        let mut file = self.file.write();
        let mut window = self.window.write();

        let offset = window.end;
        let end = offset + record.len() as u64;
        file.seek(SeekFrom::Start(HEADER_LEN + offset))?;
        file.write_all(record)?;
        if self.sync_on_append {
            file.sync_data()?;
        }
        file.seek(SeekFrom::Start(END_FIELD))?;
        file.write_all(&end.to_be_bytes())?;
        if self.sync_on_append {
            file.sync_data()?;
        }
        window.end = end;

        Ok(offset)
    }

    fn read(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut file = self.file.write();
        let window = *self.window.read();
        check_read_window(offset, len, window.truncation, window.end, self.max_record_len)?;

        let mut buffer = vec![0u8; len];
        if len > 0 {
            file.seek(SeekFrom::Start(HEADER_LEN + offset))?;
            file.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }

    fn end_offset(&self) -> StorageResult<u64> {
        Ok(self.window.read().end)
    }

    fn truncation_offset(&self) -> StorageResult<u64> {
        Ok(self.window.read().truncation)
    }

    fn set_truncation_offset(&self, offset: u64) -> StorageResult<()> {
        let mut file = self.file.write();
        let mut window = self.window.write();
        check_truncation(offset, window.truncation, window.end)?;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&offset.to_be_bytes())?;
        file.sync_data()?;
        window.truncation = offset;
        Ok(())
    }

    fn max_record_len(&self) -> usize {
        self.max_record_len
    }
}
