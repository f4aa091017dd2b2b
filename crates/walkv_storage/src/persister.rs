//! Background persistence thread for [`InMemoryStorage`].

use crate::error::{StorageError, StorageResult};
use crate::versioned::InMemoryStorage;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Repeatedly runs [`InMemoryStorage::persist_pending`] on its own thread.
///
/// The thread sleeps for `interval` whenever a pass found nothing to do.
/// It exits when stopped or when a pass fails (for example after a crash),
/// in which case the error is returned from [`BackgroundPersister::stop`].
#[derive(Debug)]
pub struct BackgroundPersister {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<StorageResult<()>>>,
}

impl BackgroundPersister {
    /// Spawns the persistence thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(storage: Arc<InMemoryStorage>, interval: Duration) -> StorageResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("walkv-persister".to_string())
            .spawn(move || {
                while !stop_flag.load(Ordering::SeqCst) {
                    match storage.persist_pending() {
                        Ok(true) => {}
                        Ok(false) => thread::sleep(interval),
                        Err(e) => {
                            warn!(error = %e, "background persistence stopped");
                            return Err(e);
                        }
                    }
                }
                debug!("background persister stopped");
                Ok(())
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Returns whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the thread and waits for it.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the thread early, if any.
    pub fn stop(mut self) -> StorageResult<()> {
        self.stop.store(true, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| {
                StorageError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "persister thread panicked",
                ))
            })?,
            None => Ok(()),
        }
    }
}

impl Drop for BackgroundPersister {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
