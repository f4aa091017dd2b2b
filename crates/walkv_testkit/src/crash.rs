//! Crash recovery testing for walkv.
//!
//! A crash is modelled as a log device that stops serving requests after a
//! chosen number of physical I/Os, combined with a storage layer that loses
//! every write it had not persisted yet.
//!
//! ## Test Strategy
//!
//! 1. **Crash after commit** - committed data must survive
//! 2. **Crash during commit** - a partially logged transaction must vanish
//! 3. **Crash inside a multi-chunk record** - the torn tail must be repaired
//!    so later commits survive the next crash
//! 4. **Partial persistence** - truncation must stay below every
//!    outstanding tag
//!
//! ## Usage
//!
//! ```rust
//! use walkv_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! harness.run_all();
//! assert!(harness.all_passed());
//! ```

use crate::fixtures::TestBed;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use walkv_core::{CoreResult, Key};
use walkv_storage::{LogDevice, StorageError, StorageResult};

/// A log device wrapper that can simulate crashes.
///
/// Every `append` and `read` counts as one physical I/O. Once the budget set
/// by [`CrashableLogDevice::stop_serving_after`] is spent, the device
/// crashes and every call fails with [`StorageError::Unavailable`].
pub struct CrashableLogDevice {
    inner: Arc<dyn LogDevice>,
    /// I/O count at which the device crashes.
    crash_at: AtomicU64,
    io_count: AtomicU64,
    crashed: AtomicBool,
}

impl CrashableLogDevice {
    /// Wraps `inner`. The wrapper never crashes until told to.
    pub fn new(inner: Arc<dyn LogDevice>) -> Self {
        Self {
            inner,
            crash_at: AtomicU64::new(u64::MAX),
            io_count: AtomicU64::new(0),
            crashed: AtomicBool::new(false),
        }
    }

    /// Lets `ios` more physical I/Os succeed, then crashes.
    pub fn stop_serving_after(&self, ios: u64) {
        let now = self.io_count.load(Ordering::SeqCst);
        self.crash_at.store(now.saturating_add(ios), Ordering::SeqCst);
    }

    /// Crashes immediately.
    pub fn crash_now(&self) {
        self.crashed.store(true, Ordering::SeqCst);
    }

    /// Returns whether the device has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Returns the number of physical I/Os served or refused so far.
    pub fn io_count(&self) -> u64 {
        self.io_count.load(Ordering::SeqCst)
    }

    fn ensure_serving(&self) -> StorageResult<()> {
        if self.has_crashed() {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }

    fn admit_io(&self) -> StorageResult<()> {
        self.ensure_serving()?;
        let n = self.io_count.fetch_add(1, Ordering::SeqCst);
        if n >= self.crash_at.load(Ordering::SeqCst) {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }
}

impl LogDevice for CrashableLogDevice {
    fn append(&self, record: &[u8]) -> StorageResult<u64> {
        self.admit_io()?;
        self.inner.append(record)
    }

    fn read(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.admit_io()?;
        self.inner.read(offset, len)
    }

    fn end_offset(&self) -> StorageResult<u64> {
        self.ensure_serving()?;
        self.inner.end_offset()
    }

    fn truncation_offset(&self) -> StorageResult<u64> {
        self.ensure_serving()?;
        self.inner.truncation_offset()
    }

    fn set_truncation_offset(&self, offset: u64) -> StorageResult<()> {
        self.ensure_serving()?;
        self.inner.set_truncation_offset(offset)
    }

    fn max_record_len(&self) -> usize {
        self.inner.max_record_len()
    }
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected visible keys after recovery.
    pub expected_keys: usize,
    /// Actual visible keys after recovery.
    pub actual_keys: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, keys: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_keys: keys,
            actual_keys: keys,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_keys: expected,
            actual_keys: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Test harness for crash recovery scenarios.
#[derive(Debug, Default)]
pub struct CrashRecoveryHarness {
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new crash recovery harness.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(
        &mut self,
        description: &str,
        expected: usize,
        outcome: CoreResult<CrashRecoveryResult>,
    ) -> CrashRecoveryResult {
        let result = outcome.unwrap_or_else(|e| {
            CrashRecoveryResult::fail(description, expected, 0, &e.to_string())
        });
        self.results.push(result.clone());
        result
    }

    /// Tests that committed data survives a crash.
    pub fn test_committed_data_survives(&mut self) -> CrashRecoveryResult {
        const DESCRIPTION: &str = "Committed data survives crash";
        let outcome = (|| -> CoreResult<CrashRecoveryResult> {
            let mut bed = TestBed::new()?;
            for key in 0..10u64 {
                bed.commit(&[(key, vec![key as u8; 100])])?;
            }

            bed.crash();
            bed.restart()?;

            let found = (0..10u64)
                .filter(|key| bed.read(*key) == Some(vec![*key as u8; 100]))
                .count();
            Ok(if found == 10 {
                CrashRecoveryResult::pass(DESCRIPTION, 10)
            } else {
                CrashRecoveryResult::fail(DESCRIPTION, 10, found, "some keys were lost")
            })
        })();
        self.record(DESCRIPTION, 10, outcome)
    }

    /// Tests that a transaction interrupted mid-commit leaves no trace.
    pub fn test_partial_commit_discarded(&mut self) -> CrashRecoveryResult {
        const DESCRIPTION: &str = "Partially logged transaction discarded";
        let outcome = (|| -> CoreResult<CrashRecoveryResult> {
            let mut bed = TestBed::new()?;
            bed.commit(&[(1, b"committed".to_vec())])?;

            // Two 3-chunk writes; the crash hits the second one.
            let txid = bed.begin()?;
            bed.manager().write(txid, 2, vec![2; 300])?;
            bed.manager().write(txid, 3, vec![3; 300])?;
            bed.device().stop_serving_after(4);
            match bed.manager().commit(txid) {
                Err(err) if err.is_unavailable() => {}
                Err(err) => return Err(err),
                Ok(()) => {
                    return Ok(CrashRecoveryResult::fail(
                        DESCRIPTION,
                        1,
                        3,
                        "commit succeeded on a crashed device",
                    ))
                }
            }

            bed.crash();
            bed.restart()?;

            let visible = visible_keys(&bed, &[1, 2, 3]);
            Ok(if visible == [1] {
                CrashRecoveryResult::pass(DESCRIPTION, 1)
            } else {
                CrashRecoveryResult::fail(
                    DESCRIPTION,
                    1,
                    visible.len(),
                    "uncommitted writes visible after recovery",
                )
            })
        })();
        self.record(DESCRIPTION, 1, outcome)
    }

    /// Tests that commits after a repaired torn tail survive another crash.
    pub fn test_torn_record_repaired(&mut self) -> CrashRecoveryResult {
        const DESCRIPTION: &str = "Torn multi-chunk record repaired";
        let outcome = (|| -> CoreResult<CrashRecoveryResult> {
            let mut bed = TestBed::new()?;
            bed.commit(&[(1, b"before".to_vec())])?;

            let txid = bed.begin()?;
            bed.manager().write(txid, 2, vec![2; 500])?;
            bed.device().stop_serving_after(2);
            if bed.manager().commit(txid).is_ok() {
                return Ok(CrashRecoveryResult::fail(
                    DESCRIPTION,
                    2,
                    0,
                    "commit succeeded on a crashed device",
                ));
            }

            bed.crash();
            let report = bed.restart()?.clone();
            if report.torn_tail.is_none() {
                return Ok(CrashRecoveryResult::fail(
                    DESCRIPTION,
                    2,
                    0,
                    "torn tail not detected",
                ));
            }

            bed.commit(&[(3, b"after".to_vec())])?;
            bed.crash();
            bed.restart()?;

            let visible = visible_keys(&bed, &[1, 2, 3]);
            Ok(if visible == [1, 3] {
                CrashRecoveryResult::pass(DESCRIPTION, 2)
            } else {
                CrashRecoveryResult::fail(
                    DESCRIPTION,
                    2,
                    visible.len(),
                    "wrong keys visible after repair",
                )
            })
        })();
        self.record(DESCRIPTION, 2, outcome)
    }

    /// Tests that truncation never passes an outstanding write.
    pub fn test_truncation_bounded(&mut self) -> CrashRecoveryResult {
        const DESCRIPTION: &str = "Truncation bounded by outstanding tags";
        let outcome = (|| -> CoreResult<CrashRecoveryResult> {
            let mut bed = TestBed::new()?;
            for key in 0..8u64 {
                bed.commit(&[(key, vec![key as u8; 40])])?;
            }

            bed.storage().block_persistence_for_keys(&[3]);
            bed.persist_all()?;
            let truncation = bed.log().truncation_offset()?;
            let outstanding = bed.manager().outstanding_tags();
            let Some(min) = outstanding.first().copied() else {
                return Ok(CrashRecoveryResult::fail(
                    DESCRIPTION,
                    8,
                    0,
                    "blocked write not outstanding",
                ));
            };
            if truncation > min {
                return Ok(CrashRecoveryResult::fail(
                    DESCRIPTION,
                    8,
                    0,
                    "truncation passed an outstanding tag",
                ));
            }

            bed.crash();
            bed.restart()?;
            let visible = visible_keys(&bed, &(0..8).collect::<Vec<_>>());
            Ok(if visible.len() == 8 {
                CrashRecoveryResult::pass(DESCRIPTION, 8)
            } else {
                CrashRecoveryResult::fail(
                    DESCRIPTION,
                    8,
                    visible.len(),
                    "keys lost after partial persistence",
                )
            })
        })();
        self.record(DESCRIPTION, 8, outcome)
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> &[CrashRecoveryResult] {
        self.test_committed_data_survives();
        self.test_partial_commit_discarded();
        self.test_torn_record_repaired();
        self.test_truncation_bounded();
        &self.results
    }

    /// Returns true if every recorded scenario passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Prints a summary of all results.
    pub fn print_summary(&self) {
        println!("\n=== Crash Recovery Test Results ===\n");
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            println!("[{status}] {}", result.description);
            if let Some(error) = &result.error {
                println!("       Error: {error}");
            }
        }
        let passed = self.results.iter().filter(|r| r.passed).count();
        println!("\nTotal: {passed}/{} passed", self.results.len());
    }
}

fn visible_keys(bed: &TestBed, keys: &[Key]) -> Vec<Key> {
    keys.iter()
        .copied()
        .filter(|key| bed.read(*key).is_some())
        .collect()
}
