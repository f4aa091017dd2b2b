//! Randomized crash stress testing.
//!
//! Runs a seeded random workload against a [`TestBed`], crashing the log
//! at random physical I/Os and persisting random subsets of storage writes,
//! and checks the recovered state against a model after every restart.

use crate::fixtures::TestBed;
use crate::generators::Model;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::{Duration, Instant};
use walkv_core::{Config, CoreResult, Key};
use walkv_storage::LogDevice;

/// Configuration for a crash stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions to attempt.
    pub transactions: usize,
    /// Maximum writes per transaction.
    pub max_writes_per_txn: usize,
    /// Number of distinct keys.
    pub key_space: u64,
    /// Maximum value length in bytes.
    pub max_value_len: usize,
    /// Probability that a commit is interrupted by a crash.
    pub crash_probability: f64,
    /// Probability that a transaction aborts instead of committing.
    pub abort_probability: f64,
    /// Probability of a persistence pass after a transaction.
    pub persist_probability: f64,
    /// Maximum physical record length of the log.
    pub max_record_len: usize,
    /// RNG seed.
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transactions: 500,
            max_writes_per_txn: 4,
            key_space: 32,
            max_value_len: 600,
            crash_probability: 0.05,
            abort_probability: 0.1,
            persist_probability: 0.3,
            max_record_len: walkv_storage::DEFAULT_MAX_RECORD_LEN,
            seed: 0,
        }
    }
}

/// Result of a crash stress run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StressTestResult {
    /// Transactions attempted.
    pub transactions: usize,
    /// Transactions committed.
    pub committed: usize,
    /// Transactions aborted.
    pub aborted: usize,
    /// Commits interrupted by a crash.
    pub interrupted: usize,
    /// Crashes, including ones between transactions.
    pub crashes: usize,
    /// Torn tails repaired by recovery.
    pub torn_tails: usize,
    /// Writes replayed by all recoveries.
    pub replayed_writes: usize,
    /// Keys checked against the model.
    pub verified_reads: usize,
    /// Descriptions of every divergence from the model.
    pub mismatches: Vec<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl StressTestResult {
    /// Returns true if the recovered state always matched the model.
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Transactions: {}", self.transactions);
        println!("Committed: {}", self.committed);
        println!("Aborted: {}", self.aborted);
        println!("Interrupted commits: {}", self.interrupted);
        println!("Crashes: {}", self.crashes);
        println!("Torn tails repaired: {}", self.torn_tails);
        println!("Replayed writes: {}", self.replayed_writes);
        println!("Verified reads: {}", self.verified_reads);
        println!("Mismatches: {}", self.mismatches.len());
        println!("Duration: {:?}", Duration::from_secs_f64(self.duration_ms / 1000.0));
    }
}

struct StressRun<'a> {
    config: &'a StressConfig,
    bed: TestBed,
    model: Model,
    rng: StdRng,
    result: StressTestResult,
}

impl StressRun<'_> {
    fn random_writes(&mut self) -> Vec<(Key, Vec<u8>)> {
        let count = self.rng.gen_range(0..=self.config.max_writes_per_txn);
        (0..count)
            .map(|_| {
                let key = self.rng.gen_range(0..self.config.key_space);
                let len = self.rng.gen_range(0..=self.config.max_value_len);
                let value = (0..len).map(|_| self.rng.gen()).collect();
                (key, value)
            })
            .collect()
    }

    fn run_transaction(&mut self) -> CoreResult<()> {
        let writes = self.random_writes();
        let txid = self.bed.begin()?;
        for (key, value) in &writes {
            self.bed.manager().write(txid, *key, value.clone())?;
        }

        if self.rng.gen_bool(self.config.abort_probability) {
            self.bed.manager().abort(txid)?;
            self.result.aborted += 1;
            return Ok(());
        }

        let interrupt = self.rng.gen_bool(self.config.crash_probability);
        if interrupt {
            let chunk_len = self.bed.manager().chunk_len();
            let chunks: usize = writes
                .iter()
                .map(|(_, value)| (24 + value.len()).div_ceil(chunk_len))
                .sum::<usize>()
                + 1;
            let budget = self.rng.gen_range(0..chunks) as u64;
            self.bed.device().stop_serving_after(budget);
        }

        match self.bed.manager().commit(txid) {
            Ok(()) => {
                self.model.apply(&writes);
                self.result.committed += 1;
                Ok(())
            }
            Err(err) if interrupt && err.is_unavailable() => {
                self.result.interrupted += 1;
                self.crash_and_verify()
            }
            Err(err) => Err(err),
        }
    }

    fn maybe_persist(&mut self) -> CoreResult<()> {
        if !self.rng.gen_bool(self.config.persist_probability) {
            return Ok(());
        }
        if self.rng.gen_bool(0.5) {
            self.bed.persist_all()?;
        } else {
            let key = self.rng.gen_range(0..self.config.key_space);
            self.bed.storage().persist_key(key)?;
        }
        self.check_truncation();
        Ok(())
    }

    fn check_truncation(&mut self) {
        let Ok(truncation) = self.bed.log().truncation_offset() else {
            return;
        };
        if let Some(min) = self.bed.manager().outstanding_tags().first() {
            if truncation > *min {
                self.result.mismatches.push(format!(
                    "truncation {truncation} passed outstanding tag {min}"
                ));
            }
        }
    }

    fn crash_and_verify(&mut self) -> CoreResult<()> {
        self.result.crashes += 1;
        self.bed.crash();
        let report = self.bed.restart()?;
        if report.torn_tail.is_some() {
            self.result.torn_tails += 1;
        }
        self.result.replayed_writes += report.replayed_writes;

        for key in self.model.mismatches(&self.bed, self.config.key_space) {
            self.result.mismatches.push(format!(
                "key {key} after crash {}: expected {:?} bytes, found {:?} bytes",
                self.result.crashes,
                self.model.get(key).map(<[u8]>::len),
                self.bed.read(key).map(|value| value.len()),
            ));
        }
        self.result.verified_reads += self.config.key_space as usize;
        Ok(())
    }
}

/// Runs a seeded crash stress workload.
///
/// # Errors
///
/// Returns an error if the manager fails in a way the workload did not
/// provoke, such as log corruption found during recovery.
pub fn run_crash_stress(config: &StressConfig) -> CoreResult<StressTestResult> {
    let start = Instant::now();
    let bed = TestBed::with_config(Config::default(), config.max_record_len)?;
    let mut run = StressRun {
        config,
        bed,
        model: Model::new(),
        rng: StdRng::seed_from_u64(config.seed),
        result: StressTestResult::default(),
    };

    for _ in 0..config.transactions {
        run.result.transactions += 1;
        run.run_transaction()?;
        run.maybe_persist()?;
        if run.rng.gen_bool(config.crash_probability / 2.0) {
            run.crash_and_verify()?;
        }
    }
    run.crash_and_verify()?;

    run.result.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    Ok(run.result)
}
