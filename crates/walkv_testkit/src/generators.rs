//! Property-based test generators using proptest.
//!
//! Provides strategies for log records and for transaction workloads that
//! can be replayed against a [`crate::TestBed`] and a simple model.

use proptest::prelude::*;
use std::collections::HashMap;
use walkv_core::{CoreResult, Key, LogRecord, TransactionId};

use crate::fixtures::TestBed;

/// Strategy for generating transaction IDs.
pub fn txid_strategy() -> impl Strategy<Value = TransactionId> {
    any::<u64>().prop_map(TransactionId::new)
}

/// Strategy for generating values, from empty to several chunks long.
pub fn value_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for generating any log record.
pub fn log_record_strategy() -> impl Strategy<Value = LogRecord> {
    prop_oneof![
        1 => txid_strategy().prop_map(|txid| LogRecord::Begin { txid }),
        4 => (txid_strategy(), any::<u64>(), value_strategy(1024))
            .prop_map(|(txid, key, value)| LogRecord::Write { txid, key, value }),
        2 => txid_strategy().prop_map(|txid| LogRecord::Commit { txid }),
        1 => txid_strategy().prop_map(|txid| LogRecord::Abort { txid }),
    ]
}

/// How a planned transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Commit the transaction.
    Commit,
    /// Abort the transaction.
    Abort,
}

/// A transaction to run against a test bed.
#[derive(Debug, Clone)]
pub struct TransactionPlan {
    /// Writes in order.
    pub writes: Vec<(Key, Vec<u8>)>,
    /// How the transaction ends.
    pub outcome: Outcome,
}

/// Strategy for generating one transaction over `keys` distinct keys.
pub fn transaction_strategy(keys: u64, max_value_len: usize) -> impl Strategy<Value = TransactionPlan> {
    (
        prop::collection::vec((0..keys, value_strategy(max_value_len)), 0..6),
        prop_oneof![4 => Just(Outcome::Commit), 1 => Just(Outcome::Abort)],
    )
        .prop_map(|(writes, outcome)| TransactionPlan { writes, outcome })
}

/// Strategy for generating a sequence of transactions.
pub fn workload_strategy(
    min_txns: usize,
    max_txns: usize,
    keys: u64,
) -> impl Strategy<Value = Vec<TransactionPlan>> {
    prop::collection::vec(transaction_strategy(keys, 400), min_txns..max_txns)
}

/// Expected committed state, built alongside a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    values: HashMap<Key, Vec<u8>>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a committed transaction.
    pub fn apply(&mut self, writes: &[(Key, Vec<u8>)]) {
        for (key, value) in writes {
            self.values.insert(*key, value.clone());
        }
    }

    /// Returns the expected value of `key`.
    pub fn get(&self, key: Key) -> Option<&[u8]> {
        self.values.get(&key).map(Vec::as_slice)
    }

    /// Returns the keys that differ between the model and `bed`, checking
    /// every key below `keys`.
    pub fn mismatches(&self, bed: &TestBed, keys: u64) -> Vec<Key> {
        (0..keys)
            .filter(|key| bed.read(*key).as_deref() != self.get(*key))
            .collect()
    }
}

/// Runs `plan` on `bed` and updates `model` if it committed.
///
/// # Errors
///
/// Returns the first error raised by the manager.
pub fn apply_plan(bed: &mut TestBed, model: &mut Model, plan: &TransactionPlan) -> CoreResult<()> {
    let txid = bed.begin()?;
    for (key, value) in &plan.writes {
        bed.manager().write(txid, *key, value.clone())?;
    }
    match plan.outcome {
        Outcome::Commit => {
            bed.manager().commit(txid)?;
            model.apply(&plan.writes);
        }
        Outcome::Abort => bed.manager().abort(txid)?,
    }
    Ok(())
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
