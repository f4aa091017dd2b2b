//! Property tests for the log devices.
//!
//! Both devices are driven with the same random sequence of appends,
//! truncations and reads and compared against a plain byte vector.

use proptest::prelude::*;
use walkv_storage::{FileLogDevice, InMemoryLogDevice, LogDevice, StorageError};

const MAX_RECORD_LEN: usize = 32;

#[derive(Debug, Clone)]
enum Op {
    Append(Vec<u8>),
    /// Moves truncation this percentage of the way to the end.
    Truncate(u8),
    /// Reads at this percentage of the readable window.
    Read(u8, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => prop::collection::vec(any::<u8>(), 1..=MAX_RECORD_LEN).prop_map(Op::Append),
        1 => (0u8..=100).prop_map(Op::Truncate),
        3 => (0u8..100, 1..=MAX_RECORD_LEN).prop_map(|(at, len)| Op::Read(at, len)),
    ]
}

#[derive(Debug, Default)]
struct ModelLog {
    data: Vec<u8>,
    truncation: u64,
}

impl ModelLog {
    fn end(&self) -> u64 {
        self.data.len() as u64
    }

    fn point(&self, percent: u8) -> u64 {
        let window = self.end() - self.truncation;
        self.truncation + window * u64::from(percent) / 100
    }
}

fn check_device(device: &dyn LogDevice, model: &mut ModelLog, ops: &[Op]) -> Result<(), TestCaseError> {
    for op in ops {
        match op {
            Op::Append(bytes) => {
                prop_assert_eq!(device.append(bytes).unwrap(), model.end());
                model.data.extend_from_slice(bytes);
            }
            Op::Truncate(percent) => {
                let target = model.point(*percent);
                device.set_truncation_offset(target).unwrap();
                model.truncation = target;
            }
            Op::Read(percent, len) => {
                if model.end() == model.truncation {
                    continue;
                }
                let offset = model.point(*percent);
                let len = (*len).min((model.end() - offset) as usize);
                let expected = &model.data[offset as usize..offset as usize + len];
                prop_assert_eq!(device.read(offset, len).unwrap(), expected);
            }
        }
        prop_assert_eq!(device.end_offset().unwrap(), model.end());
        prop_assert_eq!(device.truncation_offset().unwrap(), model.truncation);
    }

    if model.truncation > 0 {
        let below = device.read(model.truncation - 1, 1);
        prop_assert!(matches!(below, Err(StorageError::ReadOutOfRange { .. })), "expected ReadOutOfRange");
    }
    let past_end = device.read(model.end(), 1);
    prop_assert!(matches!(past_end, Err(StorageError::ReadOutOfRange { .. })), "expected ReadOutOfRange");
    if model.truncation > 0 {
        let backwards = device.set_truncation_offset(model.truncation - 1);
        prop_assert!(matches!(backwards, Err(StorageError::InvalidTruncation { .. })), "expected InvalidTruncation");
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn memory_device_matches_model(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let device = InMemoryLogDevice::with_max_record_len(MAX_RECORD_LEN);
        let mut model = ModelLog::default();
        check_device(&device, &mut model, &ops)?;
        prop_assert_eq!(device.data(), model.data);
    }

    #[test]
    fn file_device_matches_model_across_reopen(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("props.log");
        let mut model = ModelLog::default();
        {
            let device = FileLogDevice::open_with(&path, MAX_RECORD_LEN, false).unwrap();
            check_device(&device, &mut model, &ops)?;
        }

        let device = FileLogDevice::open_with(&path, MAX_RECORD_LEN, false).unwrap();
        prop_assert_eq!(device.end_offset().unwrap(), model.end());
        prop_assert_eq!(device.truncation_offset().unwrap(), model.truncation);
        let mut offset = model.truncation;
        while offset < model.end() {
            let len = MAX_RECORD_LEN.min((model.end() - offset) as usize);
            let expected = &model.data[offset as usize..offset as usize + len];
            prop_assert_eq!(device.read(offset, len).unwrap(), expected);
            offset += len as u64;
        }
    }
}
