//! Simulate command implementation.

use tracing::info;
use walkv_testkit::{run_crash_stress, StressConfig};

/// Runs the simulate command.
pub fn run(
    transactions: usize,
    seed: u64,
    crash_probability: f64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&crash_probability) {
        return Err(format!("crash probability {crash_probability} is not in [0, 1]").into());
    }

    let config = StressConfig {
        transactions,
        seed,
        crash_probability,
        ..StressConfig::default()
    };
    info!(transactions, seed, crash_probability, "running crash simulation");
    let result = run_crash_stress(&config)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => result.print_summary(&format!("Crash simulation (seed {seed})")),
    }

    if result.passed() {
        Ok(())
    } else {
        Err(format!("{} mismatches against the model", result.mismatches.len()).into())
    }
}
