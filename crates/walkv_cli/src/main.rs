//! walkv CLI
//!
//! Command-line tools for inspecting walkv transaction logs.
//!
//! # Commands
//!
//! - `dump-log` - Decode and print log records
//! - `verify` - Check a log for corruption and report transaction status
//! - `simulate` - Run the randomized crash stress workload

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// walkv command-line log tools.
#[derive(Parser)]
#[command(name = "walkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode log records from the truncation offset onwards
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify log integrity
    Verify,

    /// Run a seeded crash stress workload against in-memory devices
    Simulate {
        /// Number of transactions to run
        #[arg(short, long, default_value = "500")]
        transactions: usize,

        /// RNG seed
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// Probability that a commit is interrupted by a crash
        #[arg(short, long, default_value = "0.05")]
        crash_probability: f64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::DumpLog { limit, format } => {
            let path = cli.path.ok_or("Log path required for dump-log")?;
            commands::dump_log::run(&path, limit, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Log path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Simulate {
            transactions,
            seed,
            crash_probability,
            format,
        } => {
            commands::simulate::run(transactions, seed, crash_probability, &format)?;
        }
        Commands::Version => {
            println!("walkv CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("walkv core v{}", walkv_core::VERSION);
        }
    }

    Ok(())
}
