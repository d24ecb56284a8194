//! Command-line arguments for `powchain`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use powchain_core::{
    constants::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY, PROGRESS_INTERVAL},
    CancelToken, MinerConfig, SearchMode,
};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "powchain", version, propagate_version = true)]
#[command(about = "Build, print and verify a hash-linked proof-of-work chain")]
pub struct Cli {
    /// Default log filter when RUST_LOG is unset (e.g. "info", "powchain_core=debug")
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mine a sample chain, validate it, then tamper with it and validate again
    Demo {
        #[command(flatten)]
        mining: MiningArgs,
    },
    /// Mine a chain holding the given payloads and print it
    Mine {
        #[command(flatten)]
        mining: MiningArgs,

        /// Payload of a block; repeat for more blocks
        #[arg(long = "data", value_name = "PAYLOAD")]
        data: Vec<String>,

        /// Print the chain as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the expected number of hashes per difficulty
    Table {
        /// Highest difficulty to list
        #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(1..=32))]
        max: u32,
    },
}

#[derive(Args, Debug, Clone)]
pub struct MiningArgs {
    /// Required number of leading zero hex digits in every block hash
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_DIFFICULTY,
        value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_DIFFICULTY))
    )]
    pub difficulty: u32,

    /// Search nonces on all cores
    #[arg(long)]
    pub parallel: bool,

    /// Give up on a block after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Log mining progress every N hashes (0 disables)
    #[arg(long, default_value_t = PROGRESS_INTERVAL)]
    pub progress_interval: u64,
}

impl MiningArgs {
    pub fn miner_config(&self, cancel: CancelToken) -> MinerConfig {
        let mode = if self.parallel {
            SearchMode::Parallel
        } else {
            SearchMode::Sequential
        };
        let config = MinerConfig::default()
            .with_mode(mode)
            .with_progress_interval(self.progress_interval)
            .with_cancel(cancel);
        match self.timeout_secs {
            Some(secs) => config.with_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per event
    Json,
}
