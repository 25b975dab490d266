use std::path::PathBuf;

use clap::{Parser, Subcommand};

use levelsmith_rs::{EngineConfig, RunConfig};

#[derive(Parser, Debug)]
#[command(
    name = "levelsmith",
    about = "Support and resistance level engine for daily OHLCV bars"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect levels, track their survival, and write enriched daily output
    #[command(name = "run")]
    Run(RunArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the input CSV file with multi-symbol OHLCV data
    #[arg(long = "csv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub csv_path: PathBuf,

    /// Output directory for the enriched daily and level info files
    #[arg(long = "output-dir", value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// Directory for memoized per-symbol artifacts; omit to disable caching
    #[arg(long = "cache-dir", value_hint = clap::ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,

    /// Proportional breach and close-call distance (0.01 = 1%)
    #[arg(long = "threshold", default_value_t = 0.01)]
    pub threshold: f64,

    /// Number of worker threads (omit to use all logical cores)
    #[arg(long = "workers", alias = "n-jobs")]
    pub workers: Option<usize>,

    /// Ignore cached artifacts and recompute every symbol
    #[arg(long = "force", default_value_t = false)]
    pub force: bool,

    /// Suppress per-symbol progress logging
    #[arg(long = "quiet", default_value_t = false)]
    pub quiet: bool,

    /// Skip writing the log file into the output directory
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,

    /// Append indicator transforms (moving average, RSI, pivot points,
    /// normalized volume) to the enriched output
    #[arg(long = "indicators", default_value_t = false)]
    pub indicators: bool,

    /// Restrict the run to these symbols (repeatable); omit for all symbols
    #[arg(long = "symbol", value_name = "SYMBOL")]
    pub symbols: Vec<String>,
}

impl RunArgs {
    pub fn into_config(self) -> RunConfig {
        RunConfig {
            input_csv: self.csv_path,
            output_dir: self.output_dir,
            cache_dir: self.cache_dir,
            engine: EngineConfig::with_threshold(self.threshold),
            n_workers: self.workers.unwrap_or(0),
            force_recompute: self.force,
            quiet: self.quiet,
            with_indicators: self.indicators,
            symbols: self.symbols,
        }
    }
}
