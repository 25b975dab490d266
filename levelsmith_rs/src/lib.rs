//! Support and resistance level engine for daily OHLCV bars.
//!
//! The core chain per symbol: detect strict local extrema, track each one
//! through an absorbing survival state machine, flip broken levels into
//! second-generation candidates of the opposite polarity, count close calls
//! against surviving levels, and project the nearest live support and
//! resistance onto every trading day. A batch runner fans symbols across a
//! worker pool and memoizes per-symbol artifacts in a Parquet cache.

pub mod bar;
pub mod closecall;
pub mod config;
pub mod data;
pub mod detect;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod matrix;
pub mod pairwise;
pub mod project;
pub mod roleflip;
pub mod runner;
pub mod storage;
pub mod survival;

pub use bar::{Bar, BarSeries, Polarity, PriceField};
pub use config::{EngineConfig, RunConfig};
pub use engine::{run_symbol, run_symbol_with_store, LevelInfo, LevelTable, SymbolReport};
pub use error::EngineError;
pub use runner::{run, RunSummary};
pub use storage::LevelStore;
