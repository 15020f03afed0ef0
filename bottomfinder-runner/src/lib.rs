//! Bottomfinder Runner: orchestration around `bottomfinder-core`.
//!
//! This crate provides:
//! - TOML scanner configuration mapped onto the core's config structs
//! - CSV bar loading and a seeded synthetic capitulation generator
//! - The live scan runtime (parallel cycle → AI escalation → notifier)
//! - Parallel multi-symbol backtests with BLAKE3 run fingerprints
//! - JSON / CSV / Markdown report export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod fingerprint;
pub mod metrics;
pub mod runner;
pub mod runtime;

pub use config::{ConfigError, ScannerConfig};
pub use data_loader::{
    generate_capitulation_bars, load_csv, load_symbols, read_bars_csv, synthetic_series,
    write_bars_csv, LoadError, SyntheticSpec,
};
pub use fingerprint::RunFingerprint;
pub use metrics::{MetricsSnapshot, RuntimeMetrics};
pub use runner::{run_backtest_report, run_backtests, run_from_dir, BacktestReport, RunError};
pub use runtime::{CycleReport, LogNotifier, Notifier, NotifyError, ScanRuntime};
