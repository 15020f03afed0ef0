//! Backtest runner: wires configuration, data loading and the core simulator.
//!
//! Entry points:
//! - `run_backtests()`: replays pre-loaded series in parallel, one isolated
//!   alert context per symbol
//! - `run_backtest_report()`: the same plus a fingerprint and pooled KPIs
//! - `run_from_dir()`: loads `<dir>/<SYMBOL>.csv` for the configured symbols
//!   first. Used by the CLI.

use std::path::Path;

use bottomfinder_core::backtest::{
    summarize_kpi, AlertOutcome, BacktestConfig, BacktestRun, BacktestSimulator, KpiReport,
};
use bottomfinder_core::domain::{BarSeries, IntegrityError};
use bottomfinder_core::pipeline::SignalPipeline;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, ScannerConfig};
use crate::data_loader::{load_symbols, LoadError};
use crate::fingerprint::RunFingerprint;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("data integrity: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("no symbols configured")]
    NoSymbols,
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Multi-symbol backtest result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub fingerprint: RunFingerprint,
    pub config: BacktestConfig,
    /// One run per symbol, sorted by symbol.
    pub runs: Vec<BacktestRun>,
    /// KPIs over every symbol's measured alerts pooled together.
    pub combined: KpiReport,
}

impl BacktestReport {
    pub fn total_alerts(&self) -> usize {
        self.runs.iter().map(|r| r.alerts.len()).sum()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &AlertOutcome> {
        self.runs.iter().flat_map(|r| r.outcomes.iter())
    }
}

/// Replay each series independently. Symbols run in parallel; bars within
/// a symbol stay strictly time-ordered.
pub fn run_backtests(
    pipeline: &SignalPipeline,
    config: &BacktestConfig,
    series: &[BarSeries],
) -> Vec<BacktestRun> {
    let simulator = BacktestSimulator::new(pipeline, config.clone());
    let mut runs: Vec<BacktestRun> = series.par_iter().map(|s| simulator.run(s)).collect();
    runs.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    runs
}

pub fn run_backtest_report(
    config: &ScannerConfig,
    series: &[BarSeries],
) -> Result<BacktestReport, RunError> {
    if series.is_empty() {
        return Err(RunError::NoSymbols);
    }
    let pipeline = config.pipeline()?;
    let runs = run_backtests(&pipeline, &config.backtest, series);
    let pooled: Vec<AlertOutcome> = runs.iter().flat_map(|r| r.outcomes.clone()).collect();
    let combined = summarize_kpi(&pooled);
    let fingerprint = RunFingerprint::compute(config, series);

    info!(
        run_id = fingerprint.short_id(),
        symbols = runs.len(),
        alerts = runs.iter().map(|r| r.alerts.len()).sum::<usize>(),
        sample_size = combined.sample_size,
        precision = combined.precision,
        "backtest complete"
    );

    Ok(BacktestReport {
        schema_version: SCHEMA_VERSION,
        fingerprint,
        config: config.backtest.clone(),
        runs,
        combined,
    })
}

/// Load the configured symbols from `dir` and backtest them.
pub fn run_from_dir(config: &ScannerConfig, dir: &Path) -> Result<BacktestReport, RunError> {
    if config.runtime.symbols.is_empty() {
        return Err(RunError::NoSymbols);
    }
    let series = load_symbols(dir, &config.runtime.symbols, config.data.max_gap())?;
    run_backtest_report(config, &series)
}
