//! BottomFinder Core: signal scoring, alert gating and backtesting.
//!
//! This crate is I/O-free. It contains:
//! - Domain types (bars, validated bar series)
//! - Numeric series library (moving averages, oscillators, volume flow)
//! - Pivot-based divergence detection
//! - The graded indicator set, its registry and the IndicatorEngine
//! - ScoreAggregator, AlertGate and AIGate with the daily usage limiter
//! - `SignalPipeline`, the one evaluation path used live and in backtests
//! - BacktestSimulator and KPI statistics

pub mod ai_gate;
pub mod alert_gate;
pub mod backtest;
pub mod clock;
pub mod divergence;
pub mod domain;
pub mod engine;
pub mod pipeline;
pub mod scoring;
pub mod series;
pub mod signals;
