//! Backtest replay and KPI statistics.

pub mod kpi;
pub mod simulator;

pub use kpi::{max_drawdown, signal_to_noise, summarize_kpi, KpiReport};
pub use simulator::{
    measure_forward, AlertOutcome, BacktestConfig, BacktestRun, BacktestSimulator, Recovery,
    VirtualAlert,
};
