//! KPI statistics over virtual-alert outcomes. Pure functions.
//!
//! All returns are fractions (0.03 = +3%), not percentages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::simulator::{AlertOutcome, Recovery};

/// Aggregate statistics for one backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiReport {
    pub precision: f64,
    pub avg_rebound: f64,
    /// Most negative forward drawdown across alerts; never positive.
    pub max_drawdown: f64,
    pub avg_signal_duration: f64,
    pub signal_to_noise_ratio: f64,
    /// Mean bars to recovery over recovered alerts; `None` if none recovered.
    pub time_to_recovery: Option<f64>,
    pub unrecovered: usize,
    pub sample_size: usize,
}

impl KpiReport {
    pub fn empty() -> Self {
        Self {
            precision: 0.0,
            avg_rebound: 0.0,
            max_drawdown: 0.0,
            avg_signal_duration: 0.0,
            signal_to_noise_ratio: 0.0,
            time_to_recovery: None,
            unrecovered: 0,
            sample_size: 0,
        }
    }

    /// Flat name → value map, floats rounded to four decimals.
    pub fn summary(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert("sample_size".into(), Value::from(self.sample_size));
        map.insert("precision".into(), Value::from(round4(self.precision)));
        map.insert("avg_rebound".into(), Value::from(round4(self.avg_rebound)));
        map.insert("max_drawdown".into(), Value::from(round4(self.max_drawdown)));
        map.insert(
            "avg_signal_duration".into(),
            Value::from(round4(self.avg_signal_duration)),
        );
        map.insert(
            "signal_to_noise_ratio".into(),
            Value::from(round4(self.signal_to_noise_ratio)),
        );
        map.insert(
            "time_to_recovery".into(),
            self.time_to_recovery.map_or(Value::Null, |v| Value::from(round4(v))),
        );
        map.insert("unrecovered".into(), Value::from(self.unrecovered));
        map
    }
}

/// Package outcome statistics into a report.
pub fn summarize_kpi(outcomes: &[AlertOutcome]) -> KpiReport {
    if outcomes.is_empty() {
        return KpiReport::empty();
    }
    let n = outcomes.len() as f64;
    let hits = outcomes.iter().filter(|o| o.hit).count();
    let recovered: Vec<usize> = outcomes
        .iter()
        .filter_map(|o| match o.recovery {
            Recovery::Recovered { bars } => Some(bars),
            Recovery::Unrecovered => None,
        })
        .collect();

    KpiReport {
        precision: hits as f64 / n,
        avg_rebound: outcomes.iter().map(|o| o.rebound).sum::<f64>() / n,
        max_drawdown: max_drawdown(outcomes),
        avg_signal_duration: outcomes.iter().map(|o| o.duration_bars as f64).sum::<f64>() / n,
        signal_to_noise_ratio: signal_to_noise(hits, outcomes.len() - hits),
        time_to_recovery: mean_usize(&recovered),
        unrecovered: outcomes.len() - recovered.len(),
        sample_size: outcomes.len(),
    }
}

/// hits / misses. No hits → 0; hits with no misses → the hit count.
pub fn signal_to_noise(hits: usize, misses: usize) -> f64 {
    if hits == 0 {
        0.0
    } else if misses == 0 {
        hits as f64
    } else {
        hits as f64 / misses as f64
    }
}

/// Most negative drawdown across outcomes, clamped to <= 0.
pub fn max_drawdown(outcomes: &[AlertOutcome]) -> f64 {
    outcomes
        .iter()
        .map(|o| o.drawdown)
        .fold(0.0, f64::min)
}

fn mean_usize(values: &[usize]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<usize>() as f64 / values.len() as f64)
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
