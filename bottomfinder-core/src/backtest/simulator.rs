//! Bar-by-bar replay through the live `SignalPipeline`.
//!
//! Every run starts from a fresh, Idle alert context. Each bar from the warmup
//! point on is evaluated over its prefix window at the bar's own timestamp, so
//! cooldown timing follows market time. Every non-`none` decision becomes a
//! virtual alert whose forward window is then scored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alert_gate::{AlertAction, AlertDecision, SymbolAlerts};
use crate::domain::{Bar, BarSeries, IntegrityError};
use crate::pipeline::SignalPipeline;
use crate::scoring::Direction;

use super::kpi::{summarize_kpi, KpiReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Bars after the alert bar used for rebound/drawdown/recovery.
    pub forward_bars: usize,
    /// Rebound (in percent) at or above which an alert is a hit.
    pub hit_threshold_pct: f64,
    /// First window length evaluated; defaults to the registry's smallest lookback.
    pub warmup_bars: Option<usize>,
    /// Cap on the trailing window handed to the engine; `None` = full prefix.
    pub window_bars: Option<usize>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            forward_bars: 5,
            hit_threshold_pct: 3.0,
            warmup_bars: None,
            window_bars: None,
        }
    }
}

/// An alert the live runtime would have sent at `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualAlert {
    pub symbol: String,
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub action: AlertAction,
    pub score: u32,
    pub s_count: u32,
    pub a_count: u32,
    pub close: f64,
    pub indicators: Vec<String>,
}

impl VirtualAlert {
    fn from_decision(index: usize, close: f64, decision: &AlertDecision) -> Self {
        let s = &decision.snapshot;
        Self {
            symbol: s.symbol.clone(),
            index,
            timestamp: s.timestamp,
            direction: s.direction,
            action: decision.action,
            score: s.total_score,
            s_count: s.s_count,
            a_count: s.a_count,
            close,
            indicators: s.contributing.iter().map(|r| r.indicator_id.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recovery {
    /// Bars from the worst forward close back to the alert close (0 if price
    /// never moved against the alert).
    Recovered { bars: usize },
    Unrecovered,
}

/// Forward-window measurement of one virtual alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertOutcome {
    pub alert: VirtualAlert,
    pub forward_bars: usize,
    /// Best favourable close move as a fraction of the alert close.
    pub rebound: f64,
    /// Worst adverse close move as a fraction of the alert close; <= 0.
    pub drawdown: f64,
    pub hit: bool,
    pub duration_bars: usize,
    pub recovery: Recovery,
}

/// Everything one symbol's replay produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub symbol: String,
    pub alerts: Vec<VirtualAlert>,
    pub outcomes: Vec<AlertOutcome>,
    /// Alerts on the final bar(s) with no forward data; excluded from KPIs.
    pub pending: usize,
    pub ambiguous_cycles: usize,
    pub bars_evaluated: usize,
    pub report: KpiReport,
}

/// Forward excursion stats: (rebound, drawdown, recovery).
///
/// Closes are mapped to signed excursions so bearish alerts measure the
/// mirror image of bullish ones.
pub fn measure_forward(direction: Direction, entry: f64, forward: &[f64]) -> (f64, f64, Recovery) {
    let sign = match direction {
        Direction::Bullish => 1.0,
        Direction::Bearish => -1.0,
    };
    let excursions: Vec<f64> = forward.iter().map(|c| sign * (c - entry) / entry).collect();
    let best = excursions.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let worst = excursions.iter().copied().fold(f64::INFINITY, f64::min);

    let recovery = if worst >= 0.0 {
        Recovery::Recovered { bars: 0 }
    } else {
        let trough = excursions.iter().position(|&e| e == worst).unwrap_or(0);
        excursions[trough + 1..]
            .iter()
            .position(|&e| e >= 0.0)
            .map_or(Recovery::Unrecovered, |offset| Recovery::Recovered {
                bars: offset + 1,
            })
    };
    (best, worst.min(0.0), recovery)
}

pub struct BacktestSimulator<'a> {
    pipeline: &'a SignalPipeline,
    config: BacktestConfig,
}

impl<'a> BacktestSimulator<'a> {
    pub fn new(pipeline: &'a SignalPipeline, config: BacktestConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Validate raw bars into a series, then replay it.
    pub fn run_bars(&self, symbol: &str, bars: Vec<Bar>) -> Result<BacktestRun, IntegrityError> {
        let series = BarSeries::new(symbol, bars)?;
        Ok(self.run(&series))
    }

    pub fn run(&self, series: &BarSeries) -> BacktestRun {
        let symbol = series.symbol();
        let bars = series.bars();
        let n = bars.len();
        let warmup = self
            .config
            .warmup_bars
            .unwrap_or_else(|| self.pipeline.engine().registry().min_lookback())
            .max(1);

        // Isolated context: never shared with live state or other runs.
        let mut slots = SymbolAlerts::default();
        let mut scores: Vec<(u32, u32)> = vec![(0, 0); n];
        let mut alerts = Vec::new();
        let mut ambiguous_cycles = 0;

        for idx in warmup.saturating_sub(1)..n {
            let start = self
                .config
                .window_bars
                .map_or(0, |w| (idx + 1).saturating_sub(w));
            let window = &bars[start..=idx];
            let evaluation =
                self.pipeline
                    .evaluate(&mut slots, symbol, window, bars[idx].timestamp);
            scores[idx] = (
                evaluation.scores.bullish.total_score,
                evaluation.scores.bearish.total_score,
            );
            if evaluation.ambiguous {
                ambiguous_cycles += 1;
            }
            if let Some(decision) = evaluation.alert() {
                alerts.push(VirtualAlert::from_decision(idx, bars[idx].close, decision));
            }
        }

        let threshold = self.pipeline.alert_threshold();
        let hit_threshold = self.config.hit_threshold_pct / 100.0;
        let mut outcomes = Vec::with_capacity(alerts.len());
        let mut pending = 0;
        for alert in &alerts {
            let end = n.min(alert.index + 1 + self.config.forward_bars);
            let forward: Vec<f64> = bars[alert.index + 1..end].iter().map(|b| b.close).collect();
            if forward.is_empty() {
                pending += 1;
                continue;
            }
            let (rebound, drawdown, recovery) =
                measure_forward(alert.direction, alert.close, &forward);
            let duration_bars = scores[alert.index + 1..]
                .iter()
                .take_while(|(bull, bear)| match alert.direction {
                    Direction::Bullish => *bull >= threshold,
                    Direction::Bearish => *bear >= threshold,
                })
                .count();
            outcomes.push(AlertOutcome {
                alert: alert.clone(),
                forward_bars: forward.len(),
                rebound,
                drawdown,
                hit: rebound >= hit_threshold,
                duration_bars,
                recovery,
            });
        }

        let bars_evaluated = n.saturating_sub(warmup.saturating_sub(1));
        debug!(
            symbol,
            bars = n,
            bars_evaluated,
            alerts = alerts.len(),
            pending,
            ambiguous_cycles,
            "backtest replay finished"
        );

        BacktestRun {
            symbol: symbol.to_string(),
            report: summarize_kpi(&outcomes),
            alerts,
            outcomes,
            pending,
            ambiguous_cycles,
            bars_evaluated,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai_gate::AiGateConfig;
    use crate::alert_gate::GateConfig;
    use crate::series::{assert_approx, make_bars};
    use crate::signals::{BottomIndicator, Grade, IndicatorRegistry, IndicatorResult, Signal};
    use chrono::TimeZone;

    pub(crate) fn outcome(rebound: f64, drawdown: f64, recovery: Recovery) -> AlertOutcome {
        AlertOutcome {
            alert: VirtualAlert {
                symbol: "TEST".into(),
                index: 0,
                timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
                direction: Direction::Bullish,
                action: AlertAction::Basic,
                score: 5,
                s_count: 1,
                a_count: 2,
                close: 100.0,
                indicators: Vec::new(),
            },
            forward_bars: 5,
            rebound,
            drawdown,
            hit: rebound >= 0.03,
            duration_bars: 0,
            recovery,
        }
    }

    /// Bullish vote whenever the last close is under 100.
    struct Under100(&'static str, Grade);

    impl BottomIndicator for Under100 {
        fn id(&self) -> &str {
            self.0
        }
        fn grade(&self) -> Grade {
            self.1
        }
        fn lookback(&self) -> usize {
            1
        }
        fn compute(&self, bars: &[Bar]) -> IndicatorResult {
            let close = bars[bars.len() - 1].close;
            let signal = if close < 100.0 { Signal::Bullish } else { Signal::None };
            IndicatorResult::new(self.0, self.1, signal, format!("close={close}"))
        }
    }

    fn pipeline() -> SignalPipeline {
        let mut registry = IndicatorRegistry::new();
        for (id, grade) in [("s1", Grade::S), ("a1", Grade::A), ("a2", Grade::A)] {
            registry.register(Box::new(Under100(id, grade))).unwrap();
        }
        SignalPipeline::new(registry, GateConfig::default(), AiGateConfig::default())
    }

    // 15-minute bars: alert at 1, cooldown suppresses 11-12, alert again at 10.
    const CLOSES: [f64; 16] = [
        101.0, 99.0, 100.5, 102.5, 103.0, 103.0, 103.0, 103.0, 103.0, 103.0, 98.0, 98.5, 98.98,
        100.2, 100.5, 100.9,
    ];

    #[test]
    fn hit_and_miss_example() {
        let p = pipeline();
        let run = BacktestSimulator::new(&p, BacktestConfig::default())
            .run_bars("TEST", make_bars(&CLOSES))
            .unwrap();

        let idx: Vec<usize> = run.alerts.iter().map(|a| a.index).collect();
        assert_eq!(idx, vec![1, 10]);
        assert!(run.outcomes[0].hit);
        assert!(!run.outcomes[1].hit);
        assert_eq!(run.outcomes[1].duration_bars, 2);
        assert_eq!(run.outcomes[0].duration_bars, 0);
        assert_approx(run.report.precision, 0.5, 1e-12);
        assert_eq!(run.report.sample_size, 2);
        assert_approx(run.report.signal_to_noise_ratio, 1.0, 1e-12);
        assert_eq!(run.pending, 0);
        assert_eq!(run.bars_evaluated, 16);
    }

    #[test]
    fn runs_are_isolated_and_deterministic() {
        let p = pipeline();
        let sim = BacktestSimulator::new(&p, BacktestConfig::default());
        let a = sim.run_bars("TEST", make_bars(&CLOSES)).unwrap();
        let b = sim.run_bars("TEST", make_bars(&CLOSES)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn alert_on_last_bar_is_pending() {
        let p = pipeline();
        let run = BacktestSimulator::new(&p, BacktestConfig::default())
            .run_bars("TEST", make_bars(&[101.0, 99.0]))
            .unwrap();
        assert_eq!(run.alerts.len(), 1);
        assert_eq!(run.pending, 1);
        assert_eq!(run.report.sample_size, 0);
    }

    #[test]
    fn warmup_longer_than_series_evaluates_nothing() {
        let p = pipeline();
        let config = BacktestConfig {
            warmup_bars: Some(50),
            ..BacktestConfig::default()
        };
        let run = BacktestSimulator::new(&p, config)
            .run_bars("TEST", make_bars(&CLOSES))
            .unwrap();
        assert!(run.alerts.is_empty());
        assert_eq!(run.bars_evaluated, 0);
    }

    #[test]
    fn unsorted_bars_fail_fast() {
        let p = pipeline();
        let mut bars = make_bars(&CLOSES);
        bars.swap(3, 4);
        let err = BacktestSimulator::new(&p, BacktestConfig::default())
            .run_bars("TEST", bars)
            .unwrap_err();
        assert!(matches!(err, IntegrityError::NotIncreasing { index: 4, .. }));
    }

    #[test]
    fn bullish_trough_recovery() {
        let (rebound, drawdown, recovery) =
            measure_forward(Direction::Bullish, 100.0, &[97.0, 95.0, 98.0, 101.0, 99.0]);
        assert_approx(rebound, 0.01, 1e-12);
        assert_approx(drawdown, -0.05, 1e-12);
        assert_eq!(recovery, Recovery::Recovered { bars: 2 });
    }

    #[test]
    fn bearish_mirrors_bullish() {
        let (rebound, drawdown, recovery) =
            measure_forward(Direction::Bearish, 100.0, &[103.0, 105.0, 101.0, 99.0]);
        assert_approx(rebound, 0.01, 1e-12);
        assert_approx(drawdown, -0.05, 1e-12);
        assert_eq!(recovery, Recovery::Recovered { bars: 2 });
    }

    #[test]
    fn never_recovers() {
        let (_, _, recovery) = measure_forward(Direction::Bullish, 100.0, &[97.0, 95.0, 96.0]);
        assert_eq!(recovery, Recovery::Unrecovered);
    }

    #[test]
    fn no_adverse_move_recovers_immediately() {
        let (_, drawdown, recovery) = measure_forward(Direction::Bullish, 100.0, &[101.0, 102.0]);
        assert_eq!(drawdown, 0.0);
        assert_eq!(recovery, Recovery::Recovered { bars: 0 });
    }
}
