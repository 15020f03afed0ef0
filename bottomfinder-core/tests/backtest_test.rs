//! Backtest replay with the full default registry on a synthetic
//! drift → capitulation → rebound series.

use bottomfinder_core::alert_gate::SymbolAlerts;
use bottomfinder_core::backtest::{BacktestConfig, BacktestSimulator, Recovery};
use bottomfinder_core::domain::{Bar, BarSeries};
use bottomfinder_core::pipeline::SignalPipeline;
use chrono::{Duration, TimeZone, Utc};

fn capitulation_bars() -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 2, 5, 14, 30, 0).unwrap();
    let mut closes = Vec::new();
    let mut volumes = Vec::new();
    let mut price = 100.0;
    for i in 0..260 {
        let step = match i {
            0..=209 => 0.05 + (i as f64 * 0.2).sin() * 0.6,
            210..=219 => -2.5,
            _ => 0.8 + (i as f64 * 0.5).sin() * 0.3,
        };
        price = f64::max(price + step, 5.0);
        closes.push(price);
        volumes.push(match i {
            210..=219 => 12_000.0,
            _ => 1_000.0 + (i % 7) as f64 * 50.0,
        });
    }

    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: start + Duration::minutes(15 * i as i64),
                open,
                high: open.max(close) + 0.4,
                low: open.min(close) - 0.4,
                close,
                volume: volumes[i],
            }
        })
        .collect()
}

#[test]
fn default_registry_replay_is_well_formed() {
    let pipeline = SignalPipeline::default();
    let run = BacktestSimulator::new(&pipeline, BacktestConfig::default())
        .run_bars("SYNTH", capitulation_bars())
        .unwrap();

    assert!(run.bars_evaluated > 0);
    assert_eq!(run.outcomes.len() + run.pending, run.alerts.len());
    assert_eq!(run.report.sample_size, run.outcomes.len());

    let r = &run.report;
    assert!((0.0..=1.0).contains(&r.precision));
    assert!(r.max_drawdown <= 0.0);
    assert!(r.signal_to_noise_ratio >= 0.0);
    assert!(r.unrecovered <= r.sample_size);

    for outcome in &run.outcomes {
        assert!(outcome.forward_bars >= 1 && outcome.forward_bars <= 5);
        assert!(outcome.drawdown <= 0.0);
        assert!(outcome.alert.score >= 5);
        if let Recovery::Recovered { bars } = outcome.recovery {
            assert!(bars <= outcome.forward_bars);
        }
    }

    let indices: Vec<usize> = run.alerts.iter().map(|a| a.index).collect();
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn replay_matches_live_evaluation_path() {
    let pipeline = SignalPipeline::default();
    let bars = capitulation_bars();
    let run = BacktestSimulator::new(&pipeline, BacktestConfig::default())
        .run_bars("SYNTH", bars.clone())
        .unwrap();

    // Drive the same pipeline bar by bar, as the live runtime would.
    let warmup = pipeline.engine().registry().min_lookback();
    let mut slots = SymbolAlerts::default();
    let mut live = Vec::new();
    for idx in warmup - 1..bars.len() {
        let evaluation = pipeline.evaluate(&mut slots, "SYNTH", &bars[..=idx], bars[idx].timestamp);
        if let Some(decision) = evaluation.alert() {
            live.push((idx, decision.snapshot.total_score, decision.action));
        }
    }

    let replayed: Vec<_> = run.alerts.iter().map(|a| (a.index, a.score, a.action)).collect();
    assert_eq!(replayed, live);
}

#[test]
fn series_and_raw_bars_agree() {
    let pipeline = SignalPipeline::default();
    let config = BacktestConfig {
        window_bars: Some(120),
        ..BacktestConfig::default()
    };
    let sim = BacktestSimulator::new(&pipeline, config);
    let series = BarSeries::new("SYNTH", capitulation_bars()).unwrap();
    let from_series = sim.run(&series);
    let from_bars = sim.run_bars("SYNTH", capitulation_bars()).unwrap();
    assert_eq!(from_series, from_bars);
}
