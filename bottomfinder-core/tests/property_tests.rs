//! Property tests for scoring and gating invariants.
//!
//! Uses proptest to verify:
//! 1. Determinism: identical windows give bit-identical snapshots
//! 2. Cooldown: no two alerts for one key inside the window without a +3 jump
//! 3. Usage caps: concurrent-safe counters never exceed their limits
//! 4. Divergence symmetry: negating both series mirrors the verdict

use bottomfinder_core::ai_gate::{AiUsageLimiter, UsageLimits};
use bottomfinder_core::alert_gate::{AlertAction, AlertGate, AlertState, GateConfig};
use bottomfinder_core::divergence::DivergenceDetector;
use bottomfinder_core::domain::Bar;
use bottomfinder_core::pipeline::SignalPipeline;
use bottomfinder_core::scoring::{Direction, ScoreSnapshot};
use bottomfinder_core::signals::Signal;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

// ── Helpers ──────────────────────────────────────────────────────────

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap()
}

fn bars_from(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base() + Duration::minutes(15 * i as i64),
                open,
                high: open.max(close) * 1.01,
                low: open.min(close) * 0.99,
                close,
                volume: volumes[i % volumes.len()],
            }
        })
        .collect()
}

fn snapshot(score: u32, at: DateTime<Utc>) -> ScoreSnapshot {
    ScoreSnapshot {
        symbol: "PROP".into(),
        timestamp: at,
        direction: Direction::Bullish,
        total_score: score,
        s_count: 0,
        a_count: score,
        contributing: Vec::new(),
    }
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-3.0..3.0_f64, 80..160).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|s| {
                price = (price + s).max(1.0);
                price
            })
            .collect()
    })
}

fn arb_volumes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(100.0..10_000.0_f64, 1..30)
}

/// (minutes since previous candidate, score)
fn arb_candidates() -> impl Strategy<Value = Vec<(i64, u32)>> {
    prop::collection::vec((0i64..200, 0u32..15), 1..60)
}

fn arb_series() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0u8..20, 5..40).prop_map(|v| v.into_iter().map(f64::from).collect())
}

// ── 1. Determinism ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn identical_window_identical_snapshot(closes in arb_closes(), volumes in arb_volumes()) {
        let bars = bars_from(&closes, &volumes);
        let now = bars[bars.len() - 1].timestamp;
        let a = SignalPipeline::default().score("PROP", &bars, now);
        let b = SignalPipeline::default().score("PROP", &bars, now);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}

// ── 2. Cooldown ──────────────────────────────────────────────────────

proptest! {
    /// Two fired alerts less than the cooldown apart imply the later one
    /// beat the earlier one's score by at least the strengthen delta.
    #[test]
    fn cooldown_never_double_fires(candidates in arb_candidates()) {
        let config = GateConfig::default();
        let gate = AlertGate::new(config.clone());
        let mut state = AlertState::default();
        let mut now = base();
        let mut last_fired: Option<(DateTime<Utc>, u32)> = None;

        for (gap, score) in candidates {
            now += Duration::minutes(gap);
            let decision = gate.evaluate(&mut state, &snapshot(score, now), false);
            if decision.action == AlertAction::None {
                continue;
            }
            prop_assert!(score >= config.alert_threshold);
            if let Some((at, prev)) = last_fired {
                if now - at < config.cooldown() {
                    prop_assert!(score >= prev + config.strengthen_delta);
                    prop_assert_eq!(decision.action, AlertAction::Strengthened);
                }
            }
            last_fired = Some((now, score));
            prop_assert_eq!(state.last_alert_time, Some(now));
            prop_assert_eq!(state.last_alert_score, score);
        }
    }

    /// Below-threshold candidates never change state.
    #[test]
    fn below_threshold_is_inert(score in 0u32..5, gap in 0i64..500) {
        let gate = AlertGate::default();
        let mut state = AlertState::default();
        gate.evaluate(&mut state, &snapshot(7, base()), false);
        let before = state.clone();
        let d = gate.evaluate(&mut state, &snapshot(score, base() + Duration::minutes(gap)), true);
        prop_assert_eq!(d.action, AlertAction::None);
        prop_assert_eq!(state, before);
    }
}

// ── 3. Usage caps ────────────────────────────────────────────────────

proptest! {
    /// Arbitrary (symbol, backend succeeds) sequences never exceed either cap,
    /// and counters equal the number of committed calls.
    #[test]
    fn usage_caps_hold(calls in prop::collection::vec((0usize..10, any::<bool>()), 0..80)) {
        let limits = UsageLimits::default();
        let limiter = AiUsageLimiter::new(limits.clone());
        let mut committed = [0u32; 10];

        for (sym, succeeds) in calls {
            let symbol = format!("S{sym}");
            if let Ok(reservation) = limiter.try_reserve(&symbol, base()) {
                if succeeds {
                    reservation.commit();
                    committed[sym] += 1;
                }
            }
            prop_assert!(limiter.symbol_count(&symbol, base()) <= limits.per_symbol_daily);
            prop_assert!(limiter.bot_count(base()) <= limits.bot_daily);
        }

        for (sym, &count) in committed.iter().enumerate() {
            prop_assert_eq!(limiter.symbol_count(&format!("S{sym}"), base()), count);
        }
        prop_assert_eq!(limiter.bot_count(base()), committed.iter().sum::<u32>());
    }
}

// ── 4. Divergence symmetry ───────────────────────────────────────────

proptest! {
    #[test]
    fn negation_mirrors_divergence(price in arb_series(), osc in arb_series(), k in 1usize..3) {
        let n = price.len().min(osc.len());
        let (price, osc) = (&price[..n], &osc[..n]);
        let detector = DivergenceDetector::new(k);
        let original = detector.detect(price, osc);

        let neg_price: Vec<f64> = price.iter().map(|v| -v).collect();
        let neg_osc: Vec<f64> = osc.iter().map(|v| -v).collect();
        let mirrored = detector.detect(&neg_price, &neg_osc);

        let expected = match original.signal {
            Signal::Bullish => Signal::Bearish,
            Signal::Bearish => Signal::Bullish,
            Signal::None => Signal::None,
        };
        prop_assert_eq!(mirrored.signal, expected);
        prop_assert!((original.strength - mirrored.strength).abs() < 1e-12);
    }
}
