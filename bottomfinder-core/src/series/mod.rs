//! Numeric series library.
//!
//! Pure functions over `f64` slices or bar slices. Every function returns a
//! vector of the same length as its input, with `f64::NAN` during warmup and
//! wherever an input value is NaN. No value at index t depends on data after t.

pub mod moving;
pub mod oscillators;
pub mod volume;

pub use moving::{ema_of_series, rolling_max, rolling_min, rolling_std, sma_of_series};
pub use oscillators::{macd, rsi_of_series, stochastic_of_series, MacdSeries};
pub use volume::{ad_line, cmf, mfi, nvi_pvi, obv, vpt};

use crate::domain::Bar;

/// Close prices of a bar slice.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Last value of a series if it is finite.
pub fn last_finite(values: &[f64]) -> Option<f64> {
    values.last().copied().filter(|v| v.is_finite())
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000,
/// one bar every 15 minutes.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::minutes(15 * i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for series tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
