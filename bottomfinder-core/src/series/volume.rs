//! Volume-based flow series: OBV, A/D line, MFI, CMF, VPT, NVI/PVI.

use crate::domain::Bar;

/// On-balance volume, starting at 0.
pub fn obv(bars: &[Bar]) -> Vec<f64> {
    let mut result = Vec::with_capacity(bars.len());
    let mut total = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev = bars[i - 1].close;
            if bar.close > prev {
                total += bar.volume;
            } else if bar.close < prev {
                total -= bar.volume;
            }
        }
        result.push(total);
    }
    result
}

/// Accumulation/distribution line: cumulative money-flow volume.
pub fn ad_line(bars: &[Bar]) -> Vec<f64> {
    let mut total = 0.0;
    bars.iter()
        .map(|b| {
            total += b.money_flow_multiplier() * b.volume;
            total
        })
        .collect()
}

/// Money Flow Index over `period` typical-price changes. Lookback: period.
///
/// Positive flow only → 100; no flow at all → 50.
pub fn mfi(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let typical: Vec<f64> = bars.iter().map(Bar::typical_price).collect();
    let mut positive = vec![0.0; n];
    let mut negative = vec![0.0; n];
    for i in 1..n {
        let flow = typical[i] * bars[i].volume;
        if typical[i] > typical[i - 1] {
            positive[i] = flow;
        } else if typical[i] < typical[i - 1] {
            negative[i] = flow;
        }
    }

    for i in period..n {
        let pos: f64 = positive[i + 1 - period..=i].iter().sum();
        let neg: f64 = negative[i + 1 - period..=i].iter().sum();
        result[i] = if pos == 0.0 && neg == 0.0 {
            50.0
        } else if neg == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + pos / neg)
        };
    }
    result
}

/// Chaikin Money Flow over `period` bars. Lookback: period - 1.
/// A window with zero volume has no flow and yields 0.
pub fn cmf(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for i in (period - 1)..n {
        let window = &bars[i + 1 - period..=i];
        let mfv: f64 = window
            .iter()
            .map(|b| b.money_flow_multiplier() * b.volume)
            .sum();
        let vol: f64 = window.iter().map(|b| b.volume).sum();
        result[i] = if vol == 0.0 { 0.0 } else { mfv / vol };
    }
    result
}

/// Volume-price trend, starting at 0.
pub fn vpt(bars: &[Bar]) -> Vec<f64> {
    let mut total = 0.0;
    let mut result = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            total += bar.volume * pct_change(bars[i - 1].close, bar.close);
        }
        result.push(total);
    }
    result
}

/// Negative and positive volume indices, both seeded at 1000.
pub fn nvi_pvi(bars: &[Bar]) -> (Vec<f64>, Vec<f64>) {
    let mut nvi = Vec::with_capacity(bars.len());
    let mut pvi = Vec::with_capacity(bars.len());
    let (mut n_val, mut p_val) = (1000.0, 1000.0);
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev = &bars[i - 1];
            let change = pct_change(prev.close, bar.close);
            if bar.volume < prev.volume {
                n_val *= 1.0 + change;
            }
            if bar.volume > prev.volume {
                p_val *= 1.0 + change;
            }
        }
        nvi.push(n_val);
        pvi.push(p_val);
    }
    (nvi, pvi)
}

fn pct_change(prev: f64, curr: f64) -> f64 {
    if prev == 0.0 {
        0.0
    } else {
        (curr - prev) / prev
    }
}
