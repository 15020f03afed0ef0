//! Pivot-based divergence detection between price and an oscillator.
//!
//! A bar is a pivot low when its value is the minimum of the `2k + 1` bars
//! centred on it (pivot high analogously). Ties resolve to the latest bar: a
//! bar is not a pivot if an equal value occurs later inside its right-hand
//! neighbourhood. A plateau therefore collapses to its final bar. The same
//! rule is used for the price series and the oscillator series so that the two
//! pivot timelines line up.
//!
//! Only confirmed pivots count: the last `k` bars of the window can never be
//! pivots because their right-hand neighbourhood is incomplete.

use serde::{Deserialize, Serialize};

use crate::signals::Signal;

/// Which extreme a pivot marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PivotKind {
    Low,
    High,
}

/// A confirmed local extreme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub index: usize,
    pub value: f64,
}

/// Find all confirmed pivots of `kind` using a symmetric window of `k` bars.
pub fn find_pivots(values: &[f64], k: usize, kind: PivotKind) -> Vec<Pivot> {
    let n = values.len();
    let mut pivots = Vec::new();
    if k == 0 || n < 2 * k + 1 {
        return pivots;
    }

    for i in k..(n - k) {
        let centre = values[i];
        if centre.is_nan() {
            continue;
        }
        let neighbourhood = &values[i - k..=i + k];
        if neighbourhood.iter().any(|v| v.is_nan()) {
            continue;
        }
        let is_extreme = match kind {
            PivotKind::Low => neighbourhood.iter().all(|&v| centre <= v),
            PivotKind::High => neighbourhood.iter().all(|&v| centre >= v),
        };
        // Latest bar wins ties, which also collapses plateaus.
        let tied_later = values[i + 1..=i + k].iter().any(|&v| v == centre);
        if is_extreme && !tied_later {
            pivots.push(Pivot {
                index: i,
                value: centre,
            });
        }
    }
    pivots
}

/// Outcome of a divergence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub signal: Signal,
    /// Mean of the price and oscillator spreads, each normalised by the
    /// series range over the window. In [0, 1]; 0 when `signal` is `None`.
    pub strength: f64,
    pub price_pivots: Option<(Pivot, Pivot)>,
    pub oscillator_pivots: Option<(Pivot, Pivot)>,
    pub evidence: String,
}

impl Divergence {
    fn none(evidence: impl Into<String>) -> Self {
        Self {
            signal: Signal::None,
            strength: 0.0,
            price_pivots: None,
            oscillator_pivots: None,
            evidence: evidence.into(),
        }
    }
}

/// Compares the last two price pivots with the oscillator at the same points.
#[derive(Debug, Clone)]
pub struct DivergenceDetector {
    pivot_window: usize,
}

impl DivergenceDetector {
    pub fn new(pivot_window: usize) -> Self {
        assert!(pivot_window >= 1, "pivot_window must be >= 1");
        Self { pivot_window }
    }

    pub fn pivot_window(&self) -> usize {
        self.pivot_window
    }

    /// Minimum window length on which two confirmed pivots can exist.
    pub fn min_bars(&self) -> usize {
        2 * self.pivot_window + 3
    }

    /// Detect a bullish or bearish divergence.
    ///
    /// When both exist, the one whose latest price pivot is more recent
    /// wins. The rule is direction-neutral, so negating both inputs always
    /// flips the result.
    /// Fewer than two pivots of a kind is a normal `None` outcome.
    pub fn detect(&self, price: &[f64], oscillator: &[f64]) -> Divergence {
        if price.len() != oscillator.len() {
            return Divergence::none("length mismatch");
        }
        if price.len() < self.min_bars() {
            return Divergence::none("not enough data");
        }

        let bullish = self.check(price, oscillator, PivotKind::Low);
        let bearish = self.check(price, oscillator, PivotKind::High);

        match (bullish, bearish) {
            (Some(bull), Some(bear)) => {
                let bull_at = bull.price_pivots.map(|(_, p)| p.index).unwrap_or(0);
                let bear_at = bear.price_pivots.map(|(_, p)| p.index).unwrap_or(0);
                if bull_at > bear_at {
                    bull
                } else {
                    bear
                }
            }
            (Some(d), None) | (None, Some(d)) => d,
            (None, None) => Divergence::none("no divergence"),
        }
    }

    fn check(&self, price: &[f64], oscillator: &[f64], kind: PivotKind) -> Option<Divergence> {
        let k = self.pivot_window;
        let price_pivots = find_pivots(price, k, kind);
        if price_pivots.len() < 2 {
            return None;
        }
        let p1 = price_pivots[price_pivots.len() - 2];
        let p2 = price_pivots[price_pivots.len() - 1];

        let osc_pivots = find_pivots(oscillator, k, kind);
        let o1 = self.corresponding(oscillator, &osc_pivots, p1.index)?;
        let o2 = self.corresponding(oscillator, &osc_pivots, p2.index)?;

        let signal = match kind {
            PivotKind::Low if p2.value < p1.value && o2.value > o1.value => Signal::Bullish,
            PivotKind::High if p2.value > p1.value && o2.value < o1.value => Signal::Bearish,
            _ => return None,
        };

        let price_range = range(price)?;
        let osc_range = range(oscillator)?;
        let price_spread = (p2.value - p1.value).abs() / price_range;
        let osc_spread = (o2.value - o1.value).abs() / osc_range;
        let strength = ((price_spread + osc_spread) / 2.0).clamp(0.0, 1.0);

        let evidence = match signal {
            Signal::Bullish => format!(
                "price LL {:.4}->{:.4}, oscillator HL {:.4}->{:.4}",
                p1.value, p2.value, o1.value, o2.value
            ),
            _ => format!(
                "price HH {:.4}->{:.4}, oscillator LH {:.4}->{:.4}",
                p1.value, p2.value, o1.value, o2.value
            ),
        };

        Some(Divergence {
            signal,
            strength,
            price_pivots: Some((p1, p2)),
            oscillator_pivots: Some((o1, o2)),
            evidence,
        })
    }

    /// The oscillator pivot of the same kind nearest to `index` within the
    /// pivot window (the later one on equal distance), or the oscillator value
    /// at `index` itself when no such pivot exists.
    fn corresponding(&self, oscillator: &[f64], pivots: &[Pivot], index: usize) -> Option<Pivot> {
        let k = self.pivot_window;
        let matched = pivots
            .iter()
            .filter(|p| p.index.abs_diff(index) <= k)
            .min_by(|a, b| {
                a.index
                    .abs_diff(index)
                    .cmp(&b.index.abs_diff(index))
                    .then(b.index.cmp(&a.index))
            })
            .copied();
        let pivot = matched.unwrap_or(Pivot {
            index,
            value: oscillator[index],
        });
        pivot.value.is_finite().then_some(pivot)
    }
}

fn range(values: &[f64]) -> Option<f64> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let r = hi - lo;
    (r.is_finite() && r > 0.0).then_some(r)
}
