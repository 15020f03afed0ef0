//! Divergence-based indicators: price against OBV, A/D line and MACD.

use crate::divergence::{Divergence, DivergenceDetector};
use crate::domain::Bar;
use crate::series::{ad_line, closes, macd, obv};

use super::{BottomIndicator, Grade, IndicatorResult, Signal};

/// Default number of trailing bars scanned for pivots.
const DEFAULT_WINDOW: usize = 60;

/// Run the detector over the last `window` bars, skipping any leading
/// warmup where the oscillator is still NaN.
fn detect_tail(
    detector: &DivergenceDetector,
    price: &[f64],
    oscillator: &[f64],
    window: usize,
) -> Divergence {
    let tail_start = price.len().saturating_sub(window);
    let start = oscillator[tail_start..]
        .iter()
        .position(|v| v.is_finite())
        .map_or(price.len(), |offset| tail_start + offset);
    detector.detect(&price[start..], &oscillator[start..])
}

fn divergence_result(id: &str, grade: Grade, d: &Divergence) -> IndicatorResult {
    IndicatorResult::new(id, grade, d.signal, d.evidence.clone()).with_value("strength", d.strength)
}

/// Price vs on-balance volume divergence (S-grade).
#[derive(Debug, Clone)]
pub struct ObvDivergence {
    detector: DivergenceDetector,
    pub window: usize,
}

impl ObvDivergence {
    pub fn new(pivot_window: usize) -> Self {
        Self {
            detector: DivergenceDetector::new(pivot_window),
            window: DEFAULT_WINDOW,
        }
    }
}

impl BottomIndicator for ObvDivergence {
    fn id(&self) -> &str {
        "obv_divergence"
    }

    fn grade(&self) -> Grade {
        Grade::S
    }

    fn lookback(&self) -> usize {
        self.detector.min_bars()
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let d = detect_tail(&self.detector, &closes(bars), &obv(bars), self.window);
        divergence_result(self.id(), self.grade(), &d)
    }
}

/// Price vs accumulation/distribution line divergence (A-grade).
#[derive(Debug, Clone)]
pub struct AdLineDivergence {
    detector: DivergenceDetector,
    pub window: usize,
}

impl AdLineDivergence {
    pub fn new(pivot_window: usize) -> Self {
        Self {
            detector: DivergenceDetector::new(pivot_window),
            window: DEFAULT_WINDOW,
        }
    }
}

impl BottomIndicator for AdLineDivergence {
    fn id(&self) -> &str {
        "adline_divergence"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.detector.min_bars()
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let d = detect_tail(&self.detector, &closes(bars), &ad_line(bars), self.window);
        divergence_result(self.id(), self.grade(), &d)
    }
}

/// Price vs MACD(12, 26, 9) line divergence (A-grade).
#[derive(Debug, Clone)]
pub struct MacdDivergence {
    detector: DivergenceDetector,
    pub window: usize,
}

impl MacdDivergence {
    pub fn new(pivot_window: usize) -> Self {
        Self {
            detector: DivergenceDetector::new(pivot_window),
            window: DEFAULT_WINDOW,
        }
    }
}

impl BottomIndicator for MacdDivergence {
    fn id(&self) -> &str {
        "macd_divergence"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        // MACD line is defined from bar 25 onwards.
        25 + self.detector.min_bars()
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let line = macd(&closes(bars), 12, 26, 9).line;
        let d = detect_tail(&self.detector, &closes(bars), &line, self.window);
        divergence_result(self.id(), self.grade(), &d)
    }
}

/// MACD and OBV divergences agreeing on a direction (A-grade).
#[derive(Debug, Clone)]
pub struct MacdObvDivergence {
    detector: DivergenceDetector,
    pub window: usize,
}

impl MacdObvDivergence {
    pub fn new(pivot_window: usize) -> Self {
        Self {
            detector: DivergenceDetector::new(pivot_window),
            window: DEFAULT_WINDOW,
        }
    }
}

impl BottomIndicator for MacdObvDivergence {
    fn id(&self) -> &str {
        "macd_obv_divergence"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        25 + self.detector.min_bars()
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let price = closes(bars);
        let line = macd(&price, 12, 26, 9).line;
        let by_macd = detect_tail(&self.detector, &price, &line, self.window);
        let by_obv = detect_tail(&self.detector, &price, &obv(bars), self.window);

        let signal = if by_macd.signal == by_obv.signal {
            by_macd.signal
        } else {
            Signal::None
        };
        IndicatorResult::new(
            self.id(),
            self.grade(),
            signal,
            format!("macd={} obv={}", by_macd.signal, by_obv.signal),
        )
        .with_value("macd_strength", by_macd.strength)
        .with_value("obv_strength", by_obv.strength)
    }
}
