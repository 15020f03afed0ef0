//! Money-flow indicators: MFI, CMF, VPT, NVI/PVI.

use crate::domain::Bar;
use crate::series::{cmf, mfi, nvi_pvi, sma_of_series, vpt};

use super::{verdict, BottomIndicator, Grade, IndicatorResult};

/// Money Flow Index extremes (A-grade).
#[derive(Debug, Clone)]
pub struct Mfi {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Mfi {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Self {
        assert!(period >= 1, "MFI period must be >= 1");
        Self {
            period,
            oversold,
            overbought,
        }
    }

    pub fn default_params() -> Self {
        Self::new(14, 20.0, 80.0)
    }
}

impl BottomIndicator for Mfi {
    fn id(&self) -> &str {
        "mfi"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let value = mfi(bars, self.period).last().copied().unwrap_or(f64::NAN);
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(value <= self.oversold, value >= self.overbought),
            format!("mfi={value:.2} oversold={} overbought={}", self.oversold, self.overbought),
        )
        .with_value("mfi", value)
    }
}

/// Chaikin Money Flow sign (A-grade). Values inside `±threshold` are noise.
#[derive(Debug, Clone)]
pub struct Cmf {
    pub period: usize,
    pub threshold: f64,
}

impl Cmf {
    pub fn new(period: usize, threshold: f64) -> Self {
        assert!(period >= 1, "CMF period must be >= 1");
        Self { period, threshold }
    }

    pub fn default_params() -> Self {
        Self::new(20, 0.05)
    }
}

impl BottomIndicator for Cmf {
    fn id(&self) -> &str {
        "cmf"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let value = cmf(bars, self.period).last().copied().unwrap_or(f64::NAN);
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(value > self.threshold, value < -self.threshold),
            format!("cmf={value:.4}"),
        )
        .with_value("cmf", value)
    }
}

/// Volume-price trend rising for `rising_bars` consecutive bars (A-grade).
#[derive(Debug, Clone)]
pub struct Vpt {
    pub rising_bars: usize,
}

impl Default for Vpt {
    fn default() -> Self {
        Self { rising_bars: 2 }
    }
}

impl BottomIndicator for Vpt {
    fn id(&self) -> &str {
        "vpt"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.rising_bars + 1
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let series = vpt(bars);
        let tail = &series[series.len() - self.lookback()..];
        let rising = tail.windows(2).all(|w| w[1] > w[0]);
        let last = series[series.len() - 1];
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(rising, false),
            format!("vpt={last:.2} rising={rising}"),
        )
        .with_value("vpt", last)
    }
}

/// Negative volume index above its moving average (A-grade).
///
/// NVI only moves on falling-volume bars, so it tracks quiet accumulation.
#[derive(Debug, Clone)]
pub struct NviPvi {
    pub sma_period: usize,
}

impl Default for NviPvi {
    fn default() -> Self {
        Self { sma_period: 20 }
    }
}

impl BottomIndicator for NviPvi {
    fn id(&self) -> &str {
        "nvi_pvi"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.sma_period
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let (nvi, pvi) = nvi_pvi(bars);
        let last = nvi.len() - 1;
        let nvi_sma = sma_of_series(&nvi, self.sma_period)[last];
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(nvi[last] > nvi_sma, false),
            format!("nvi={:.2} nvi_sma={nvi_sma:.2} pvi={:.2}", nvi[last], pvi[last]),
        )
        .with_value("nvi", nvi[last])
        .with_value("nvi_sma", nvi_sma)
        .with_value("pvi", pvi[last])
    }
}
