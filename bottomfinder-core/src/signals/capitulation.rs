//! Capitulation spikes: Williams VIX Fix and climactic volume.

use crate::domain::Bar;
use crate::series::{closes, rolling_max, rolling_std, sma_of_series};

use super::{verdict, BottomIndicator, Grade, IndicatorResult, Signal};

/// Williams VIX Fix spike (S-grade, bullish only).
///
/// WVF = (highest close over `period` - low) / highest close * 100.
/// Fires when WVF breaks strictly above its Bollinger upper band AND sits
/// within `range_pct` of its `range_lookback`-bar high.
#[derive(Debug, Clone)]
pub struct WvfSpike {
    pub period: usize,
    pub bb_period: usize,
    pub bb_mult: f64,
    pub range_lookback: usize,
    pub range_pct: f64,
}

impl WvfSpike {
    pub fn new(period: usize, bb_period: usize, bb_mult: f64) -> Self {
        assert!(period >= 1, "WVF period must be >= 1");
        assert!(bb_period >= 1, "WVF band period must be >= 1");
        Self {
            period,
            bb_period,
            bb_mult,
            range_lookback: 50,
            range_pct: 0.85,
        }
    }

    pub fn default_params() -> Self {
        Self::new(22, 20, 2.0)
    }

    /// Full WVF series for a bar slice.
    pub fn wvf_series(&self, bars: &[Bar]) -> Vec<f64> {
        let highest = rolling_max(&closes(bars), self.period);
        highest
            .iter()
            .zip(bars)
            .map(|(&h, b)| if h > 0.0 { (h - b.low) / h * 100.0 } else { f64::NAN })
            .collect()
    }
}

impl BottomIndicator for WvfSpike {
    fn id(&self) -> &str {
        "wvf_spike"
    }

    fn grade(&self) -> Grade {
        Grade::S
    }

    fn lookback(&self) -> usize {
        self.period + self.bb_period.max(self.range_lookback) - 1
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let wvf = self.wvf_series(bars);
        let last = wvf.len() - 1;
        let mean = sma_of_series(&wvf, self.bb_period)[last];
        let std = rolling_std(&wvf, self.bb_period)[last];
        let upper = mean + self.bb_mult * std;
        let range_high = rolling_max(&wvf, self.range_lookback)[last] * self.range_pct;
        let current = wvf[last];

        let spike = current > upper && current >= range_high;
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(spike, false),
            format!("wvf={current:.2} upper={upper:.2} range_high={range_high:.2}"),
        )
        .with_value("wvf", current)
        .with_value("upper_band", upper)
        .with_value("range_high", range_high)
    }
}

/// Climactic volume spike (S-grade).
///
/// Volume at least `multiple` times the mean of the previous `period` bars.
/// A spike on a down close is capitulation (bullish); on an up close it is a
/// buying climax (bearish).
#[derive(Debug, Clone)]
pub struct VolumeCapitulation {
    pub period: usize,
    pub multiple: f64,
}

impl VolumeCapitulation {
    pub fn new(period: usize, multiple: f64) -> Self {
        assert!(period >= 1, "volume period must be >= 1");
        Self { period, multiple }
    }

    pub fn default_params() -> Self {
        Self::new(20, 3.0)
    }
}

impl BottomIndicator for VolumeCapitulation {
    fn id(&self) -> &str {
        "volume_capitulation"
    }

    fn grade(&self) -> Grade {
        Grade::S
    }

    fn lookback(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let n = bars.len();
        let current = &bars[n - 1];
        let prior = &bars[n - 1 - self.period..n - 1];
        let avg = prior.iter().map(|b| b.volume).sum::<f64>() / self.period as f64;
        let ratio = if avg > 0.0 { current.volume / avg } else { 0.0 };

        let spike = avg > 0.0 && ratio >= self.multiple;
        let prev_close = bars[n - 2].close;
        let signal = verdict(
            spike && current.close < prev_close,
            spike && current.close > prev_close,
        );

        IndicatorResult::new(
            self.id(),
            self.grade(),
            signal,
            format!(
                "volume={:.0} avg={avg:.0} ratio={ratio:.2} multiple={}",
                current.volume, self.multiple
            ),
        )
        .with_value("volume", current.volume)
        .with_value("avg_volume", avg)
        .with_value("ratio", ratio)
    }
}
