//! Oscillator extremes: triple stochastic RSI and the RSI/stochastic composite.

use crate::domain::Bar;
use crate::series::{closes, rsi_of_series, stochastic_of_series};

use super::{verdict, BottomIndicator, Grade, IndicatorResult};

/// Three stochastics of RSI all pinned at an extreme (A-grade).
#[derive(Debug, Clone)]
pub struct TripleStochRsi {
    pub rsi_period: usize,
    pub stoch_periods: [usize; 3],
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for TripleStochRsi {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            stoch_periods: [14, 21, 28],
            oversold: 20.0,
            overbought: 80.0,
        }
    }
}

impl BottomIndicator for TripleStochRsi {
    fn id(&self) -> &str {
        "triple_stoch_rsi"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        let longest = self.stoch_periods.iter().copied().max().unwrap_or(1);
        self.rsi_period + longest
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let rsi = rsi_of_series(&closes(bars), self.rsi_period);
        let [s1, s2, s3] = self
            .stoch_periods
            .map(|p| stochastic_of_series(&rsi, p).last().copied().unwrap_or(f64::NAN));
        let all = [s1, s2, s3];

        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(
                all.iter().all(|&v| v < self.oversold),
                all.iter().all(|&v| v > self.overbought),
            ),
            format!("stoch_rsi=({s1:.1},{s2:.1},{s3:.1})"),
        )
        .with_value("s1", s1)
        .with_value("s2", s2)
        .with_value("s3", s3)
    }
}

/// Mean of RSI and price stochastic (A-grade).
#[derive(Debug, Clone)]
pub struct CompositeOscillator {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for CompositeOscillator {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl BottomIndicator for CompositeOscillator {
    fn id(&self) -> &str {
        "composite_oscillator"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let closes = closes(bars);
        let rsi = rsi_of_series(&closes, self.period).last().copied().unwrap_or(f64::NAN);
        let stoch = stochastic_of_series(&closes, self.period)
            .last()
            .copied()
            .unwrap_or(f64::NAN);
        let composite = (rsi + stoch) / 2.0;

        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(composite < self.oversold, composite > self.overbought),
            format!("composite={composite:.2} rsi={rsi:.2} stoch={stoch:.2}"),
        )
        .with_value("composite", composite)
        .with_value("rsi", rsi)
        .with_value("stoch", stoch)
    }
}
