//! Trend-context confirmations. All of these only ever vote bullish.

use crate::domain::Bar;
use crate::series::{
    closes, ema_of_series, last_finite, obv, rolling_std, rsi_of_series, sma_of_series,
    stochastic_of_series,
};

use super::{verdict, BottomIndicator, Grade, IndicatorResult};

/// Oversold RSI while price still holds its 200-bar average.
#[derive(Debug, Clone)]
pub struct RsiSma200 {
    pub rsi_period: usize,
    pub sma_period: usize,
    pub oversold: f64,
}

impl Default for RsiSma200 {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            sma_period: 200,
            oversold: 30.0,
        }
    }
}

impl BottomIndicator for RsiSma200 {
    fn id(&self) -> &str {
        "rsi_sma200"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.sma_period.max(self.rsi_period + 1)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let closes = closes(bars);
        let close = closes[closes.len() - 1];
        let rsi = last_finite(&rsi_of_series(&closes, self.rsi_period)).unwrap_or(f64::NAN);
        let sma = last_finite(&sma_of_series(&closes, self.sma_period)).unwrap_or(f64::NAN);
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(rsi < self.oversold && close >= sma, false),
            format!("rsi={rsi:.2} close={close:.2} sma{}={sma:.2}", self.sma_period),
        )
        .with_value("rsi", rsi)
        .with_value("close", close)
        .with_value("sma", sma)
    }
}

/// Close at or under the lower Bollinger band without a collapsed stochastic.
#[derive(Debug, Clone)]
pub struct BbStochastic {
    pub bb_period: usize,
    pub bb_mult: f64,
    pub stoch_period: usize,
    pub stoch_floor: f64,
}

impl Default for BbStochastic {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_mult: 2.0,
            stoch_period: 14,
            stoch_floor: 20.0,
        }
    }
}

impl BottomIndicator for BbStochastic {
    fn id(&self) -> &str {
        "bb_stochastic"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.bb_period.max(self.stoch_period)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let closes = closes(bars);
        let last = closes.len() - 1;
        let close = closes[last];
        let mid = sma_of_series(&closes, self.bb_period)[last];
        let lower = mid - self.bb_mult * rolling_std(&closes, self.bb_period)[last];
        let stoch = stochastic_of_series(&closes, self.stoch_period)[last];
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(close <= lower && stoch > self.stoch_floor, false),
            format!("close={close:.2} lower={lower:.2} stoch={stoch:.2}"),
        )
        .with_value("close", close)
        .with_value("lower_band", lower)
        .with_value("stoch", stoch)
    }
}

/// Close within `tolerance` of the 61.8% retracement of the trailing range.
#[derive(Debug, Clone)]
pub struct FibonacciSupport {
    pub window: usize,
    pub tolerance: f64,
}

impl Default for FibonacciSupport {
    fn default() -> Self {
        Self {
            window: 60,
            tolerance: 0.01,
        }
    }
}

impl BottomIndicator for FibonacciSupport {
    fn id(&self) -> &str {
        "fibonacci_618_support"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.window
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let closes = closes(bars);
        let chunk = &closes[closes.len() - self.window..];
        let hi = chunk.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lo = chunk.iter().copied().fold(f64::INFINITY, f64::min);
        let level = hi - (hi - lo) * 0.618;
        let close = chunk[chunk.len() - 1];
        let near = level > 0.0 && hi > lo && (close - level).abs() / level <= self.tolerance;
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(near, false),
            format!("close={close:.2} fib618={level:.2}"),
        )
        .with_value("close", close)
        .with_value("fib618", level)
    }
}

/// Close above the Ichimoku cloud with RSI > 45 and OBV ticking up.
#[derive(Debug, Clone)]
pub struct IchimokuRsiObv {
    pub tenkan: usize,
    pub kijun: usize,
    pub senkou_b: usize,
    pub rsi_floor: f64,
}

impl Default for IchimokuRsiObv {
    fn default() -> Self {
        Self {
            tenkan: 9,
            kijun: 26,
            senkou_b: 52,
            rsi_floor: 45.0,
        }
    }
}

impl IchimokuRsiObv {
    fn midpoint(bars: &[Bar], period: usize) -> f64 {
        let tail = &bars[bars.len() - period..];
        let hi = tail.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let lo = tail.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        (hi + lo) / 2.0
    }
}

impl BottomIndicator for IchimokuRsiObv {
    fn id(&self) -> &str {
        "ichimoku_rsi_obv"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.tenkan.max(self.kijun).max(self.senkou_b).max(15)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let span_a = (Self::midpoint(bars, self.tenkan) + Self::midpoint(bars, self.kijun)) / 2.0;
        let span_b = Self::midpoint(bars, self.senkou_b);
        let close = bars[bars.len() - 1].close;
        let rsi = last_finite(&rsi_of_series(&closes(bars), 14)).unwrap_or(f64::NAN);
        let obv = obv(bars);
        let obv_rising = obv[obv.len() - 1] > obv[obv.len() - 2];

        let bullish = close >= span_a.max(span_b) && rsi > self.rsi_floor && obv_rising;
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(bullish, false),
            format!("close={close:.2} cloud=({span_a:.2},{span_b:.2}) rsi={rsi:.2}"),
        )
        .with_value("close", close)
        .with_value("span_a", span_a)
        .with_value("span_b", span_b)
        .with_value("rsi", rsi)
    }
}

/// Fast EMA back above slow EMA with RSI recovered above 40.
#[derive(Debug, Clone)]
pub struct KsReversal {
    pub fast: usize,
    pub slow: usize,
    pub rsi_floor: f64,
}

impl Default for KsReversal {
    fn default() -> Self {
        Self {
            fast: 8,
            slow: 21,
            rsi_floor: 40.0,
        }
    }
}

impl BottomIndicator for KsReversal {
    fn id(&self) -> &str {
        "ks_reversal"
    }

    fn grade(&self) -> Grade {
        Grade::A
    }

    fn lookback(&self) -> usize {
        self.slow.max(15)
    }

    fn compute(&self, bars: &[Bar]) -> IndicatorResult {
        let closes = closes(bars);
        let fast = last_finite(&ema_of_series(&closes, self.fast)).unwrap_or(f64::NAN);
        let slow = last_finite(&ema_of_series(&closes, self.slow)).unwrap_or(f64::NAN);
        let rsi = last_finite(&rsi_of_series(&closes, 14)).unwrap_or(f64::NAN);
        IndicatorResult::new(
            self.id(),
            self.grade(),
            verdict(fast > slow && rsi > self.rsi_floor, false),
            format!("ema{}={fast:.2} ema{}={slow:.2} rsi={rsi:.2}", self.fast, self.slow),
        )
        .with_value("ema_fast", fast)
        .with_value("ema_slow", slow)
        .with_value("rsi", rsi)
    }
}
