//! Indicator registry and factory.
//!
//! `create_indicator` turns an identifier (plus optional numeric parameters)
//! into a boxed `BottomIndicator`. `IndicatorRegistry` is the ordered set the
//! engine evaluates.

use std::collections::BTreeMap;

use super::capitulation::{VolumeCapitulation, WvfSpike};
use super::divergences::{AdLineDivergence, MacdDivergence, MacdObvDivergence, ObvDivergence};
use super::flow::{Cmf, Mfi, NviPvi, Vpt};
use super::oscillators::{CompositeOscillator, TripleStochRsi};
use super::trend::{BbStochastic, FibonacciSupport, IchimokuRsiObv, KsReversal, RsiSma200};
use super::BottomIndicator;

/// Every identifier the factory understands, in default registration order.
pub const INDICATOR_IDS: [&str; 17] = [
    "wvf_spike",
    "volume_capitulation",
    "obv_divergence",
    "mfi",
    "cmf",
    "triple_stoch_rsi",
    "adline_divergence",
    "composite_oscillator",
    "vpt",
    "nvi_pvi",
    "rsi_sma200",
    "bb_stochastic",
    "macd_obv_divergence",
    "fibonacci_618_support",
    "ichimoku_rsi_obv",
    "ks_reversal",
    "macd_divergence",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),
    #[error("Duplicate indicator: {0}")]
    DuplicateIndicator(String),
    #[error("Invalid parameter {name} for {indicator}: {value}")]
    InvalidParam {
        indicator: String,
        name: String,
        value: f64,
    },
    #[error("Unknown parameter {name} for {indicator} (accepted: {accepted})")]
    UnknownParam {
        indicator: String,
        name: String,
        accepted: String,
    },
}

/// Parameter names each indicator reads. `None` for unknown ids.
pub fn accepted_params(id: &str) -> Option<&'static [&'static str]> {
    let names: &'static [&'static str] = match id {
        "wvf_spike" => &["period", "bb_period", "bb_mult", "range_lookback", "range_pct"],
        "volume_capitulation" => &["period", "multiple"],
        "obv_divergence" | "adline_divergence" | "macd_obv_divergence" | "macd_divergence" => {
            &["pivot_window"]
        }
        "mfi" => &["period", "oversold", "overbought"],
        "cmf" => &["period", "threshold"],
        "triple_stoch_rsi" => &[
            "rsi_period",
            "stoch_fast",
            "stoch_mid",
            "stoch_slow",
            "oversold",
            "overbought",
        ],
        "composite_oscillator" => &["period", "oversold", "overbought"],
        "vpt" => &["rising_bars"],
        "nvi_pvi" => &["sma_period"],
        "rsi_sma200" => &["rsi_period", "sma_period", "oversold"],
        "bb_stochastic" => &["bb_period", "bb_mult", "stoch_period", "stoch_floor"],
        "fibonacci_618_support" => &["window", "tolerance"],
        "ichimoku_rsi_obv" => &["tenkan", "kijun", "senkou_b", "rsi_floor"],
        "ks_reversal" => &["fast", "slow", "rsi_floor"],
        _ => return None,
    };
    Some(names)
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn param(params: &BTreeMap<String, f64>, name: &str, default: f64) -> f64 {
    params.get(name).copied().unwrap_or(default)
}

fn param_usize(
    id: &str,
    params: &BTreeMap<String, f64>,
    name: &str,
    default: usize,
) -> Result<usize, FactoryError> {
    match params.get(name).copied() {
        None => Ok(default),
        Some(v) if v >= 1.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(v) => Err(FactoryError::InvalidParam {
            indicator: id.to_string(),
            name: name.to_string(),
            value: v,
        }),
    }
}

fn check_names(id: &str, params: &BTreeMap<String, f64>) -> Result<(), FactoryError> {
    let accepted =
        accepted_params(id).ok_or_else(|| FactoryError::UnknownIndicator(id.to_string()))?;
    match params.keys().find(|name| !accepted.contains(&name.as_str())) {
        Some(name) => Err(FactoryError::UnknownParam {
            indicator: id.to_string(),
            name: name.clone(),
            accepted: accepted.join(", "),
        }),
        None => Ok(()),
    }
}

// ─── Factory ─────────────────────────────────────────────────────────

/// Create an indicator with its default parameters.
pub fn create_indicator(id: &str) -> Result<Box<dyn BottomIndicator>, FactoryError> {
    create_indicator_with(id, &BTreeMap::new())
}

/// Create an indicator, overriding defaults with any parameters present.
///
/// Names outside [`accepted_params`] are rejected rather than ignored.
pub fn create_indicator_with(
    id: &str,
    params: &BTreeMap<String, f64>,
) -> Result<Box<dyn BottomIndicator>, FactoryError> {
    check_names(id, params)?;
    let pivot_window = || param_usize(id, params, "pivot_window", 1);

    let indicator: Box<dyn BottomIndicator> = match id {
        "wvf_spike" => {
            let mut wvf = WvfSpike::new(
                param_usize(id, params, "period", 22)?,
                param_usize(id, params, "bb_period", 20)?,
                param(params, "bb_mult", 2.0),
            );
            wvf.range_lookback = param_usize(id, params, "range_lookback", 50)?;
            wvf.range_pct = param(params, "range_pct", 0.85);
            Box::new(wvf)
        }
        "volume_capitulation" => Box::new(VolumeCapitulation::new(
            param_usize(id, params, "period", 20)?,
            param(params, "multiple", 3.0),
        )),
        "obv_divergence" => Box::new(ObvDivergence::new(pivot_window()?)),
        "mfi" => Box::new(Mfi::new(
            param_usize(id, params, "period", 14)?,
            param(params, "oversold", 20.0),
            param(params, "overbought", 80.0),
        )),
        "cmf" => Box::new(Cmf::new(
            param_usize(id, params, "period", 20)?,
            param(params, "threshold", 0.05),
        )),
        "triple_stoch_rsi" => {
            let d = TripleStochRsi::default();
            Box::new(TripleStochRsi {
                rsi_period: param_usize(id, params, "rsi_period", d.rsi_period)?,
                stoch_periods: [
                    param_usize(id, params, "stoch_fast", d.stoch_periods[0])?,
                    param_usize(id, params, "stoch_mid", d.stoch_periods[1])?,
                    param_usize(id, params, "stoch_slow", d.stoch_periods[2])?,
                ],
                oversold: param(params, "oversold", d.oversold),
                overbought: param(params, "overbought", d.overbought),
            })
        }
        "adline_divergence" => Box::new(AdLineDivergence::new(pivot_window()?)),
        "composite_oscillator" => {
            let d = CompositeOscillator::default();
            Box::new(CompositeOscillator {
                period: param_usize(id, params, "period", d.period)?,
                oversold: param(params, "oversold", d.oversold),
                overbought: param(params, "overbought", d.overbought),
            })
        }
        "vpt" => Box::new(Vpt {
            rising_bars: param_usize(id, params, "rising_bars", 2)?,
        }),
        "nvi_pvi" => Box::new(NviPvi {
            sma_period: param_usize(id, params, "sma_period", 20)?,
        }),
        "rsi_sma200" => {
            let d = RsiSma200::default();
            Box::new(RsiSma200 {
                rsi_period: param_usize(id, params, "rsi_period", d.rsi_period)?,
                sma_period: param_usize(id, params, "sma_period", d.sma_period)?,
                oversold: param(params, "oversold", d.oversold),
            })
        }
        "bb_stochastic" => {
            let d = BbStochastic::default();
            Box::new(BbStochastic {
                bb_period: param_usize(id, params, "bb_period", d.bb_period)?,
                bb_mult: param(params, "bb_mult", d.bb_mult),
                stoch_period: param_usize(id, params, "stoch_period", d.stoch_period)?,
                stoch_floor: param(params, "stoch_floor", d.stoch_floor),
            })
        }
        "macd_obv_divergence" => Box::new(MacdObvDivergence::new(pivot_window()?)),
        "fibonacci_618_support" => Box::new(FibonacciSupport {
            window: param_usize(id, params, "window", 60)?,
            tolerance: param(params, "tolerance", 0.01),
        }),
        "ichimoku_rsi_obv" => {
            let d = IchimokuRsiObv::default();
            Box::new(IchimokuRsiObv {
                tenkan: param_usize(id, params, "tenkan", d.tenkan)?,
                kijun: param_usize(id, params, "kijun", d.kijun)?,
                senkou_b: param_usize(id, params, "senkou_b", d.senkou_b)?,
                rsi_floor: param(params, "rsi_floor", d.rsi_floor),
            })
        }
        "ks_reversal" => {
            let d = KsReversal::default();
            Box::new(KsReversal {
                fast: param_usize(id, params, "fast", d.fast)?,
                slow: param_usize(id, params, "slow", d.slow)?,
                rsi_floor: param(params, "rsi_floor", d.rsi_floor),
            })
        }
        "macd_divergence" => Box::new(MacdDivergence::new(pivot_window()?)),
        other => return Err(FactoryError::UnknownIndicator(other.to_string())),
    };
    Ok(indicator)
}

// ─── Registry ────────────────────────────────────────────────────────

/// Ordered, id-unique collection of indicators.
#[derive(Default)]
pub struct IndicatorRegistry {
    indicators: Vec<Box<dyn BottomIndicator>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All seventeen indicators with default parameters.
    pub fn default_set() -> Self {
        let mut registry = Self::new();
        for id in INDICATOR_IDS {
            match create_indicator(id) {
                Ok(indicator) => registry.indicators.push(indicator),
                Err(e) => tracing::error!(id, error = %e, "default indicator failed to build"),
            }
        }
        debug_assert_eq!(registry.len(), INDICATOR_IDS.len());
        registry
    }

    /// Build a registry from a list of ids, rejecting unknown or repeated ones.
    pub fn from_ids<S: AsRef<str>>(ids: &[S]) -> Result<Self, FactoryError> {
        let mut registry = Self::new();
        for id in ids {
            registry.register(create_indicator(id.as_ref())?)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, indicator: Box<dyn BottomIndicator>) -> Result<(), FactoryError> {
        if self.get(indicator.id()).is_some() {
            return Err(FactoryError::DuplicateIndicator(indicator.id().to_string()));
        }
        self.indicators.push(indicator);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&dyn BottomIndicator> {
        self.indicators
            .iter()
            .find(|i| i.id() == id)
            .map(|i| i.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn BottomIndicator> {
        self.indicators.iter().map(|i| i.as_ref())
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Smallest lookback among registered indicators: the first window
    /// length at which anything can be scored.
    pub fn min_lookback(&self) -> usize {
        self.iter().map(|i| i.lookback()).min().unwrap_or(0)
    }

    /// Largest lookback: the window length at which every indicator runs.
    pub fn max_lookback(&self) -> usize {
        self.iter().map(|i| i.lookback()).max().unwrap_or(0)
    }
}

impl std::fmt::Debug for IndicatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(|i| i.id())).finish()
    }
}
