//! Bottom-signal indicators: bar window in, graded directional verdict out.
//!
//! Every indicator is a pure function of the window it is handed. It declares
//! an identifier, a grade (S contributes 3 points, A contributes 1) and the
//! minimum number of bars it needs; the engine skips it on shorter windows.
//! Indicators never fail: anything they cannot judge is `Signal::None`.

pub mod capitulation;
pub mod divergences;
pub mod flow;
pub mod oscillators;
pub mod registry;
pub mod trend;

pub use capitulation::{VolumeCapitulation, WvfSpike};
pub use divergences::{AdLineDivergence, MacdDivergence, MacdObvDivergence, ObvDivergence};
pub use flow::{Cmf, Mfi, NviPvi, Vpt};
pub use oscillators::{CompositeOscillator, TripleStochRsi};
pub use registry::{
    accepted_params, create_indicator, create_indicator_with, FactoryError, IndicatorRegistry,
    INDICATOR_IDS,
};
pub use trend::{BbStochastic, FibonacciSupport, IchimokuRsiObv, KsReversal, RsiSma200};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// Directional verdict of a single indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Bullish,
    Bearish,
    None,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Bullish => "bullish",
            Signal::Bearish => "bearish",
            Signal::None => "none",
        };
        f.write_str(s)
    }
}

/// Importance tier of an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    S,
    A,
}

impl Grade {
    /// Points contributed to the directional score.
    pub fn weight(self) -> u32 {
        match self {
            Grade::S => 3,
            Grade::A => 1,
        }
    }
}

/// Immutable verdict of one indicator over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub indicator_id: String,
    pub signal: Signal,
    pub grade: Grade,
    pub evidence: String,
    pub raw_values: BTreeMap<String, f64>,
}

impl IndicatorResult {
    pub fn new(indicator_id: &str, grade: Grade, signal: Signal, evidence: String) -> Self {
        Self {
            indicator_id: indicator_id.to_string(),
            signal,
            grade,
            evidence,
            raw_values: BTreeMap::new(),
        }
    }

    /// Attach a named raw value.
    pub fn with_value(mut self, name: &str, value: f64) -> Self {
        self.raw_values.insert(name.to_string(), value);
        self
    }

    /// Points this result adds to `direction`'s score.
    pub fn points_for(&self, direction: Signal) -> u32 {
        if direction != Signal::None && self.signal == direction {
            self.grade.weight()
        } else {
            0
        }
    }

    /// Downgrade to `Signal::None` if any raw value is NaN or infinite.
    ///
    /// Division by zero and similar faults inside a formula surface as
    /// non-finite raw values; they must never become a directional vote.
    pub fn sanitized(mut self) -> Self {
        if self.signal != Signal::None && self.raw_values.values().any(|v| !v.is_finite()) {
            self.signal = Signal::None;
            self.evidence = format!("numeric fault: {}", self.evidence);
        }
        self
    }
}

/// Trait for bottom-signal indicators.
///
/// # Purity
/// `compute` must only read `bars`; identical windows give identical results.
/// The window's last bar is the evaluation bar.
pub trait BottomIndicator: Send + Sync {
    /// Stable identifier (e.g., "wvf_spike").
    fn id(&self) -> &str;

    fn grade(&self) -> Grade;

    /// Minimum window length. Shorter windows are skipped by the engine.
    fn lookback(&self) -> usize;

    /// Evaluate the indicator at the last bar of `bars`.
    fn compute(&self, bars: &[Bar]) -> IndicatorResult;
}

/// Map a pair of conditions to a verdict; bullish wins if both hold.
pub(crate) fn verdict(bullish: bool, bearish: bool) -> Signal {
    if bullish {
        Signal::Bullish
    } else if bearish {
        Signal::Bearish
    } else {
        Signal::None
    }
}
