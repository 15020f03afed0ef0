//! BarSeries: a validated, time-ordered run of bars for one symbol.
//!
//! Construction is the single integrity checkpoint of the core. A series that
//! is unsorted, has duplicate timestamps, negative volume, non-finite prices or
//! a gap wider than the configured tolerance is rejected with an
//! [`IntegrityError`]. The error is never recovered locally: cooldown timing
//! and forward KPI windows both assume the invariant.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use super::Bar;

/// Data-integrity faults in a bar series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrityError {
    #[error("{symbol}: bar series is empty")]
    Empty { symbol: String },

    #[error("{symbol}: bar {index} at {timestamp} is not after the previous bar at {previous}")]
    NotIncreasing {
        symbol: String,
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },

    #[error("{symbol}: bar {index} has invalid OHLCV values")]
    InvalidBar { symbol: String, index: usize },

    #[error("{symbol}: unexpected gap of {gap_minutes} minutes before bar {index} (max {max_gap_minutes})")]
    UnexpectedGap {
        symbol: String,
        index: usize,
        gap_minutes: i64,
        max_gap_minutes: i64,
    },
}

/// An ordered bar sequence that satisfies the data-layer contract.
#[derive(Debug, Clone, Serialize)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Validate `bars` without a gap tolerance.
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, IntegrityError> {
        Self::with_max_gap(symbol, bars, None)
    }

    /// Validate `bars`, rejecting any spacing wider than `max_gap`.
    pub fn with_max_gap(
        symbol: impl Into<String>,
        bars: Vec<Bar>,
        max_gap: Option<Duration>,
    ) -> Result<Self, IntegrityError> {
        let symbol = symbol.into();
        if bars.is_empty() {
            return Err(IntegrityError::Empty { symbol });
        }

        for (index, bar) in bars.iter().enumerate() {
            if !bar.is_sane() {
                return Err(IntegrityError::InvalidBar { symbol, index });
            }
            if index == 0 {
                continue;
            }
            let previous = bars[index - 1].timestamp;
            if bar.timestamp <= previous {
                return Err(IntegrityError::NotIncreasing {
                    symbol,
                    index,
                    timestamp: bar.timestamp,
                    previous,
                });
            }
            if let Some(max_gap) = max_gap {
                let gap = bar.timestamp - previous;
                if gap > max_gap {
                    return Err(IntegrityError::UnexpectedGap {
                        symbol,
                        index,
                        gap_minutes: gap.num_minutes(),
                        max_gap_minutes: max_gap.num_minutes(),
                    });
                }
            }
        }

        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// The trailing window ending at (and including) `index`.
    pub fn window_to(&self, index: usize) -> &[Bar] {
        &self.bars[..=index]
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(minute: i64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap()
                + Duration::minutes(minute),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn accepts_sorted_series() {
        let bars = vec![bar_at(0, 100.0), bar_at(15, 101.0), bar_at(30, 102.0)];
        let series = BarSeries::new("AAPL", bars).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.symbol(), "AAPL");
        assert_eq!(series.window_to(1).len(), 2);
    }

    #[test]
    fn rejects_empty_series() {
        let err = BarSeries::new("AAPL", vec![]).unwrap_err();
        assert!(matches!(err, IntegrityError::Empty { .. }));
    }

    #[test]
    fn rejects_duplicate_timestamp() {
        let bars = vec![bar_at(0, 100.0), bar_at(15, 101.0), bar_at(15, 102.0)];
        let err = BarSeries::new("AAPL", bars).unwrap_err();
        assert!(matches!(err, IntegrityError::NotIncreasing { index: 2, .. }));
    }

    #[test]
    fn rejects_out_of_order() {
        let bars = vec![bar_at(30, 100.0), bar_at(15, 101.0)];
        let err = BarSeries::new("AAPL", bars).unwrap_err();
        assert!(matches!(err, IntegrityError::NotIncreasing { index: 1, .. }));
    }

    #[test]
    fn rejects_negative_volume() {
        let mut bars = vec![bar_at(0, 100.0), bar_at(15, 101.0)];
        bars[1].volume = -5.0;
        let err = BarSeries::new("AAPL", bars).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::InvalidBar {
                symbol: "AAPL".into(),
                index: 1
            }
        );
    }

    #[test]
    fn gap_tolerance() {
        let bars = vec![bar_at(0, 100.0), bar_at(15, 101.0), bar_at(120, 102.0)];
        assert!(BarSeries::with_max_gap("AAPL", bars.clone(), None).is_ok());

        let err =
            BarSeries::with_max_gap("AAPL", bars, Some(Duration::minutes(60))).unwrap_err();
        match err {
            IntegrityError::UnexpectedGap {
                index,
                gap_minutes,
                max_gap_minutes,
                ..
            } => {
                assert_eq!(index, 2);
                assert_eq!(gap_minutes, 105);
                assert_eq!(max_gap_minutes, 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
