//! IndicatorEngine: one `IndicatorResult` per registered indicator.

use tracing::debug;

use crate::domain::Bar;
use crate::signals::{IndicatorRegistry, IndicatorResult};

/// Evaluates an indicator registry over a bar window.
#[derive(Debug)]
pub struct IndicatorEngine {
    registry: IndicatorRegistry,
}

impl IndicatorEngine {
    pub fn new(registry: IndicatorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }

    /// Evaluate every indicator whose lookback fits inside `window`.
    ///
    /// Indicators that need more bars are omitted; numeric faults are
    /// downgraded to `Signal::None`. Never fails.
    pub fn evaluate(&self, window: &[Bar]) -> Vec<IndicatorResult> {
        let mut results = Vec::with_capacity(self.registry.len());
        for indicator in self.registry.iter() {
            if window.len() < indicator.lookback() {
                debug!(
                    indicator = indicator.id(),
                    lookback = indicator.lookback(),
                    bars = window.len(),
                    "skipping indicator: insufficient lookback"
                );
                continue;
            }
            results.push(indicator.compute(window).sanitized());
        }
        results
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(IndicatorRegistry::default_set())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::series::make_bars;
    use crate::signals::{BottomIndicator, Grade, Signal};

    struct Faulty;

    impl BottomIndicator for Faulty {
        fn id(&self) -> &str {
            "faulty"
        }
        fn grade(&self) -> Grade {
            Grade::S
        }
        fn lookback(&self) -> usize {
            1
        }
        fn compute(&self, _bars: &[Bar]) -> IndicatorResult {
            IndicatorResult::new("faulty", Grade::S, Signal::Bullish, "x/0".into())
                .with_value("ratio", f64::INFINITY)
        }
    }

    #[test]
    fn short_window_skips_long_indicators() {
        let engine = IndicatorEngine::default();
        let results = engine.evaluate(&make_bars(&[100.0; 30]));
        let ids: Vec<&str> = results.iter().map(|r| r.indicator_id.as_str()).collect();
        assert!(ids.contains(&"mfi"));
        assert!(!ids.contains(&"rsi_sma200"));
        assert!(!ids.contains(&"wvf_spike"));
    }

    #[test]
    fn full_window_runs_everything() {
        let engine = IndicatorEngine::default();
        let results = engine.evaluate(&make_bars(&[100.0; 210]));
        assert_eq!(results.len(), 17);
    }

    #[test]
    fn empty_window_yields_nothing() {
        assert!(IndicatorEngine::default().evaluate(&[]).is_empty());
    }

    #[test]
    fn numeric_fault_becomes_none() {
        let mut registry = IndicatorRegistry::new();
        registry.register(Box::new(Faulty)).unwrap();
        let results = IndicatorEngine::new(registry).evaluate(&make_bars(&[1.0]));
        assert_eq!(results[0].signal, Signal::None);
    }
}
