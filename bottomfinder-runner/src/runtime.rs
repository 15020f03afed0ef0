//! Live scan runtime: one evaluation cycle over every configured symbol.
//!
//! A cycle is embarrassingly parallel across symbols. Each symbol owns its
//! two alert slots in the `AlertContext`, so slots are handed out as disjoint
//! `&mut` borrows to rayon workers. The only shared mutable state is the AI
//! usage limiter, which serializes its own check-and-increment.

use std::collections::HashMap;

use bottomfinder_core::ai_gate::{AiInterpreter, AiInterpretation, AiOutcome, AiUsageLimiter};
use bottomfinder_core::alert_gate::{AlertAction, AlertContext, AlertDecision};
use bottomfinder_core::clock::Clock;
use bottomfinder_core::domain::BarSeries;
use bottomfinder_core::pipeline::{Evaluation, SignalPipeline};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, ScannerConfig};
use crate::metrics::RuntimeMetrics;

// ─── Notifier seam ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("notifier rejected alert: {0}")]
    Rejected(String),
}

/// Delivers alerts. Called by the runtime, never by the core.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn send(
        &self,
        decision: &AlertDecision,
        interpretation: Option<&AiInterpretation>,
    ) -> Result<(), NotifyError>;
}

/// Emits each alert as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn send(
        &self,
        decision: &AlertDecision,
        interpretation: Option<&AiInterpretation>,
    ) -> Result<(), NotifyError> {
        let s = &decision.snapshot;
        info!(
            symbol = %s.symbol,
            direction = %s.direction,
            action = %decision.action,
            score = s.total_score,
            s_count = s.s_count,
            a_count = s.a_count,
            reason = %decision.reason,
            evidence = ?s.evidence(),
            ai = interpretation.map(|i| i.summary.as_str()),
            "bottom signal alert"
        );
        Ok(())
    }
}

// ─── Cycle report ───────────────────────────────────────────────────

/// What happened to one symbol in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub evaluation: Evaluation,
    /// `None` when AI is disabled or no alert was produced.
    pub ai: Option<AiOutcome>,
    pub notified: bool,
    pub notify_error: Option<String>,
}

impl CycleReport {
    pub fn symbol(&self) -> &str {
        &self.evaluation.symbol
    }

    pub fn action(&self) -> AlertAction {
        self.evaluation
            .decision
            .as_ref()
            .map_or(AlertAction::None, |d| d.action)
    }
}

// ─── Runtime ────────────────────────────────────────────────────────

pub struct ScanRuntime {
    pipeline: SignalPipeline,
    context: AlertContext,
    limiter: AiUsageLimiter,
    interpreter: Option<Box<dyn AiInterpreter>>,
    notifier: Box<dyn Notifier>,
    metrics: RuntimeMetrics,
    timeframe: String,
}

impl ScanRuntime {
    pub fn new(
        pipeline: SignalPipeline,
        limiter: AiUsageLimiter,
        interpreter: Option<Box<dyn AiInterpreter>>,
        notifier: Box<dyn Notifier>,
        timeframe: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            context: AlertContext::new(),
            limiter,
            interpreter,
            notifier,
            metrics: RuntimeMetrics::new(),
            timeframe: timeframe.into(),
        }
    }

    /// Build a runtime from configuration. `interpreter` is dropped when
    /// `[ai] enabled = false`.
    pub fn from_config(
        config: &ScannerConfig,
        interpreter: Box<dyn AiInterpreter>,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        let mut runtime = Self::new(
            config.pipeline()?,
            AiUsageLimiter::new(config.usage_limits()),
            config.ai.enabled.then_some(interpreter),
            notifier,
            config.runtime.timeframe.clone(),
        );
        runtime.context.ensure(config.runtime.symbols.as_slice());
        Ok(runtime)
    }

    pub fn pipeline(&self) -> &SignalPipeline {
        &self.pipeline
    }

    pub fn context(&self) -> &AlertContext {
        &self.context
    }

    pub fn limiter(&self) -> &AiUsageLimiter {
        &self.limiter
    }

    pub fn metrics(&self) -> &RuntimeMetrics {
        &self.metrics
    }

    pub fn run_cycle_with_clock(
        &mut self,
        inputs: &[BarSeries],
        clock: &dyn Clock,
    ) -> Vec<CycleReport> {
        self.run_cycle(inputs, clock.now())
    }

    /// Evaluate every input series at `now`, escalate alerts and notify.
    ///
    /// Reports come back sorted by symbol. Symbols known to the context but
    /// absent from `inputs` keep their slots untouched.
    pub fn run_cycle(&mut self, inputs: &[BarSeries], now: DateTime<Utc>) -> Vec<CycleReport> {
        let Self {
            pipeline,
            context,
            limiter,
            interpreter,
            notifier,
            metrics,
            timeframe,
        } = self;

        metrics.record_cycle();
        let symbols: Vec<&str> = inputs.iter().map(|s| s.symbol()).collect();
        context.ensure(symbols.as_slice());
        let by_symbol: HashMap<&str, &BarSeries> =
            inputs.iter().map(|s| (s.symbol(), s)).collect();

        let interpreter = interpreter.as_deref();
        let notifier: &dyn Notifier = &**notifier;
        let metrics: &RuntimeMetrics = metrics;
        let pipeline: &SignalPipeline = pipeline;
        let limiter: &AiUsageLimiter = limiter;
        let timeframe = timeframe.as_str();

        let mut reports: Vec<CycleReport> = context
            .slots_mut()
            .par_iter_mut()
            .filter_map(|(symbol, slots)| {
                let series = by_symbol.get(symbol.as_str())?;
                let evaluation = pipeline.evaluate(slots, symbol, series.bars(), now);
                metrics.record_evaluation();
                if evaluation.ambiguous {
                    metrics.record_ambiguous();
                }

                let mut ai = None;
                let mut notified = false;
                let mut notify_error = None;
                if let Some(decision) = evaluation.alert() {
                    ai = interpreter.map(|backend| {
                        let outcome =
                            pipeline
                                .ai_gate()
                                .escalate(decision, limiter, backend, timeframe, now);
                        match &outcome {
                            AiOutcome::Interpreted(_) => metrics.record_ai_call(),
                            AiOutcome::PolicySkip(_) => metrics.record_policy_skip(),
                            AiOutcome::BackendFailed(_) => metrics.record_ai_failure(),
                            _ => {}
                        }
                        outcome
                    });

                    match notifier.send(decision, ai.as_ref().and_then(AiOutcome::interpretation))
                    {
                        Ok(()) => {
                            metrics.record_alert(decision.action == AlertAction::Strengthened);
                            notified = true;
                        }
                        Err(e) => {
                            warn!(
                                symbol = %symbol,
                                notifier = notifier.name(),
                                error = %e,
                                "alert delivery failed"
                            );
                            metrics.record_notifier_failure();
                            notify_error = Some(e.to_string());
                        }
                    }
                }

                Some(CycleReport {
                    evaluation,
                    ai,
                    notified,
                    notify_error,
                })
            })
            .collect();

        reports.sort_by(|a, b| a.evaluation.symbol.cmp(&b.evaluation.symbol));
        reports
    }
}

impl std::fmt::Debug for ScanRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanRuntime")
            .field("symbols", &self.context.len())
            .field("interpreter", &self.interpreter.as_ref().map(|i| i.name()))
            .field("notifier", &self.notifier.name())
            .field("timeframe", &self.timeframe)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottomfinder_core::ai_gate::RuleBasedInterpreter;
    use bottomfinder_core::domain::Bar;
    use chrono::{Duration, TimeZone};

    fn flat_series(symbol: &str, n: usize) -> BarSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let bars = (0..n)
            .map(|i| Bar {
                timestamp: start + Duration::minutes(15 * i as i64),
                open: 100.0,
                high: 100.5,
                low: 99.5,
                close: 100.0,
                volume: 1000.0,
            })
            .collect();
        BarSeries::new(symbol, bars).unwrap()
    }

    #[test]
    fn reports_sorted_and_counted() {
        let mut runtime = ScanRuntime::from_config(
            &ScannerConfig::default(),
            Box::new(RuleBasedInterpreter),
            Box::new(LogNotifier),
        )
        .unwrap();
        let inputs = vec![flat_series("BBB", 60), flat_series("AAA", 60)];
        let now = inputs[0].bars()[59].timestamp;
        let reports = runtime.run_cycle(&inputs, now);

        let symbols: Vec<&str> = reports.iter().map(|r| r.symbol()).collect();
        assert_eq!(symbols, vec!["AAA", "BBB"]);
        let m = runtime.metrics().snapshot();
        assert_eq!(m.cycles, 1);
        assert_eq!(m.symbols_evaluated, 2);
        let alerted = reports.iter().filter(|r| r.action().is_alert()).count() as u64;
        assert_eq!(m.alerts_sent + m.notifier_failures, alerted);
        // Identical inputs score identically.
        assert_eq!(
            reports[0].evaluation.scores.bullish.total_score,
            reports[1].evaluation.scores.bullish.total_score
        );
    }

    #[test]
    fn configured_symbols_without_data_are_skipped() {
        let mut config = ScannerConfig::default();
        config.runtime.symbols = vec!["AAA".into(), "ZZZ".into()];
        let mut runtime =
            ScanRuntime::from_config(&config, Box::new(RuleBasedInterpreter), Box::new(LogNotifier))
                .unwrap();
        let inputs = vec![flat_series("AAA", 30)];
        let reports = runtime.run_cycle(&inputs, inputs[0].bars()[29].timestamp);
        assert_eq!(reports.len(), 1);
        assert_eq!(runtime.context().len(), 2);
    }
}
