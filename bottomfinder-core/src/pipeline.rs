//! The single evaluation path shared by the live runtime and the backtester:
//! IndicatorEngine → ScoreAggregator → AlertGate.
//!
//! Callers supply the alert slots and the evaluation time, so the same code
//! runs against a live context with wall-clock time or an isolated backtest
//! context with bar timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai_gate::{AiGate, AiGateConfig};
use crate::alert_gate::{AlertDecision, AlertGate, GateConfig, SymbolAlerts};
use crate::domain::Bar;
use crate::engine::IndicatorEngine;
use crate::scoring::{aggregate, select, DirectionalScores, Selection};
use crate::signals::IndicatorRegistry;

/// Result of evaluating one symbol once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub scores: DirectionalScores,
    /// Gate decision for the selected direction; `None` when no direction
    /// reached the threshold or the cycle was ambiguous.
    pub decision: Option<AlertDecision>,
    pub ambiguous: bool,
    pub ai_eligible: bool,
}

impl Evaluation {
    /// The decision if it is an actual alert.
    pub fn alert(&self) -> Option<&AlertDecision> {
        self.decision.as_ref().filter(|d| d.action.is_alert())
    }
}

#[derive(Debug)]
pub struct SignalPipeline {
    engine: IndicatorEngine,
    gate: AlertGate,
    ai_gate: AiGate,
}

impl SignalPipeline {
    pub fn new(registry: IndicatorRegistry, gate: GateConfig, ai: AiGateConfig) -> Self {
        Self {
            engine: IndicatorEngine::new(registry),
            gate: AlertGate::new(gate),
            ai_gate: AiGate::new(ai),
        }
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    pub fn gate(&self) -> &AlertGate {
        &self.gate
    }

    pub fn ai_gate(&self) -> &AiGate {
        &self.ai_gate
    }

    pub fn alert_threshold(&self) -> u32 {
        self.gate.config().alert_threshold
    }

    /// Score both directions without touching any alert state.
    pub fn score(&self, symbol: &str, window: &[Bar], now: DateTime<Utc>) -> DirectionalScores {
        let results = self.engine.evaluate(window);
        aggregate(symbol, now, &results)
    }

    /// Score, select a direction and run the gate against `slots`.
    pub fn evaluate(
        &self,
        slots: &mut SymbolAlerts,
        symbol: &str,
        window: &[Bar],
        now: DateTime<Utc>,
    ) -> Evaluation {
        let scores = self.score(symbol, window, now);
        let mut evaluation = Evaluation {
            symbol: symbol.to_string(),
            timestamp: now,
            scores,
            decision: None,
            ambiguous: false,
            ai_eligible: false,
        };

        match select(&evaluation.scores, self.alert_threshold()) {
            Selection::Candidate(snapshot) => {
                let eligible = self.ai_gate.is_eligible(&snapshot);
                let state = slots.get_mut(snapshot.direction);
                evaluation.decision = Some(self.gate.evaluate(state, &snapshot, eligible));
                evaluation.ai_eligible = eligible;
            }
            Selection::Ambiguous { .. } => evaluation.ambiguous = true,
            Selection::BelowThreshold => {}
        }
        evaluation
    }
}

impl Default for SignalPipeline {
    fn default() -> Self {
        Self::new(
            IndicatorRegistry::default_set(),
            GateConfig::default(),
            AiGateConfig::default(),
        )
    }
}
