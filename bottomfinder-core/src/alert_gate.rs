//! AlertGate: per-(symbol, direction) cooldown state machine.
//!
//! States are `Idle` and `Cooling`. The transition table:
//!
//! | condition                                   | action         | state change            |
//! |---------------------------------------------|----------------|-------------------------|
//! | score < threshold                           | none           | unchanged               |
//! | Idle, or Cooling with elapsed >= cooldown   | basic*         | Cooling, time+score set |
//! | Cooling, elapsed < cooldown, delta >= jump  | strengthened   | time+score reset        |
//! | Cooling, elapsed < cooldown, delta < jump   | none           | unchanged               |
//!
//! *`strengthened` instead of `basic` when the snapshot is AI-eligible.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::{Direction, ScoreSnapshot};

/// When a cooling slot is forgotten regardless of elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Only the cooldown window expires state.
    #[default]
    Never,
    /// A slot whose last alert fell on an earlier UTC date is treated as Idle.
    NewUtcDay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub alert_threshold: u32,
    pub cooldown_minutes: i64,
    pub strengthen_delta: u32,
    pub reset_policy: ResetPolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 5,
            cooldown_minutes: 120,
            strengthen_delta: 3,
            reset_policy: ResetPolicy::Never,
        }
    }
}

/// Longest accepted cooldown: one year.
pub const MAX_COOLDOWN_MINUTES: i64 = 525_600;

impl GateConfig {
    /// Cooldown window, clamped to `0..=MAX_COOLDOWN_MINUTES`.
    pub fn cooldown(&self) -> Duration {
        Duration::minutes(self.cooldown_minutes.clamp(0, MAX_COOLDOWN_MINUTES))
    }
}

/// Cooldown state for one (symbol, direction) key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub last_alert_time: Option<DateTime<Utc>>,
    pub last_alert_score: u32,
    pub cooling: bool,
}

impl AlertState {
    pub fn is_idle(&self) -> bool {
        !self.cooling
    }

    fn record(&mut self, at: DateTime<Utc>, score: u32) {
        self.cooling = true;
        self.last_alert_time = Some(at);
        self.last_alert_score = score;
    }
}

/// Both directional slots of one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolAlerts {
    pub bullish: AlertState,
    pub bearish: AlertState,
}

impl SymbolAlerts {
    pub fn get(&self, direction: Direction) -> &AlertState {
        match direction {
            Direction::Bullish => &self.bullish,
            Direction::Bearish => &self.bearish,
        }
    }

    pub fn get_mut(&mut self, direction: Direction) -> &mut AlertState {
        match direction {
            Direction::Bullish => &mut self.bullish,
            Direction::Bearish => &mut self.bearish,
        }
    }
}

/// Explicit alert-state table. Live runtime and every backtest own their own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertContext {
    slots: HashMap<String, SymbolAlerts>,
}

impl AlertContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create Idle slots so they can be handed out in parallel.
    pub fn ensure<S: AsRef<str>>(&mut self, symbols: &[S]) {
        for symbol in symbols {
            self.slots.entry(symbol.as_ref().to_string()).or_default();
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolAlerts> {
        self.slots.get(symbol)
    }

    pub fn slot_mut(&mut self, symbol: &str) -> &mut SymbolAlerts {
        self.slots.entry(symbol.to_string()).or_default()
    }

    /// Disjoint mutable access to every symbol's slots.
    pub fn slots_mut(&mut self) -> &mut HashMap<String, SymbolAlerts> {
        &mut self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    None,
    Basic,
    Strengthened,
}

impl AlertAction {
    pub fn is_alert(self) -> bool {
        self != AlertAction::None
    }
}

impl fmt::Display for AlertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertAction::None => "none",
            AlertAction::Basic => "basic",
            AlertAction::Strengthened => "strengthened",
        })
    }
}

/// Why the gate decided what it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateReason {
    BelowThreshold { score: u32, threshold: u32 },
    FirstAlert,
    CooldownElapsed { elapsed_minutes: i64 },
    DailyReset,
    ScoreJump { delta: i64 },
    Suppressed { delta: i64, remaining_minutes: i64 },
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateReason::BelowThreshold { score, threshold } => {
                write!(f, "score {score} below threshold {threshold}")
            }
            GateReason::FirstAlert => f.write_str("first alert"),
            GateReason::CooldownElapsed { elapsed_minutes } => {
                write!(f, "cooldown elapsed ({elapsed_minutes} min)")
            }
            GateReason::DailyReset => f.write_str("new UTC day"),
            GateReason::ScoreJump { delta } => write!(f, "score jumped +{delta} inside cooldown"),
            GateReason::Suppressed {
                delta,
                remaining_minutes,
            } => write!(
                f,
                "suppressed: delta {delta:+}, {remaining_minutes} min of cooldown left"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDecision {
    pub action: AlertAction,
    pub reason: GateReason,
    pub snapshot: ScoreSnapshot,
}

/// Stateless gate logic; state lives in the slot passed to `evaluate`.
#[derive(Debug, Clone, Default)]
pub struct AlertGate {
    config: GateConfig,
}

impl AlertGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run the state machine for `snapshot` against its slot.
    ///
    /// The evaluation time is `snapshot.timestamp`. `ai_eligible` only
    /// changes the label of a fresh alert, never whether it fires.
    pub fn evaluate(
        &self,
        state: &mut AlertState,
        snapshot: &ScoreSnapshot,
        ai_eligible: bool,
    ) -> AlertDecision {
        let score = snapshot.total_score;
        let now = snapshot.timestamp;
        let decision = |action, reason| AlertDecision {
            action,
            reason,
            snapshot: snapshot.clone(),
        };
        let fresh = if ai_eligible {
            AlertAction::Strengthened
        } else {
            AlertAction::Basic
        };

        if score < self.config.alert_threshold {
            return decision(
                AlertAction::None,
                GateReason::BelowThreshold {
                    score,
                    threshold: self.config.alert_threshold,
                },
            );
        }

        let last = match (state.cooling, state.last_alert_time) {
            (true, Some(last)) => last,
            _ => {
                state.record(now, score);
                return decision(fresh, GateReason::FirstAlert);
            }
        };

        if self.config.reset_policy == ResetPolicy::NewUtcDay
            && last.date_naive() < now.date_naive()
        {
            state.record(now, score);
            return decision(fresh, GateReason::DailyReset);
        }

        let elapsed = now - last;
        if elapsed >= self.config.cooldown() {
            state.record(now, score);
            return decision(
                fresh,
                GateReason::CooldownElapsed {
                    elapsed_minutes: elapsed.num_minutes(),
                },
            );
        }

        let delta = i64::from(score) - i64::from(state.last_alert_score);
        if delta >= i64::from(self.config.strengthen_delta) {
            state.record(now, score);
            return decision(AlertAction::Strengthened, GateReason::ScoreJump { delta });
        }

        decision(
            AlertAction::None,
            GateReason::Suppressed {
                delta,
                remaining_minutes: (self.config.cooldown() - elapsed).num_minutes(),
            },
        )
    }
}
