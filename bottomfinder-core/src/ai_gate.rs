//! AI escalation: eligibility, daily usage caps and the interpreter seam.
//!
//! The usage limiter is the only state shared across symbols within a cycle.
//! Its check-then-increment runs under one mutex so concurrent evaluation can
//! never exceed a cap. A reservation that is not committed rolls back on drop,
//! so counters only reflect calls that actually produced an interpretation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alert_gate::AlertDecision;
use crate::scoring::ScoreSnapshot;

// ─── Eligibility ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiGateConfig {
    pub score_threshold: u32,
    pub min_s_count: u32,
}

impl Default for AiGateConfig {
    fn default() -> Self {
        Self {
            score_threshold: 6,
            min_s_count: 2,
        }
    }
}

impl AiGateConfig {
    /// `total_score >= 6 OR s_count >= 2` with the defaults. Independent of cooldown.
    pub fn is_eligible(&self, snapshot: &ScoreSnapshot) -> bool {
        snapshot.total_score >= self.score_threshold || snapshot.s_count >= self.min_s_count
    }
}

// ─── Usage limiter ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageLimits {
    pub per_symbol_daily: u32,
    pub bot_daily: u32,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            per_symbol_daily: 3,
            bot_daily: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiCallRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotDailyRecord {
    pub date: NaiveDate,
    pub count: u32,
}

/// Per-date counters. Records for a new date are created on first touch;
/// earlier dates are dropped once a later one is reserved.
#[derive(Debug, Default)]
struct UsageLedger {
    per_symbol: HashMap<(String, NaiveDate), AiCallRecord>,
    bot: HashMap<NaiveDate, BotDailyRecord>,
}

impl UsageLedger {
    fn symbol_count(&self, symbol: &str, date: NaiveDate) -> u32 {
        self.per_symbol
            .get(&(symbol.to_string(), date))
            .map_or(0, |r| r.count)
    }

    fn bot_count(&self, date: NaiveDate) -> u32 {
        self.bot.get(&date).map_or(0, |r| r.count)
    }

    fn increment(&mut self, symbol: &str, date: NaiveDate) {
        self.per_symbol
            .entry((symbol.to_string(), date))
            .or_insert_with(|| AiCallRecord {
                symbol: symbol.to_string(),
                date,
                count: 0,
            })
            .count += 1;
        self.bot
            .entry(date)
            .or_insert(BotDailyRecord { date, count: 0 })
            .count += 1;
    }

    fn prune_before(&mut self, date: NaiveDate) {
        self.per_symbol.retain(|(_, d), _| *d >= date);
        self.bot.retain(|d, _| *d >= date);
    }

    fn decrement(&mut self, symbol: &str, date: NaiveDate) {
        if let Some(r) = self.per_symbol.get_mut(&(symbol.to_string(), date)) {
            r.count = r.count.saturating_sub(1);
        }
        if let Some(r) = self.bot.get_mut(&date) {
            r.count = r.count.saturating_sub(1);
        }
    }
}

/// Why an eligible alert went out without AI interpretation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PolicySkip {
    #[error("symbol daily limit reached for {symbol} ({used}/{limit})")]
    SymbolCap { symbol: String, used: u32, limit: u32 },
    #[error("bot daily limit reached ({used}/{limit})")]
    BotCap { used: u32, limit: u32 },
}

/// Daily AI call caps, per symbol and bot-wide, reset at the UTC date boundary.
#[derive(Debug, Default)]
pub struct AiUsageLimiter {
    limits: UsageLimits,
    ledger: Mutex<UsageLedger>,
}

impl AiUsageLimiter {
    pub fn new(limits: UsageLimits) -> Self {
        Self {
            limits,
            ledger: Mutex::new(UsageLedger::default()),
        }
    }

    pub fn limits(&self) -> &UsageLimits {
        &self.limits
    }

    fn ledger(&self) -> MutexGuard<'_, UsageLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically check both caps and take one slot of each.
    pub fn try_reserve(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<UsageReservation<'_>, PolicySkip> {
        let date = now.date_naive();
        let mut ledger = self.ledger();
        ledger.prune_before(date);
        let used = ledger.symbol_count(symbol, date);
        if used >= self.limits.per_symbol_daily {
            return Err(PolicySkip::SymbolCap {
                symbol: symbol.to_string(),
                used,
                limit: self.limits.per_symbol_daily,
            });
        }
        let bot_used = ledger.bot_count(date);
        if bot_used >= self.limits.bot_daily {
            return Err(PolicySkip::BotCap {
                used: bot_used,
                limit: self.limits.bot_daily,
            });
        }
        ledger.increment(symbol, date);
        Ok(UsageReservation {
            limiter: self,
            symbol: symbol.to_string(),
            date,
            committed: false,
        })
    }

    pub fn symbol_count(&self, symbol: &str, now: DateTime<Utc>) -> u32 {
        self.ledger().symbol_count(symbol, now.date_naive())
    }

    pub fn bot_count(&self, now: DateTime<Utc>) -> u32 {
        self.ledger().bot_count(now.date_naive())
    }

    /// Snapshot of the per-symbol records for `now`'s UTC date, sorted by symbol.
    pub fn records(&self, now: DateTime<Utc>) -> Vec<AiCallRecord> {
        let date = now.date_naive();
        let mut records: Vec<AiCallRecord> = self
            .ledger()
            .per_symbol
            .values()
            .filter(|r| r.date == date)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        records
    }
}

/// One held slot of the daily caps. Dropped without `commit`, it is returned.
#[derive(Debug)]
pub struct UsageReservation<'a> {
    limiter: &'a AiUsageLimiter,
    symbol: String,
    date: NaiveDate,
    committed: bool,
}

impl UsageReservation<'_> {
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for UsageReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.limiter.ledger().decrement(&self.symbol, self.date);
        }
    }
}

// ─── Interpreter seam ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    #[error("AI backend error: {0}")]
    Backend(String),
    #[error("AI backend timed out")]
    Timeout,
    #[error("invalid AI response: {0}")]
    InvalidResponse(String),
}

/// Structured interpretation of an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInterpretation {
    pub regime: String,
    /// 0..=100.
    pub confidence: u8,
    pub summary: String,
    pub risks: Vec<String>,
    pub provider: String,
}

impl AiInterpretation {
    /// Reject out-of-range confidence and trim risks to three.
    pub fn validated(mut self) -> Result<Self, AiError> {
        if self.confidence > 100 {
            return Err(AiError::InvalidResponse(format!(
                "confidence {} out of range",
                self.confidence
            )));
        }
        self.risks.truncate(3);
        Ok(self)
    }
}

/// What an interpreter is asked about.
#[derive(Debug, Clone, Serialize)]
pub struct AiRequest<'a> {
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub direction: String,
    pub score: u32,
    pub evidence: Vec<String>,
    pub constraints: [&'static str; 2],
}

impl<'a> AiRequest<'a> {
    pub fn new(snapshot: &'a ScoreSnapshot, timeframe: &'a str) -> Self {
        Self {
            symbol: &snapshot.symbol,
            timeframe,
            direction: snapshot.direction.to_string(),
            score: snapshot.total_score,
            evidence: snapshot.evidence(),
            constraints: ["numeric evidence only", "no guarantee language"],
        }
    }

    /// JSON prompt body for remote backends.
    pub fn prompt(&self) -> Result<String, AiError> {
        serde_json::to_string(self).map_err(|e| AiError::InvalidResponse(e.to_string()))
    }
}

pub trait AiInterpreter: Send + Sync {
    fn name(&self) -> &str;

    fn interpret(&self, request: &AiRequest<'_>) -> Result<AiInterpretation, AiError>;
}

/// Offline interpreter producing a fixed-shape reading from the evidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedInterpreter;

impl AiInterpreter for RuleBasedInterpreter {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn interpret(&self, request: &AiRequest<'_>) -> Result<AiInterpretation, AiError> {
        let regime = match request.direction.as_str() {
            "bearish" => "exhaustion_watch",
            _ => "reversal_watch",
        };
        let confidence = 3u32.saturating_mul(request.score).saturating_add(40).min(90) as u8;
        AiInterpretation {
            regime: regime.to_string(),
            confidence,
            summary: format!(
                "{} {} signals ({} indicators, score {}) suggest a possible turn.",
                request.symbol,
                request.direction,
                request.evidence.len(),
                request.score
            ),
            risks: vec![
                "volatility expansion".to_string(),
                "retest of the recent extreme".to_string(),
            ],
            provider: self.name().to_string(),
        }
        .validated()
    }
}

// ─── Escalation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AiOutcome {
    /// The alert gate produced no alert.
    GateSuppressed,
    NotEligible,
    /// A daily cap is exhausted; the alert goes out without interpretation.
    PolicySkip(String),
    Interpreted(AiInterpretation),
    BackendFailed(String),
}

impl AiOutcome {
    pub fn interpretation(&self) -> Option<&AiInterpretation> {
        match self {
            AiOutcome::Interpreted(i) => Some(i),
            _ => None,
        }
    }
}

impl fmt::Display for AiOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiOutcome::GateSuppressed => f.write_str("gate suppressed"),
            AiOutcome::NotEligible => f.write_str("not eligible"),
            AiOutcome::PolicySkip(reason) => write!(f, "policy skip: {reason}"),
            AiOutcome::Interpreted(i) => write!(f, "interpreted by {}", i.provider),
            AiOutcome::BackendFailed(reason) => write!(f, "backend failed: {reason}"),
        }
    }
}

/// Eligibility check plus limiter-guarded interpreter call.
#[derive(Debug, Clone, Default)]
pub struct AiGate {
    config: AiGateConfig,
}

impl AiGate {
    pub fn new(config: AiGateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AiGateConfig {
        &self.config
    }

    pub fn is_eligible(&self, snapshot: &ScoreSnapshot) -> bool {
        self.config.is_eligible(snapshot)
    }

    /// Escalate a gate decision to the interpreter if allowed.
    ///
    /// Cap exhaustion and backend failures degrade to an uninterpreted alert.
    pub fn escalate(
        &self,
        decision: &AlertDecision,
        limiter: &AiUsageLimiter,
        interpreter: &dyn AiInterpreter,
        timeframe: &str,
        now: DateTime<Utc>,
    ) -> AiOutcome {
        if !decision.action.is_alert() {
            return AiOutcome::GateSuppressed;
        }
        let snapshot = &decision.snapshot;
        if !self.is_eligible(snapshot) {
            return AiOutcome::NotEligible;
        }

        let reservation = match limiter.try_reserve(&snapshot.symbol, now) {
            Ok(r) => r,
            Err(skip) => {
                info!(symbol = %snapshot.symbol, reason = %skip, "AI policy skip");
                return AiOutcome::PolicySkip(skip.to_string());
            }
        };

        match interpreter.interpret(&AiRequest::new(snapshot, timeframe)) {
            Ok(interpretation) => {
                reservation.commit();
                AiOutcome::Interpreted(interpretation)
            }
            Err(e) => {
                warn!(
                    symbol = %snapshot.symbol,
                    backend = interpreter.name(),
                    error = %e,
                    "AI interpretation failed"
                );
                AiOutcome::BackendFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_gate::{AlertAction, GateReason};
    use crate::scoring::Direction;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap()
    }

    fn snapshot(symbol: &str, score: u32, s_count: u32) -> ScoreSnapshot {
        ScoreSnapshot {
            symbol: symbol.into(),
            timestamp: t0(),
            direction: Direction::Bullish,
            total_score: score,
            s_count,
            a_count: score - 3 * s_count,
            contributing: Vec::new(),
        }
    }

    fn alert(symbol: &str, score: u32, s_count: u32) -> AlertDecision {
        AlertDecision {
            action: AlertAction::Strengthened,
            reason: GateReason::FirstAlert,
            snapshot: snapshot(symbol, score, s_count),
        }
    }

    struct FailingInterpreter;

    impl AiInterpreter for FailingInterpreter {
        fn name(&self) -> &str {
            "failing"
        }
        fn interpret(&self, _request: &AiRequest<'_>) -> Result<AiInterpretation, AiError> {
            Err(AiError::Timeout)
        }
    }

    #[test]
    fn eligibility_boundaries() {
        let cfg = AiGateConfig::default();
        assert!(!cfg.is_eligible(&snapshot("A", 5, 0)));
        assert!(cfg.is_eligible(&snapshot("A", 6, 0)));
        assert!(cfg.is_eligible(&snapshot("A", 6, 2)));
        assert!(!cfg.is_eligible(&snapshot("A", 4, 1)));
    }

    #[test]
    fn fourth_call_is_policy_skip_and_counters_hold() {
        let gate = AiGate::default();
        let limiter = AiUsageLimiter::new(UsageLimits::default());
        let decision = alert("AAPL", 7, 1);
        for _ in 0..3 {
            let out = gate.escalate(&decision, &limiter, &RuleBasedInterpreter, "15m", t0());
            assert!(matches!(out, AiOutcome::Interpreted(_)));
        }
        let out = gate.escalate(&decision, &limiter, &RuleBasedInterpreter, "15m", t0());
        assert!(matches!(out, AiOutcome::PolicySkip(_)));
        assert_eq!(limiter.symbol_count("AAPL", t0()), 3);
        assert_eq!(limiter.bot_count(t0()), 3);
    }

    #[test]
    fn bot_cap_applies_across_symbols() {
        let limiter = AiUsageLimiter::new(UsageLimits {
            per_symbol_daily: 3,
            bot_daily: 2,
        });
        limiter.try_reserve("A", t0()).unwrap().commit();
        limiter.try_reserve("B", t0()).unwrap().commit();
        assert_eq!(
            limiter.try_reserve("C", t0()).unwrap_err(),
            PolicySkip::BotCap { used: 2, limit: 2 }
        );
    }

    #[test]
    fn counters_reset_on_new_utc_day() {
        let limiter = AiUsageLimiter::new(UsageLimits::default());
        for _ in 0..3 {
            limiter.try_reserve("AAPL", t0()).unwrap().commit();
        }
        assert!(limiter.try_reserve("AAPL", t0()).is_err());
        let tomorrow = t0() + Duration::days(1);
        assert_eq!(limiter.symbol_count("AAPL", tomorrow), 0);
        assert!(limiter.try_reserve("AAPL", tomorrow).is_ok());
    }

    #[test]
    fn past_days_are_dropped_after_rollover() {
        let limiter = AiUsageLimiter::new(UsageLimits::default());
        for day in 0..30 {
            let at = t0() + Duration::days(day);
            for symbol in ["AAPL", "MSFT", "NVDA"] {
                limiter.try_reserve(symbol, at).unwrap().commit();
            }
        }
        let last = t0() + Duration::days(29);
        {
            let ledger = limiter.ledger();
            assert_eq!(ledger.per_symbol.len(), 3);
            assert_eq!(ledger.bot.len(), 1);
        }
        assert_eq!(limiter.bot_count(last), 3);
        assert_eq!(limiter.records(last).len(), 3);
    }

    #[test]
    fn pending_reservation_across_rollover_is_harmless() {
        let limiter = AiUsageLimiter::new(UsageLimits::default());
        let held = limiter.try_reserve("AAPL", t0()).unwrap();
        let tomorrow = t0() + Duration::days(1);
        limiter.try_reserve("AAPL", tomorrow).unwrap().commit();
        drop(held);
        assert_eq!(limiter.symbol_count("AAPL", tomorrow), 1);
        assert_eq!(limiter.bot_count(tomorrow), 1);
    }

    #[test]
    fn rule_based_confidence_saturates() {
        let snap = snapshot("AAPL", u32::MAX, 0);
        let request = AiRequest::new(&snap, "15m");
        let reading = RuleBasedInterpreter.interpret(&request).unwrap();
        assert_eq!(reading.confidence, 90);
    }

    #[test]
    fn failed_backend_rolls_back() {
        let gate = AiGate::default();
        let limiter = AiUsageLimiter::new(UsageLimits::default());
        let out = gate.escalate(&alert("AAPL", 9, 3), &limiter, &FailingInterpreter, "15m", t0());
        assert_eq!(out, AiOutcome::BackendFailed("AI backend timed out".into()));
        assert_eq!(limiter.symbol_count("AAPL", t0()), 0);
        assert_eq!(limiter.bot_count(t0()), 0);
    }

    #[test]
    fn suppressed_and_ineligible_never_touch_limiter() {
        let gate = AiGate::default();
        let limiter = AiUsageLimiter::new(UsageLimits::default());
        let mut none = alert("AAPL", 9, 3);
        none.action = AlertAction::None;
        assert_eq!(
            gate.escalate(&none, &limiter, &RuleBasedInterpreter, "15m", t0()),
            AiOutcome::GateSuppressed
        );
        let mut basic = alert("AAPL", 5, 0);
        basic.action = AlertAction::Basic;
        assert_eq!(
            gate.escalate(&basic, &limiter, &RuleBasedInterpreter, "15m", t0()),
            AiOutcome::NotEligible
        );
        assert_eq!(limiter.bot_count(t0()), 0);
    }

    #[test]
    fn concurrent_reservations_never_exceed_bot_cap() {
        let limiter = Arc::new(AiUsageLimiter::new(UsageLimits {
            per_symbol_daily: 100,
            bot_daily: 20,
        }));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    let symbol = format!("SYM{i}");
                    (0..10)
                        .filter(|_| match limiter.try_reserve(&symbol, t0()) {
                            Ok(r) => {
                                r.commit();
                                true
                            }
                            Err(_) => false,
                        })
                        .count()
                })
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 20);
        assert_eq!(limiter.bot_count(t0()), 20);
    }

    #[test]
    fn rule_based_interpretation_is_valid() {
        let snap = snapshot("AAPL", 7, 1);
        let i = RuleBasedInterpreter
            .interpret(&AiRequest::new(&snap, "15m"))
            .unwrap();
        assert_eq!(i.regime, "reversal_watch");
        assert!(i.confidence <= 100);
        assert!(i.risks.len() <= 3);
        assert!(AiRequest::new(&snap, "15m").prompt().unwrap().contains("\"AAPL\""));
    }
}
