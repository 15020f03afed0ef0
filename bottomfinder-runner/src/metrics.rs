//! Runtime counters for the live scan loop.
//!
//! Counters are atomics so parallel symbol evaluations can bump them without
//! a lock. `snapshot()` gives a plain serializable copy for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    cycles: AtomicU64,
    symbols_evaluated: AtomicU64,
    alerts_sent: AtomicU64,
    strengthened_alerts: AtomicU64,
    ambiguous_cycles: AtomicU64,
    ai_calls: AtomicU64,
    ai_policy_skips: AtomicU64,
    ai_failures: AtomicU64,
    notifier_failures: AtomicU64,
    data_errors: AtomicU64,
}

/// Point-in-time copy of [`RuntimeMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub symbols_evaluated: u64,
    pub alerts_sent: u64,
    pub strengthened_alerts: u64,
    pub ambiguous_cycles: u64,
    pub ai_calls: u64,
    pub ai_policy_skips: u64,
    pub ai_failures: u64,
    pub notifier_failures: u64,
    pub data_errors: u64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self) {
        bump(&self.cycles);
    }

    pub fn record_evaluation(&self) {
        bump(&self.symbols_evaluated);
    }

    /// One notified alert; `strengthened` also counts it in its own bucket.
    pub fn record_alert(&self, strengthened: bool) {
        bump(&self.alerts_sent);
        if strengthened {
            bump(&self.strengthened_alerts);
        }
    }

    pub fn record_ambiguous(&self) {
        bump(&self.ambiguous_cycles);
    }

    pub fn record_ai_call(&self) {
        bump(&self.ai_calls);
    }

    pub fn record_policy_skip(&self) {
        bump(&self.ai_policy_skips);
    }

    pub fn record_ai_failure(&self) {
        bump(&self.ai_failures);
    }

    pub fn record_notifier_failure(&self) {
        bump(&self.notifier_failures);
    }

    pub fn record_data_error(&self) {
        bump(&self.data_errors);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            cycles: load(&self.cycles),
            symbols_evaluated: load(&self.symbols_evaluated),
            alerts_sent: load(&self.alerts_sent),
            strengthened_alerts: load(&self.strengthened_alerts),
            ambiguous_cycles: load(&self.ambiguous_cycles),
            ai_calls: load(&self.ai_calls),
            ai_policy_skips: load(&self.ai_policy_skips),
            ai_failures: load(&self.ai_failures),
            notifier_failures: load(&self.notifier_failures),
            data_errors: load(&self.data_errors),
        }
    }
}
