//! ScoreAggregator: graded results → directional score snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::signals::{Grade, IndicatorResult, Signal};

/// Direction of a score or an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Bullish, Direction::Bearish];

    pub fn as_signal(self) -> Signal {
        match self {
            Direction::Bullish => Signal::Bullish,
            Direction::Bearish => Signal::Bearish,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_signal(), f)
    }
}

/// Directional score of one symbol at one evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub total_score: u32,
    pub s_count: u32,
    pub a_count: u32,
    /// Results voting for `direction`, in registry order.
    pub contributing: Vec<IndicatorResult>,
}

impl ScoreSnapshot {
    /// Evidence lines of the contributing indicators.
    pub fn evidence(&self) -> Vec<String> {
        self.contributing
            .iter()
            .map(|r| format!("{}: {}", r.indicator_id, r.evidence))
            .collect()
    }
}

/// Both directional snapshots for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionalScores {
    pub bullish: ScoreSnapshot,
    pub bearish: ScoreSnapshot,
}

impl DirectionalScores {
    pub fn get(&self, direction: Direction) -> &ScoreSnapshot {
        match direction {
            Direction::Bullish => &self.bullish,
            Direction::Bearish => &self.bearish,
        }
    }
}

/// Net outcome of a cycle after direction selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// One direction reached the threshold and beat the other.
    Candidate(ScoreSnapshot),
    /// Both directions reached the threshold with identical scores.
    Ambiguous { score: u32 },
    BelowThreshold,
}

/// Score one direction.
pub fn score_direction(
    symbol: &str,
    timestamp: DateTime<Utc>,
    direction: Direction,
    results: &[IndicatorResult],
) -> ScoreSnapshot {
    let signal = direction.as_signal();
    let contributing: Vec<IndicatorResult> = results
        .iter()
        .filter(|r| r.signal == signal)
        .cloned()
        .collect();
    let s_count = contributing.iter().filter(|r| r.grade == Grade::S).count() as u32;
    let a_count = contributing.len() as u32 - s_count;
    ScoreSnapshot {
        symbol: symbol.to_string(),
        timestamp,
        direction,
        total_score: contributing.iter().map(|r| r.points_for(signal)).sum(),
        s_count,
        a_count,
        contributing,
    }
}

/// Score both directions.
pub fn aggregate(
    symbol: &str,
    timestamp: DateTime<Utc>,
    results: &[IndicatorResult],
) -> DirectionalScores {
    DirectionalScores {
        bullish: score_direction(symbol, timestamp, Direction::Bullish, results),
        bearish: score_direction(symbol, timestamp, Direction::Bearish, results),
    }
}

/// Pick at most one direction per cycle.
///
/// Only directions at or above `threshold` qualify. If both qualify the
/// strictly higher score wins; an exact tie is ambiguous and yields nothing.
pub fn select(scores: &DirectionalScores, threshold: u32) -> Selection {
    let bull = scores.bullish.total_score;
    let bear = scores.bearish.total_score;
    match (bull >= threshold, bear >= threshold) {
        (false, false) => Selection::BelowThreshold,
        (true, false) => Selection::Candidate(scores.bullish.clone()),
        (false, true) => Selection::Candidate(scores.bearish.clone()),
        (true, true) if bull > bear => Selection::Candidate(scores.bullish.clone()),
        (true, true) if bear > bull => Selection::Candidate(scores.bearish.clone()),
        (true, true) => {
            info!(
                symbol = %scores.bullish.symbol,
                score = bull,
                "ambiguous cycle: bullish and bearish scores tie"
            );
            Selection::Ambiguous { score: bull }
        }
    }
}
