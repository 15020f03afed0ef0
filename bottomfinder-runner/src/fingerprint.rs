//! Content fingerprints for reproducible backtest artifacts.
//!
//! A fingerprint is a BLAKE3 hash over the serialized configuration and over
//! every bar in symbol order. Two reports with the same fingerprint came from
//! identical inputs.

use bottomfinder_core::domain::BarSeries;
use serde::{Deserialize, Serialize};

use crate::config::ScannerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub config_hash: String,
    pub dataset_hash: String,
    /// Hash over both halves.
    pub run_id: String,
}

impl RunFingerprint {
    pub fn compute(config: &ScannerConfig, series: &[BarSeries]) -> Self {
        let config_hash = config_hash(config);
        let dataset_hash = dataset_hash(series);
        let mut hasher = blake3::Hasher::new();
        hasher.update(config_hash.as_bytes());
        hasher.update(dataset_hash.as_bytes());
        Self {
            config_hash,
            dataset_hash,
            run_id: hasher.finalize().to_hex().to_string(),
        }
    }

    /// First 12 hex characters, for file names and log lines.
    pub fn short_id(&self) -> &str {
        &self.run_id[..12]
    }
}

pub fn config_hash(config: &ScannerConfig) -> String {
    let json = serde_json::to_string(config).unwrap_or_else(|_| format!("{config:?}"));
    blake3::hash(json.as_bytes()).to_hex().to_string()
}

/// Hash over every bar, with symbols visited in sorted order so input order
/// does not matter.
pub fn dataset_hash(series: &[BarSeries]) -> String {
    let mut hasher = blake3::Hasher::new();
    let mut ordered: Vec<&BarSeries> = series.iter().collect();
    ordered.sort_by(|a, b| a.symbol().cmp(b.symbol()));

    for s in ordered {
        hasher.update(s.symbol().as_bytes());
        for bar in s.bars() {
            hasher.update(&bar.timestamp.timestamp().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
