//! Bar loading for the runner.
//!
//! Two sources:
//! 1. CSV files with a `timestamp,open,high,low,close,volume` header and
//!    RFC 3339 UTC timestamps, one file per symbol (`<dir>/<SYMBOL>.csv`)
//! 2. A seeded synthetic generator producing a drift → capitulation →
//!    rebound shape, for demos and benchmarks
//!
//! Either way the bars pass through `BarSeries` validation before the core
//! sees them. The loader never sorts or repairs rows.

use std::io::Read;
use std::path::{Path, PathBuf};

use bottomfinder_core::domain::{Bar, BarSeries, IntegrityError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no data file for '{symbol}' at {path}")]
    MissingFile { symbol: String, path: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("data integrity: {0}")]
    Integrity(#[from] IntegrityError),
}

/// One CSV row. Column names match the header exactly.
#[derive(Debug, Serialize, Deserialize)]
struct CsvBar {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl From<CsvBar> for Bar {
    fn from(row: CsvBar) -> Self {
        Bar {
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

/// Parse bars from any CSV reader, preserving row order.
pub fn read_bars_csv<R: Read>(reader: R) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for row in rdr.deserialize::<CsvBar>() {
        bars.push(row?.into());
    }
    Ok(bars)
}

/// Write bars in the same layout `read_bars_csv` accepts.
pub fn write_bars_csv(bars: &[Bar]) -> Result<String, LoadError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for bar in bars {
        wtr.serialize(CsvBar {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        })?;
    }
    let bytes = wtr.into_inner().map_err(|e| LoadError::Io {
        path: "<memory>".into(),
        source: e.into_error(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Load and validate one symbol's CSV file.
pub fn load_csv(
    path: &Path,
    symbol: &str,
    max_gap: Option<Duration>,
) -> Result<BarSeries, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let bars = read_bars_csv(file)?;
    Ok(BarSeries::with_max_gap(symbol, bars, max_gap)?)
}

pub fn symbol_path(dir: &Path, symbol: &str) -> PathBuf {
    dir.join(format!("{symbol}.csv"))
}

/// Load `<dir>/<SYMBOL>.csv` for every symbol, failing on the first problem.
pub fn load_symbols<S: AsRef<str>>(
    dir: &Path,
    symbols: &[S],
    max_gap: Option<Duration>,
) -> Result<Vec<BarSeries>, LoadError> {
    symbols
        .iter()
        .map(|s| {
            let symbol = s.as_ref();
            let path = symbol_path(dir, symbol);
            if !path.exists() {
                return Err(LoadError::MissingFile {
                    symbol: symbol.to_string(),
                    path: path.display().to_string(),
                });
            }
            load_csv(&path, symbol, max_gap)
        })
        .collect()
}

// ─── Synthetic data ─────────────────────────────────────────────────

/// Shape of a generated series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub bars: usize,
    pub start: DateTime<Utc>,
    pub interval_minutes: i64,
    pub seed: u64,
    /// Index of the first capitulation bar.
    pub crash_at: usize,
    pub crash_len: usize,
}

impl SyntheticSpec {
    pub fn new(bars: usize, start: DateTime<Utc>) -> Self {
        Self {
            bars,
            start,
            interval_minutes: 15,
            seed: 0,
            crash_at: bars * 3 / 4,
            crash_len: 8,
        }
    }
}

/// Random walk with a volume-heavy selloff and a rebound after it.
///
/// Deterministic per (symbol, seed): the RNG seed is a BLAKE3 hash of both.
pub fn generate_capitulation_bars(symbol: &str, spec: &SyntheticSpec) -> Vec<Bar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    hasher.update(&spec.seed.to_le_bytes());
    let mut rng = StdRng::from_seed(*hasher.finalize().as_bytes());

    let crash_end = spec.crash_at + spec.crash_len;
    let mut bars = Vec::with_capacity(spec.bars);
    let mut price = 100.0_f64;

    for i in 0..spec.bars {
        let (ret, volume) = if (spec.crash_at..crash_end).contains(&i) {
            (rng.gen_range(-0.045..-0.015), rng.gen_range(6_000.0..12_000.0))
        } else if i >= crash_end && i < crash_end + 3 * spec.crash_len {
            (rng.gen_range(-0.004..0.014), rng.gen_range(1_500.0..3_000.0))
        } else {
            (rng.gen_range(-0.008..0.0085), rng.gen_range(800.0..1_600.0))
        };

        let open = price;
        let close = (price * (1.0 + ret)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));

        bars.push(Bar {
            timestamp: spec.start + Duration::minutes(spec.interval_minutes * i as i64),
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
    }
    bars
}

pub fn synthetic_series(symbol: &str, spec: &SyntheticSpec) -> Result<BarSeries, LoadError> {
    Ok(BarSeries::new(symbol, generate_capitulation_bars(symbol, spec))?)
}
