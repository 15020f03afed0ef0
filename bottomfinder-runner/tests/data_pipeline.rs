//! Integration tests for config → CSV loading → backtest → artifacts.

use std::path::Path;

use bottomfinder_core::domain::IntegrityError;
use bottomfinder_runner::data_loader::{
    generate_capitulation_bars, load_symbols, write_bars_csv, SyntheticSpec,
};
use bottomfinder_runner::export::{export_alerts_csv, load_artifacts, save_artifacts};
use bottomfinder_runner::{run_from_dir, LoadError, RunError, ScannerConfig};
use chrono::{Duration, TimeZone, Utc};

fn write_symbol(dir: &Path, symbol: &str, bars: usize) {
    let start = Utc.with_ymd_and_hms(2024, 4, 1, 13, 30, 0).unwrap();
    let bars = generate_capitulation_bars(symbol, &SyntheticSpec::new(bars, start));
    std::fs::write(dir.join(format!("{symbol}.csv")), write_bars_csv(&bars).unwrap()).unwrap();
}

fn config_for(dir: &Path, symbols: &[&str]) -> ScannerConfig {
    let list = symbols
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let text = format!("[runtime]\nsymbols = [{list}]\n\n[backtest]\nforward_bars = 5\n");
    let path = dir.join("scanner.toml");
    std::fs::write(&path, text).unwrap();
    ScannerConfig::load(&path).unwrap()
}

#[test]
fn backtest_from_csv_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_symbol(dir.path(), "NVDA", 240);
    write_symbol(dir.path(), "AMD", 240);
    let config = config_for(dir.path(), &["NVDA", "AMD"]);

    let report = run_from_dir(&config, dir.path()).unwrap();
    let symbols: Vec<&str> = report.runs.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AMD", "NVDA"]);
    assert!(report.runs.iter().all(|r| r.bars_evaluated > 0));
    assert!((0.0..=1.0).contains(&report.combined.precision));

    // Same inputs, same fingerprint.
    let again = run_from_dir(&config, dir.path()).unwrap();
    assert_eq!(report.fingerprint, again.fingerprint);
}

#[test]
fn artifacts_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write_symbol(dir.path(), "TSLA", 200);
    let config = config_for(dir.path(), &["TSLA"]);
    let report = run_from_dir(&config, dir.path()).unwrap();

    let out = tempfile::tempdir().unwrap();
    let run_dir = save_artifacts(&report, out.path()).unwrap();
    for file in ["report.json", "kpi.json", "alerts.csv", "report.md"] {
        assert!(run_dir.join(file).exists(), "missing {file}");
    }

    let loaded = load_artifacts(&run_dir).unwrap();
    assert_eq!(loaded.fingerprint, report.fingerprint);
    assert_eq!(loaded.total_alerts(), report.total_alerts());
    assert_eq!(loaded.combined.sample_size, report.combined.sample_size);

    let outcomes: Vec<_> = report.outcomes().collect();
    let csv = export_alerts_csv(&outcomes).unwrap();
    assert_eq!(csv.lines().count(), outcomes.len() + 1);
}

#[test]
fn missing_symbol_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_symbol(dir.path(), "AAPL", 50);
    let config = config_for(dir.path(), &["AAPL", "MSFT"]);
    let err = run_from_dir(&config, dir.path()).unwrap_err();
    assert!(matches!(
        err,
        RunError::Data(LoadError::MissingFile { ref symbol, .. }) if symbol == "MSFT"
    ));
}

#[test]
fn unsorted_csv_fails_integrity() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("META.csv"),
        "timestamp,open,high,low,close,volume\n\
         2024-04-01T13:45:00Z,10,11,9,10.5,100\n\
         2024-04-01T13:30:00Z,10,11,9,10.2,100\n",
    )
    .unwrap();
    let err = load_symbols(dir.path(), &["META"], None).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Integrity(IntegrityError::NotIncreasing { index: 1, .. })
    ));
}

#[test]
fn gap_tolerance_applies_to_loaded_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("GAP.csv"),
        "timestamp,open,high,low,close,volume\n\
         2024-04-01T13:30:00Z,10,11,9,10.5,100\n\
         2024-04-01T15:30:00Z,10,11,9,10.2,100\n",
    )
    .unwrap();
    let err = load_symbols(dir.path(), &["GAP"], Some(Duration::minutes(30))).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Integrity(IntegrityError::UnexpectedGap { gap_minutes: 120, .. })
    ));
    assert!(load_symbols(dir.path(), &["GAP"], None).is_ok());
}
