//! Report export: JSON, CSV and Markdown.
//!
//! - **JSON**: the full `BacktestReport`, schema-versioned
//! - **KPI JSON**: flat name → value map per symbol plus the pooled report
//! - **CSV**: one row per measured virtual alert
//! - **Markdown**: human-readable summary table

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bottomfinder_core::backtest::{AlertOutcome, Recovery};
use serde_json::Value;

use crate::runner::{BacktestReport, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &BacktestReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize BacktestReport to JSON")
}

/// Deserialize a report, rejecting schema versions newer than this build.
pub fn import_json(json: &str) -> Result<BacktestReport> {
    let report: BacktestReport =
        serde_json::from_str(json).context("failed to deserialize BacktestReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

/// `{"combined": {...}, "symbols": {"AAA": {...}, ...}, "run_id": "..."}`
pub fn export_kpi_json(report: &BacktestReport) -> Result<String> {
    let symbols: BTreeMap<&str, BTreeMap<String, Value>> = report
        .runs
        .iter()
        .map(|r| (r.symbol.as_str(), r.report.summary()))
        .collect();
    let doc = serde_json::json!({
        "run_id": report.fingerprint.run_id,
        "combined": report.combined.summary(),
        "symbols": symbols,
    });
    serde_json::to_string_pretty(&doc).context("failed to serialize KPI summary")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: symbol, bar_index, timestamp, direction, action, score, s_count,
/// a_count, close, rebound, drawdown, hit, duration_bars, recovery_bars,
/// indicators
pub fn export_alerts_csv(outcomes: &[&AlertOutcome]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "bar_index",
        "timestamp",
        "direction",
        "action",
        "score",
        "s_count",
        "a_count",
        "close",
        "rebound",
        "drawdown",
        "hit",
        "duration_bars",
        "recovery_bars",
        "indicators",
    ])?;

    for o in outcomes {
        let a = &o.alert;
        let recovery = match o.recovery {
            Recovery::Recovered { bars } => bars.to_string(),
            Recovery::Unrecovered => String::new(),
        };
        wtr.write_record([
            a.symbol.as_str(),
            &a.index.to_string(),
            &a.timestamp.to_rfc3339(),
            &a.direction.to_string(),
            &a.action.to_string(),
            &a.score.to_string(),
            &a.s_count.to_string(),
            &a.a_count.to_string(),
            &format!("{:.4}", a.close),
            &format!("{:.6}", o.rebound),
            &format!("{:.6}", o.drawdown),
            &o.hit.to_string(),
            &o.duration_bars.to_string(),
            &recovery,
            &a.indicators.join(";"),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Markdown ───────────────────────────────────────────────────────

pub fn generate_report(report: &BacktestReport) -> String {
    let mut md = String::with_capacity(1024);
    md.push_str("# Bottom Signal Backtest\n\n");
    md.push_str(&format!("Run `{}`\n\n", report.fingerprint.short_id()));
    md.push_str(&format!(
        "Forward window {} bars, hit at +{:.1}%\n\n",
        report.config.forward_bars, report.config.hit_threshold_pct
    ));

    md.push_str("| Symbol | Alerts | Measured | Precision | Avg Rebound | Max DD | SNR | TTR |\n");
    md.push_str("| --- | --- | --- | --- | --- | --- | --- | --- |\n");
    for run in &report.runs {
        let r = &run.report;
        md.push_str(&format!(
            "| {} | {} | {} | {:.2} | {:.2}% | {:.2}% | {:.2} | {} |\n",
            run.symbol,
            run.alerts.len(),
            r.sample_size,
            r.precision,
            r.avg_rebound * 100.0,
            r.max_drawdown * 100.0,
            r.signal_to_noise_ratio,
            r.time_to_recovery
                .map_or_else(|| "-".to_string(), |t| format!("{t:.1}")),
        ));
    }
    let c = &report.combined;
    md.push_str(&format!(
        "| **All** | {} | {} | {:.2} | {:.2}% | {:.2}% | {:.2} | {} |\n",
        report.total_alerts(),
        c.sample_size,
        c.precision,
        c.avg_rebound * 100.0,
        c.max_drawdown * 100.0,
        c.signal_to_noise_ratio,
        c.time_to_recovery
            .map_or_else(|| "-".to_string(), |t| format!("{t:.1}")),
    ));
    md
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `report.json`, `kpi.json`, `alerts.csv` and `report.md` into
/// `<output_dir>/<run_id prefix>/`. Returns the created directory.
pub fn save_artifacts(report: &BacktestReport, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(report.fingerprint.short_id());
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("report.json"), export_json(report)?)?;
    std::fs::write(run_dir.join("kpi.json"), export_kpi_json(report)?)?;
    let outcomes: Vec<&AlertOutcome> = report.outcomes().collect();
    std::fs::write(run_dir.join("alerts.csv"), export_alerts_csv(&outcomes)?)?;
    std::fs::write(run_dir.join("report.md"), generate_report(report))?;
    Ok(run_dir)
}

pub fn load_artifacts(dir: &Path) -> Result<BacktestReport> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
