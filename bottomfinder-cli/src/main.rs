//! Bottomfinder CLI: backtest, scan and demo-data commands.
//!
//! Commands:
//! - `backtest`: replay CSV (or synthetic) bars through the live pipeline and report KPIs
//! - `scan`: run live scan cycles over the latest CSV bars
//! - `synth`: write seeded synthetic capitulation series as CSV
//! - `init`: print a default configuration file

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bottomfinder_core::ai_gate::RuleBasedInterpreter;
use bottomfinder_core::clock::{Clock, ManualClock, SystemClock};
use bottomfinder_core::domain::BarSeries;
use bottomfinder_runner::export::save_artifacts;
use bottomfinder_runner::{
    generate_capitulation_bars, load_symbols, run_backtest_report, run_from_dir, synthetic_series,
    write_bars_csv, BacktestReport, CycleReport, LogNotifier, ScanRuntime, ScannerConfig,
    SyntheticSpec,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bottomfinder",
    about = "Bottomfinder: multi-indicator bottom/top signal scanner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay historical bars through the alert pipeline and report KPIs.
    Backtest {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Symbols to test; overrides `[runtime] symbols`.
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Directory holding `<SYMBOL>.csv` files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Generate this many synthetic bars per symbol instead of reading CSV.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Output directory for report artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Run live scan cycles over the latest bars in the data directory.
    Scan {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Evaluate as of this RFC 3339 time instead of the wall clock.
        /// Later cycles step forward by `[runtime] interval_seconds` without sleeping.
        #[arg(long)]
        at: Option<String>,

        /// Number of cycles to run, `[runtime] interval_seconds` apart.
        #[arg(long, default_value_t = 1)]
        cycles: u32,

        /// Print each cycle's reports as JSON lines.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Write synthetic capitulation series as CSV for demos.
    Synth {
        #[arg(required = true)]
        symbols: Vec<String>,

        #[arg(long, default_value_t = 400)]
        bars: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// First bar time (RFC 3339).
        #[arg(long, default_value = "2024-01-02T14:30:00Z")]
        start: String,

        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },
    /// Print the default configuration as TOML.
    Init,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            config,
            symbols,
            data_dir,
            synthetic,
            output_dir,
        } => run_backtest_cmd(config, symbols, &data_dir, synthetic, &output_dir),
        Commands::Scan {
            config,
            data_dir,
            at,
            cycles,
            json,
        } => run_scan_cmd(config, &data_dir, at, cycles, json),
        Commands::Synth {
            symbols,
            bars,
            seed,
            start,
            out_dir,
        } => run_synth_cmd(&symbols, bars, seed, &start, &out_dir),
        Commands::Init => {
            print!("{}", ScannerConfig::default().to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ScannerConfig> {
    match path {
        Some(path) => ScannerConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ScannerConfig::default()),
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid RFC 3339 time '{s}'"))?
        .with_timezone(&Utc))
}

// ─── backtest ───────────────────────────────────────────────────────

fn run_backtest_cmd(
    config_path: Option<PathBuf>,
    symbols: Vec<String>,
    data_dir: &Path,
    synthetic: Option<usize>,
    output_dir: &Path,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if !symbols.is_empty() {
        config.runtime.symbols = symbols;
    }
    if config.runtime.symbols.is_empty() {
        bail!("no symbols: pass --symbols or set [runtime] symbols");
    }

    let report = match synthetic {
        Some(bars) => {
            warn!("using synthetic data; results are not market evidence");
            let start = parse_time("2024-01-02T14:30:00Z")?;
            let series = config
                .runtime
                .symbols
                .iter()
                .map(|s| synthetic_series(s, &SyntheticSpec::new(bars, start)))
                .collect::<Result<Vec<BarSeries>, _>>()?;
            run_backtest_report(&config, &series)?
        }
        None => run_from_dir(&config, data_dir)?,
    };

    print_summary(&report);
    let run_dir = save_artifacts(&report, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn print_summary(report: &BacktestReport) {
    println!();
    println!("=== Backtest Result ===");
    println!("Run:            {}", report.fingerprint.short_id());
    println!("Symbols:        {}", report.runs.len());
    println!("Alerts:         {}", report.total_alerts());
    println!();
    for run in &report.runs {
        let r = &run.report;
        println!(
            "{:<8} alerts {:>3}  measured {:>3}  precision {:>5.1}%  rebound {:>6.2}%  mdd {:>6.2}%  ambiguous {}",
            run.symbol,
            run.alerts.len(),
            r.sample_size,
            r.precision * 100.0,
            r.avg_rebound * 100.0,
            r.max_drawdown * 100.0,
            run.ambiguous_cycles,
        );
    }
    let c = &report.combined;
    println!();
    println!("--- Combined ---");
    println!("Sample Size:    {}", c.sample_size);
    println!("Precision:      {:.1}%", c.precision * 100.0);
    println!("Avg Rebound:    {:.2}%", c.avg_rebound * 100.0);
    println!("Max Drawdown:   {:.2}%", c.max_drawdown * 100.0);
    println!("Avg Duration:   {:.1} bars", c.avg_signal_duration);
    println!("Signal/Noise:   {:.2}", c.signal_to_noise_ratio);
    match c.time_to_recovery {
        Some(ttr) => println!("Recovery:       {ttr:.1} bars ({} unrecovered)", c.unrecovered),
        None => println!("Recovery:       none ({} unrecovered)", c.unrecovered),
    }
}

// ─── scan ───────────────────────────────────────────────────────────

fn run_scan_cmd(
    config_path: Option<PathBuf>,
    data_dir: &Path,
    at: Option<String>,
    cycles: u32,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    if config.runtime.symbols.is_empty() {
        bail!("no symbols: set [runtime] symbols");
    }
    let manual = at.as_deref().map(parse_time).transpose()?.map(ManualClock::new);
    let clock: &dyn Clock = match &manual {
        Some(m) => m,
        None => &SystemClock,
    };
    let mut runtime =
        ScanRuntime::from_config(&config, Box::new(RuleBasedInterpreter), Box::new(LogNotifier))?;

    for cycle in 0..cycles {
        if cycle > 0 {
            wait_for_next_cycle(manual.as_ref(), config.runtime.interval_seconds);
        }
        // Reload every cycle: the data layer appends bars between cycles.
        let series = load_symbols(data_dir, &config.runtime.symbols, config.data.max_gap())?;
        let reports = runtime.run_cycle_with_clock(&series, clock);
        print_cycle(&reports, json)?;
    }

    let m = runtime.metrics().snapshot();
    info!(
        cycles = m.cycles,
        alerts = m.alerts_sent,
        strengthened = m.strengthened_alerts,
        ambiguous = m.ambiguous_cycles,
        ai_calls = m.ai_calls,
        ai_policy_skips = m.ai_policy_skips,
        notifier_failures = m.notifier_failures,
        "scan finished"
    );
    Ok(())
}

/// Replays (`--at`) step the manual clock one interval; live scans sleep.
fn wait_for_next_cycle(manual: Option<&ManualClock>, interval_seconds: u64) {
    match manual {
        Some(clock) => clock.advance(chrono::Duration::seconds(interval_seconds as i64)),
        None => std::thread::sleep(std::time::Duration::from_secs(interval_seconds)),
    }
}

fn print_cycle(reports: &[CycleReport], json: bool) -> Result<()> {
    for r in reports {
        if json {
            println!("{}", serde_json::to_string(r)?);
            continue;
        }
        let scores = &r.evaluation.scores;
        let ai = r.ai.as_ref().map_or_else(|| "-".to_string(), |o| o.to_string());
        println!(
            "{:<8} bull {:>2}  bear {:>2}  {:<12}  ai: {}",
            r.symbol(),
            scores.bullish.total_score,
            scores.bearish.total_score,
            if r.evaluation.ambiguous {
                "ambiguous".to_string()
            } else {
                r.action().to_string()
            },
            ai,
        );
    }
    Ok(())
}

// ─── synth ──────────────────────────────────────────────────────────

fn run_synth_cmd(
    symbols: &[String],
    bars: usize,
    seed: u64,
    start: &str,
    out_dir: &Path,
) -> Result<()> {
    if bars == 0 {
        bail!("--bars must be at least 1");
    }
    let start = parse_time(start)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    for symbol in symbols {
        let spec = SyntheticSpec {
            seed,
            ..SyntheticSpec::new(bars, start)
        };
        let csv = write_bars_csv(&generate_capitulation_bars(symbol, &spec))?;
        let path = out_dir.join(format!("{symbol}.csv"));
        std::fs::write(&path, csv).with_context(|| format!("writing {}", path.display()))?;
        println!("{symbol}: {bars} bars -> {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_cycles_advance_by_interval() {
        let start = parse_time("2024-06-03T14:00:00Z").unwrap();
        let clock = ManualClock::new(start);
        wait_for_next_cycle(Some(&clock), 900);
        wait_for_next_cycle(Some(&clock), 900);
        assert_eq!(clock.now(), start + chrono::Duration::minutes(30));
    }

    #[test]
    fn bad_time_is_rejected() {
        assert!(parse_time("yesterday").is_err());
    }
}
