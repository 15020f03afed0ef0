//! Scanner configuration loaded from TOML.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration. `validate()` rejects values the core cannot run with.

use std::collections::BTreeMap;
use std::path::Path;

use bottomfinder_core::ai_gate::{AiGateConfig, UsageLimits};
use bottomfinder_core::alert_gate::{GateConfig, ResetPolicy, MAX_COOLDOWN_MINUTES};
use bottomfinder_core::backtest::BacktestConfig;
use bottomfinder_core::pipeline::SignalPipeline;
use bottomfinder_core::signals::{create_indicator_with, FactoryError, IndicatorRegistry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("indicator config: {0}")]
    Indicator(#[from] FactoryError),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub symbols: Vec<String>,
    /// Label passed to the AI interpreter, e.g. "15m".
    pub timeframe: String,
    pub interval_seconds: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            timeframe: "15m".into(),
            interval_seconds: 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub alert_threshold: u32,
    pub ai_score_threshold: u32,
    pub ai_min_s_count: u32,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            alert_threshold: 5,
            ai_score_threshold: 6,
            ai_min_s_count: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsSection {
    pub cooldown_minutes: i64,
    pub strengthen_delta: u32,
    pub reset_policy: ResetPolicy,
}

impl Default for AlertsSection {
    fn default() -> Self {
        Self {
            cooldown_minutes: 120,
            strengthen_delta: 3,
            reset_policy: ResetPolicy::Never,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSection {
    pub enabled: bool,
    pub per_symbol_daily: u32,
    pub bot_daily: u32,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            enabled: true,
            per_symbol_daily: 3,
            bot_daily: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Largest allowed spacing between consecutive bars; unset disables the check.
    pub max_gap_minutes: Option<i64>,
}

impl DataSection {
    pub fn max_gap(&self) -> Option<chrono::Duration> {
        self.max_gap_minutes.map(chrono::Duration::minutes)
    }
}

/// Which indicators to register and their parameter overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorsSection {
    /// Empty means the full default set.
    pub enabled: Vec<String>,
    pub params: BTreeMap<String, BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub runtime: RuntimeSection,
    pub scoring: ScoringSection,
    pub alerts: AlertsSection,
    pub ai: AiSection,
    pub backtest: BacktestConfig,
    pub data: DataSection,
    pub indicators: IndicatorsSection,
}

impl ScannerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scoring.alert_threshold == 0 {
            return Err(invalid("scoring.alert_threshold", "must be at least 1"));
        }
        if self.alerts.cooldown_minutes <= 0 {
            return Err(invalid("alerts.cooldown_minutes", "must be positive"));
        }
        if self.alerts.cooldown_minutes > MAX_COOLDOWN_MINUTES {
            return Err(invalid(
                "alerts.cooldown_minutes",
                format!("must be at most {MAX_COOLDOWN_MINUTES}"),
            ));
        }
        if self.alerts.strengthen_delta == 0 {
            return Err(invalid("alerts.strengthen_delta", "must be at least 1"));
        }
        if self.ai.per_symbol_daily == 0 || self.ai.bot_daily == 0 {
            return Err(invalid("ai", "daily limits must be at least 1"));
        }
        if self.ai.per_symbol_daily > self.ai.bot_daily {
            return Err(invalid(
                "ai.per_symbol_daily",
                format!("exceeds bot_daily ({})", self.ai.bot_daily),
            ));
        }
        if self.runtime.interval_seconds == 0 {
            return Err(invalid("runtime.interval_seconds", "must be positive"));
        }
        if self.backtest.forward_bars == 0 {
            return Err(invalid("backtest.forward_bars", "must be at least 1"));
        }
        if !self.backtest.hit_threshold_pct.is_finite() || self.backtest.hit_threshold_pct < 0.0 {
            return Err(invalid("backtest.hit_threshold_pct", "must be a non-negative number"));
        }
        if let Some(gap) = self.data.max_gap_minutes {
            if gap <= 0 {
                return Err(invalid("data.max_gap_minutes", "must be positive"));
            }
        }
        Ok(())
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            alert_threshold: self.scoring.alert_threshold,
            cooldown_minutes: self.alerts.cooldown_minutes,
            strengthen_delta: self.alerts.strengthen_delta,
            reset_policy: self.alerts.reset_policy,
        }
    }

    pub fn ai_gate_config(&self) -> AiGateConfig {
        AiGateConfig {
            score_threshold: self.scoring.ai_score_threshold,
            min_s_count: self.scoring.ai_min_s_count,
        }
    }

    pub fn usage_limits(&self) -> UsageLimits {
        UsageLimits {
            per_symbol_daily: self.ai.per_symbol_daily,
            bot_daily: self.ai.bot_daily,
        }
    }

    /// Build the indicator registry from `[indicators]`.
    pub fn registry(&self) -> Result<IndicatorRegistry, ConfigError> {
        let ids: Vec<&str> = if self.indicators.enabled.is_empty() {
            bottomfinder_core::signals::INDICATOR_IDS.to_vec()
        } else {
            self.indicators.enabled.iter().map(String::as_str).collect()
        };

        if let Some(unused) = self
            .indicators
            .params
            .keys()
            .find(|id| !ids.contains(&id.as_str()))
        {
            return Err(invalid(
                "indicators.params",
                format!("'{unused}' is not an enabled indicator"),
            ));
        }

        let empty = BTreeMap::new();
        let mut registry = IndicatorRegistry::new();
        for id in ids {
            let params = self.indicators.params.get(id).unwrap_or(&empty);
            registry.register(create_indicator_with(id, params)?)?;
        }
        Ok(registry)
    }

    pub fn pipeline(&self) -> Result<SignalPipeline, ConfigError> {
        Ok(SignalPipeline::new(
            self.registry()?,
            self.gate_config(),
            self.ai_gate_config(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = ScannerConfig::from_toml("").unwrap();
        assert_eq!(config, ScannerConfig::default());
        assert_eq!(config.gate_config(), GateConfig::default());
        assert_eq!(config.ai_gate_config(), AiGateConfig::default());
        assert_eq!(config.usage_limits(), UsageLimits::default());
        assert_eq!(config.backtest, BacktestConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = ScannerConfig::from_toml(
            r#"
            [runtime]
            symbols = ["NVDA", "TSLA"]
            timeframe = "1h"

            [alerts]
            cooldown_minutes = 60
            reset_policy = "new_utc_day"

            [ai]
            per_symbol_daily = 2

            [backtest]
            forward_bars = 10

            [data]
            max_gap_minutes = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.runtime.symbols, vec!["NVDA", "TSLA"]);
        assert_eq!(config.runtime.interval_seconds, 900);
        let gate = config.gate_config();
        assert_eq!(gate.cooldown_minutes, 60);
        assert_eq!(gate.reset_policy, ResetPolicy::NewUtcDay);
        assert_eq!(gate.strengthen_delta, 3);
        assert_eq!(config.usage_limits().per_symbol_daily, 2);
        assert_eq!(config.backtest.forward_bars, 10);
        assert_eq!(config.backtest.hit_threshold_pct, 3.0);
        assert_eq!(config.data.max_gap(), Some(chrono::Duration::minutes(30)));
    }

    #[test]
    fn zero_limits_rejected() {
        let err = ScannerConfig::from_toml("[ai]\nbot_daily = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "ai", .. }));

        let err = ScannerConfig::from_toml("[alerts]\ncooldown_minutes = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "alerts.cooldown_minutes",
                ..
            }
        ));
    }

    #[test]
    fn per_symbol_above_bot_cap_rejected() {
        let err = ScannerConfig::from_toml("[ai]\nper_symbol_daily = 30\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = ScannerConfig::from_toml("[runtime\nsymbols = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn registry_from_enabled_list() {
        let config = ScannerConfig::from_toml(
            r#"
            [indicators]
            enabled = ["mfi", "wvf_spike"]

            [indicators.params.mfi]
            oversold = 15.0
            "#,
        )
        .unwrap();
        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("mfi").is_some());
        assert!(registry.get("cmf").is_none());
    }

    #[test]
    fn default_registry_has_every_indicator() {
        let registry = ScannerConfig::default().registry().unwrap();
        assert_eq!(registry.len(), 17);
    }

    #[test]
    fn unknown_indicator_is_reported() {
        let config = ScannerConfig::from_toml("[indicators]\nenabled = [\"nope\"]\n").unwrap();
        let err = config.registry().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Indicator(FactoryError::UnknownIndicator(ref id)) if id == "nope"
        ));
    }

    #[test]
    fn params_for_disabled_indicator_rejected() {
        let config = ScannerConfig::from_toml(
            "[indicators]\nenabled = [\"mfi\"]\n[indicators.params.cmf]\nperiod = 10.0\n",
        )
        .unwrap();
        assert!(config.registry().is_err());
    }

    #[test]
    fn misspelled_param_name_rejected() {
        let config = ScannerConfig::from_toml(
            r#"
            [indicators]
            enabled = ["mfi", "rsi_sma200"]

            [indicators.params.mfi]
            peroid = 5.0
            "#,
        )
        .unwrap();
        let err = config.registry().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Indicator(FactoryError::UnknownParam { ref name, .. }) if name == "peroid"
        ));
    }

    #[test]
    fn param_override_changes_indicator() {
        let config = ScannerConfig::from_toml(
            r#"
            [indicators]
            enabled = ["rsi_sma200"]

            [indicators.params.rsi_sma200]
            sma_period = 50.0
            "#,
        )
        .unwrap();
        let registry = config.registry().unwrap();
        assert_eq!(registry.get("rsi_sma200").unwrap().lookback(), 50);
    }

    #[test]
    fn huge_cooldown_rejected() {
        let err = ScannerConfig::from_toml("[alerts]\ncooldown_minutes = 9223372036854775807\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "alerts.cooldown_minutes", .. }
        ));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = ScannerConfig::default();
        config.runtime.symbols = vec!["AMD".into()];
        let text = config.to_toml().unwrap();
        assert_eq!(ScannerConfig::from_toml(&text).unwrap(), config);
    }
}
