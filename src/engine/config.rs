//! Engine configuration
//!
//! Symbol layout, pricing parameters, signal thresholds, run limits and the
//! execution mode. Loaded from TOML; every field has a default so a partial
//! file is valid. `validate()` runs before any event is processed.

use crate::engine::clock::{parse_timestamp, Nanos};
use crate::engine::error::SignalError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub symbol: SymbolConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub signal: SignalConfig,

    #[serde(default)]
    pub limits: RunLimits,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl EngineConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from environment or default path
    pub fn from_env() -> Self {
        let path = std::env::var("OPTSIGNAL_CONFIG_PATH")
            .unwrap_or_else(|_| "optsignal.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default engine config ({}): {}", path, e);
            Self::default()
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), SignalError> {
        self.symbol.validate()?;
        self.pricing.validate()?;
        self.signal.validate()?;
        self.limits.validate()?;
        self.execution.validate()?;
        Ok(())
    }
}

/// Fixed-width layout of contract identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Expiry digits: 6 (YYMMDD) or 8 (YYYYMMDD)
    #[serde(default = "default_expiry_width")]
    pub expiry_width: usize,

    /// Strike digits
    #[serde(default = "default_strike_width")]
    pub strike_width: usize,

    /// Divisor applied to the strike digits
    #[serde(default = "default_strike_scale")]
    pub strike_scale: u32,

    /// Root padding used when re-encoding (0 = single space)
    #[serde(default = "default_root_width")]
    pub root_width: usize,

    #[serde(default = "default_call_code")]
    pub call_code: char,

    #[serde(default = "default_put_code")]
    pub put_code: char,
}

fn default_expiry_width() -> usize {
    6
}
fn default_strike_width() -> usize {
    8
}
fn default_strike_scale() -> u32 {
    1000
}
fn default_root_width() -> usize {
    6
}
fn default_call_code() -> char {
    'C'
}
fn default_put_code() -> char {
    'P'
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            expiry_width: default_expiry_width(),
            strike_width: default_strike_width(),
            strike_scale: default_strike_scale(),
            root_width: default_root_width(),
            call_code: default_call_code(),
            put_code: default_put_code(),
        }
    }
}

impl SymbolConfig {
    fn validate(&self) -> Result<(), SignalError> {
        if self.expiry_width != 6 && self.expiry_width != 8 {
            return Err(SignalError::config(
                "symbol.expiry_width",
                format!("must be 6 or 8, got {}", self.expiry_width),
            ));
        }
        // u64 holds 19 digits; keep one in reserve
        if self.strike_width == 0 || self.strike_width > 18 {
            return Err(SignalError::config(
                "symbol.strike_width",
                format!("must be in 1..=18, got {}", self.strike_width),
            ));
        }
        if self.strike_scale == 0 {
            return Err(SignalError::config("symbol.strike_scale", "must be positive"));
        }
        if self.call_code == self.put_code {
            return Err(SignalError::config(
                "symbol.put_code",
                "call and put codes must differ",
            ));
        }
        if !self.call_code.is_ascii_alphabetic() || !self.put_code.is_ascii_alphabetic() {
            return Err(SignalError::config(
                "symbol.call_code",
                "type codes must be ASCII letters",
            ));
        }
        Ok(())
    }
}

/// Black-Scholes parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Continuously compounded risk-free rate
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    /// Annualized volatility used for fair value
    #[serde(default = "default_volatility")]
    pub volatility: f64,

    /// Implied-volatility solver price tolerance
    #[serde(default = "default_iv_tolerance")]
    pub iv_tolerance: f64,

    #[serde(default = "default_iv_max_iterations")]
    pub iv_max_iterations: u32,

    /// Days per year in the actual/basis day count
    #[serde(default = "default_day_count_basis")]
    pub day_count_basis: f64,
}

fn default_risk_free_rate() -> f64 {
    0.03
}
fn default_volatility() -> f64 {
    0.15
}
fn default_iv_tolerance() -> f64 {
    1e-8
}
fn default_iv_max_iterations() -> u32 {
    100
}
fn default_day_count_basis() -> f64 {
    365.25
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            volatility: default_volatility(),
            iv_tolerance: default_iv_tolerance(),
            iv_max_iterations: default_iv_max_iterations(),
            day_count_basis: default_day_count_basis(),
        }
    }
}

impl PricingConfig {
    fn validate(&self) -> Result<(), SignalError> {
        if !self.risk_free_rate.is_finite() {
            return Err(SignalError::config("pricing.risk_free_rate", "must be finite"));
        }
        if !(self.volatility.is_finite() && self.volatility > 0.0) {
            return Err(SignalError::config(
                "pricing.volatility",
                format!("must be positive, got {}", self.volatility),
            ));
        }
        if !(self.iv_tolerance.is_finite() && self.iv_tolerance > 0.0) {
            return Err(SignalError::config("pricing.iv_tolerance", "must be positive"));
        }
        if self.iv_max_iterations == 0 {
            return Err(SignalError::config(
                "pricing.iv_max_iterations",
                "must be at least 1",
            ));
        }
        if !(self.day_count_basis.is_finite() && self.day_count_basis > 0.0) {
            return Err(SignalError::config("pricing.day_count_basis", "must be positive"));
        }
        Ok(())
    }
}

/// Mispricing rule and fair-value window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Spot estimates kept in the rolling window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Absolute gap between fair value and the quote required to trade
    #[serde(default = "default_mispricing_threshold")]
    pub mispricing_threshold: f64,

    /// Quotes with an ask below this are ignored
    #[serde(default = "default_min_ask_price")]
    pub min_ask_price: f64,

    /// Fraction of the displayed size to trade
    #[serde(default = "default_size_fraction")]
    pub size_fraction: f64,

    #[serde(default = "default_min_order_size")]
    pub min_order_size: u64,

    /// Buy when fair value exceeds the ask by the threshold
    #[serde(default)]
    pub enable_buy_signals: bool,

    /// Sell held longs whenever the bid is above average cost
    #[serde(default)]
    pub take_profit_exit: bool,

    /// Stop when the aligned bar is older than this
    #[serde(default)]
    pub max_bar_staleness_secs: Option<u64>,

    /// Keep every fair-value sample in the run output
    #[serde(default)]
    pub collect_samples: bool,
}

fn default_window_size() -> usize {
    10
}
fn default_mispricing_threshold() -> f64 {
    10.0
}
fn default_min_ask_price() -> f64 {
    25.0
}
fn default_size_fraction() -> f64 {
    0.25
}
fn default_min_order_size() -> u64 {
    1
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            mispricing_threshold: default_mispricing_threshold(),
            min_ask_price: default_min_ask_price(),
            size_fraction: default_size_fraction(),
            min_order_size: default_min_order_size(),
            enable_buy_signals: false,
            take_profit_exit: false,
            max_bar_staleness_secs: None,
            collect_samples: false,
        }
    }
}

impl SignalConfig {
    fn validate(&self) -> Result<(), SignalError> {
        if self.window_size == 0 {
            return Err(SignalError::config("signal.window_size", "must be at least 1"));
        }
        if !(self.mispricing_threshold.is_finite() && self.mispricing_threshold >= 0.0) {
            return Err(SignalError::config(
                "signal.mispricing_threshold",
                format!("must be finite and non-negative, got {}", self.mispricing_threshold),
            ));
        }
        if !(self.min_ask_price.is_finite() && self.min_ask_price >= 0.0) {
            return Err(SignalError::config(
                "signal.min_ask_price",
                format!("must be finite and non-negative, got {}", self.min_ask_price),
            ));
        }
        if !(self.size_fraction > 0.0 && self.size_fraction <= 1.0) {
            return Err(SignalError::config(
                "signal.size_fraction",
                format!("must be in (0, 1], got {}", self.size_fraction),
            ));
        }
        if self.min_order_size == 0 {
            return Err(SignalError::config("signal.min_order_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// Cooperative cutoffs checked once per event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Stop after this many quote events
    #[serde(default)]
    pub max_events: Option<u64>,

    /// Stop before the first quote later than this (RFC3339)
    #[serde(default)]
    pub end_time: Option<String>,
}

impl RunLimits {
    fn validate(&self) -> Result<(), SignalError> {
        if let Some(end) = &self.end_time {
            if parse_timestamp(end).is_none() {
                return Err(SignalError::config(
                    "limits.end_time",
                    format!("not an RFC3339 timestamp: {}", end),
                ));
            }
        }
        Ok(())
    }

    pub fn end_time_nanos(&self) -> Option<Nanos> {
        self.end_time.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Single in-order fold over the quote stream
    #[default]
    Sequential,
    /// Per-symbol workers over a shared, read-only bar series
    Partitioned,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Worker threads for partitioned mode (rayon default when unset)
    #[serde(default)]
    pub workers: Option<usize>,
}

impl ExecutionConfig {
    fn validate(&self) -> Result<(), SignalError> {
        if self.workers == Some(0) {
            return Err(SignalError::config("execution.workers", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.signal.window_size, 10);
        assert_eq!(config.symbol.strike_scale, 1000);
        assert_eq!(config.execution.mode, ExecutionMode::Sequential);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml = r#"
            [signal]
            window_size = 5
            enable_buy_signals = true

            [execution]
            mode = "partitioned"
        "#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.signal.window_size, 5);
        assert!(config.signal.enable_buy_signals);
        assert_eq!(config.signal.mispricing_threshold, 10.0);
        assert_eq!(config.pricing.volatility, 0.15);
        assert_eq!(config.execution.mode, ExecutionMode::Partitioned);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = EngineConfig::default();
        config.limits.max_events = Some(5000);
        config.symbol.strike_scale = 10_000;
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.signal.window_size = 0;
        assert!(matches!(
            config.validate(),
            Err(SignalError::Config { field: "signal.window_size", .. })
        ));

        let mut config = EngineConfig::default();
        config.symbol.strike_scale = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.signal.mispricing_threshold = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.signal.size_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.symbol.expiry_width = 7;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.limits.end_time = Some("yesterday".into());
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.execution.workers = Some(0);
        assert!(config.validate().is_err());
    }
}
