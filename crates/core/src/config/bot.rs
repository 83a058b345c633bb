//! Configuration management with profile support.
//!
//! Provides centralized configuration for all bot parameters with
//! support for different profiles (testing, production, aggressive).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Watchlist tracked-set size and bootstrap candidate selection
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Mempool watchdog timing
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Liquidation execution parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Watchlist tracked-set size and bootstrap candidate selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Maximum size of the Tracked set (spec default 200)
    #[serde(default = "default_k")]
    pub k: usize,

    /// Health-factor multiplier above which a tracked entry is untracked
    /// (hysteresis band, spec default 1.01 over WAD)
    #[serde(default = "default_upper_bound_multiplier")]
    pub upper_bound_multiplier: f64,

    /// Fixed parallel width for bootstrap AccountSummary fan-out
    #[serde(default = "default_bootstrap_width")]
    pub bootstrap_width: usize,

    /// Minimum total_debt (as a fraction of the 1e18 numéraire) for a
    /// bootstrap candidate to be eligible (spec default 1e-4)
    #[serde(default = "default_min_debt_fraction")]
    pub min_debt_fraction: f64,
}

fn default_k() -> usize {
    200
}
fn default_upper_bound_multiplier() -> f64 {
    1.01
}
fn default_bootstrap_width() -> usize {
    500
}
fn default_min_debt_fraction() -> f64 {
    1e-4
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            upper_bound_multiplier: default_upper_bound_multiplier(),
            bootstrap_width: default_bootstrap_width(),
            min_debt_fraction: default_min_debt_fraction(),
        }
    }
}

/// Mempool watchdog timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Hard wall-clock deadline from dispatch (spec default 30s)
    #[serde(default = "default_watchdog_timeout_secs")]
    pub timeout_secs: u64,

    /// Gas-bump numerator/denominator applied to a detected competitor's
    /// gas price (spec default 11/10, i.e. +10%)
    #[serde(default = "default_bump_numerator")]
    pub bump_numerator: u64,
    #[serde(default = "default_bump_denominator")]
    pub bump_denominator: u64,
}

fn default_watchdog_timeout_secs() -> u64 {
    30
}
fn default_bump_numerator() -> u64 {
    11
}
fn default_bump_denominator() -> u64 {
    10
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_watchdog_timeout_secs(),
            bump_numerator: default_bump_numerator(),
            bump_denominator: default_bump_denominator(),
        }
    }
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Liquidation execution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Gas limit passed on every liquidation submission (spec fixed value)
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Gas price formula coefficient (spec constant 29.9895)
    #[serde(default = "default_gas_coefficient")]
    pub gas_price_coefficient: f64,

    /// Gas price formula exponent rate (spec constant 3.50691)
    #[serde(default = "default_gas_exponent_rate")]
    pub gas_price_exponent_rate: f64,

    /// Gas price cap in gwei (spec constant 10000)
    #[serde(default = "default_gas_cap_gwei")]
    pub gas_price_cap_gwei: f64,

    /// Minimum estimated-reward-in-USD below which an attempt is merely
    /// logged as a diagnostic rather than treated as a hard stop (the
    /// spec does not gate submission on profitability; this threshold is
    /// reporting-only)
    #[serde(default = "default_min_profit_usd")]
    pub min_profit_usd_diagnostic: f64,
}

fn default_gas_limit() -> u64 {
    28_000_000
}
fn default_gas_coefficient() -> f64 {
    29.9895
}
fn default_gas_exponent_rate() -> f64 {
    3.50691
}
fn default_gas_cap_gwei() -> f64 {
    10_000.0
}
fn default_min_profit_usd() -> f64 {
    0.0
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            gas_price_coefficient: default_gas_coefficient(),
            gas_price_exponent_rate: default_gas_exponent_rate(),
            gas_price_cap_gwei: default_gas_cap_gwei(),
            min_profit_usd_diagnostic: default_min_profit_usd(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            tracking: TrackingConfig::default(),
            watchdog: WatchdogConfig::default(),
            liquidation: LiquidationConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Create a testing profile with a small tracked set and fast watchdog.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            tracking: TrackingConfig {
                k: 20,
                upper_bound_multiplier: 1.01,
                bootstrap_width: 50,
                min_debt_fraction: 1e-6,
            },
            watchdog: WatchdogConfig {
                timeout_secs: 10,
                bump_numerator: 11,
                bump_denominator: 10,
            },
            liquidation: LiquidationConfig {
                gas_limit: 28_000_000,
                gas_price_coefficient: 29.9895,
                gas_price_exponent_rate: 3.50691,
                gas_price_cap_gwei: 10_000.0,
                min_profit_usd_diagnostic: 0.0,
            },
        }
    }

    /// Create a production profile matching spec.md's stated defaults.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            tracking: TrackingConfig::default(),
            watchdog: WatchdogConfig::default(),
            liquidation: LiquidationConfig {
                min_profit_usd_diagnostic: 1.0,
                ..LiquidationConfig::default()
            },
        }
    }

    /// Create an aggressive profile that tracks more accounts and bumps
    /// mempool competitors faster.
    pub fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            tracking: TrackingConfig {
                k: 400,
                upper_bound_multiplier: 1.02,
                bootstrap_width: 500,
                min_debt_fraction: 1e-4,
            },
            watchdog: WatchdogConfig {
                timeout_secs: 30,
                bump_numerator: 12,
                bump_denominator: 10,
            },
            liquidation: LiquidationConfig::default(),
        }
    }

    /// Get profile from environment variable BOT_PROFILE, or default.
    /// Supported values: testing, production, aggressive
    pub fn from_env() -> Self {
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            "aggressive" | "aggro" => Self::aggressive(),
            _ => Self::default(),
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            k = self.tracking.k,
            upper_bound_multiplier = self.tracking.upper_bound_multiplier,
            bootstrap_width = self.tracking.bootstrap_width,
            min_debt_fraction = self.tracking.min_debt_fraction,
            "Tracking thresholds"
        );
        tracing::info!(
            timeout_secs = self.watchdog.timeout_secs,
            bump = format!("{}/{}", self.watchdog.bump_numerator, self.watchdog.bump_denominator),
            "Watchdog timing"
        );
        tracing::info!(
            gas_limit = self.liquidation.gas_limit,
            gas_price_coefficient = self.liquidation.gas_price_coefficient,
            gas_price_exponent_rate = self.liquidation.gas_price_exponent_rate,
            gas_price_cap_gwei = self.liquidation.gas_price_cap_gwei,
            "Liquidation parameters"
        );
    }
}

/// Global configuration holder using lazy initialization.
use std::sync::OnceLock;

static GLOBAL_CONFIG: OnceLock<BotConfig> = OnceLock::new();

/// Initialize global configuration.
pub fn init_config(config: BotConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

/// Get the global configuration, initializing from environment if needed.
pub fn config() -> &'static BotConfig {
    GLOBAL_CONFIG.get_or_init(BotConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.tracking.k, 200);
        assert_eq!(config.tracking.upper_bound_multiplier, 1.01);
        assert_eq!(config.liquidation.gas_limit, 28_000_000);
    }

    #[test]
    fn test_testing_profile() {
        let config = BotConfig::testing();
        assert_eq!(config.profile, "testing");
        assert!(config.tracking.k < 200);
    }

    #[test]
    fn test_production_profile() {
        let config = BotConfig::production();
        assert_eq!(config.profile, "production");
        assert_eq!(config.tracking.k, 200);
    }

    #[test]
    fn test_serialization() {
        let config = BotConfig::testing();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"testing\""));

        let parsed: BotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.profile, "testing");
    }
}
