//! Configuration loading from TOML with environment overrides.
//!
//! Reads `config.toml` (or the file named by `RECOUP_CONFIG`) and
//! deserializes into strongly-typed structs. `PROFIT_TARGET` in the
//! environment overrides the configured default target.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::strategy::{OverBudgetPolicy, RecoveryConfig, DEFAULT_PROFIT_TARGET};
use crate::types::parse_amount;

/// Default config file path.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Finer units than this are not money.
const MAX_DECIMAL_PLACES: u32 = 8;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub data_file: PathBuf,
    pub meta_file: PathBuf,
    pub backup_dir: PathBuf,
    /// Used until the user sets a target of their own.
    #[serde(default = "default_profit_target")]
    pub profit_target: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub over_budget_policy: OverBudgetPolicy,
    /// Currency unit of recommended stakes, as decimal places.
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
    /// Capital credited to the first row when migrating a v1 table that
    /// predates the deposit column.
    #[serde(default)]
    pub legacy_initial_capital: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

fn default_profit_target() -> Decimal {
    DEFAULT_PROFIT_TARGET
}

fn default_decimal_places() -> u32 {
    RecoveryConfig::default().decimal_places
}

fn default_currency() -> String {
    "PLN".to_string()
}

impl LedgerConfig {
    /// Stake sizing settings for the recovery calculator.
    pub fn recovery(&self) -> RecoveryConfig {
        RecoveryConfig {
            decimal_places: self.decimal_places,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Config path from `RECOUP_CONFIG`, falling back to `config.toml`.
    pub fn path_from_env() -> String {
        std::env::var("RECOUP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
    }

    /// Apply `PROFIT_TARGET` from the environment, if set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("PROFIT_TARGET") {
            self.override_profit_target(&raw)?;
        }
        Ok(())
    }

    fn override_profit_target(&mut self, raw: &str) -> Result<()> {
        let target = parse_amount(raw)
            .with_context(|| format!("PROFIT_TARGET is not a number: {raw}"))?;
        self.ledger.profit_target = target;
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.ledger.profit_target <= Decimal::ZERO {
            bail!(
                "profit_target must be greater than 0, got {}",
                self.ledger.profit_target
            );
        }
        if self.ledger.decimal_places > MAX_DECIMAL_PLACES {
            bail!(
                "decimal_places must be at most {MAX_DECIMAL_PLACES}, got {}",
                self.ledger.decimal_places
            );
        }
        if self.ledger.legacy_initial_capital < Decimal::ZERO {
            bail!(
                "legacy_initial_capital cannot be negative, got {}",
                self.ledger.legacy_initial_capital
            );
        }
        Ok(())
    }
}
