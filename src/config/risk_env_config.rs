//! Risk configuration parsing from environment variables.
//!
//! Position sizing, margin guard, cooldown and spread limits.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Risk management environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RiskEnvConfig {
    /// Fraction of balance risked per trade.
    pub risk_per_trade: Decimal,
    /// Minimum margin level (%) required to open new risk, when reported.
    pub min_margin_level: Decimal,
    /// Share of free margin a single order may consume.
    pub max_margin_usage: Decimal,
    /// Used for the margin fallback when the account leverage is unknown.
    pub default_leverage: u32,
    pub trade_cooldown_minutes: f64,
    pub max_spread_points: f64,
}

impl Default for RiskEnvConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: Decimal::new(1, 2),
            min_margin_level: Decimal::from(150),
            max_margin_usage: Decimal::new(9, 1),
            default_leverage: 30,
            trade_cooldown_minutes: 15.0,
            max_spread_points: 30.0,
        }
    }
}

impl RiskEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            risk_per_trade: Self::parse_decimal("RISK_PER_TRADE", defaults.risk_per_trade)?,
            min_margin_level: Self::parse_decimal("MIN_MARGIN_LEVEL", defaults.min_margin_level)?,
            max_margin_usage: Self::parse_decimal("MAX_MARGIN_USAGE", defaults.max_margin_usage)?,
            default_leverage: Self::parse_u32("DEFAULT_LEVERAGE", defaults.default_leverage)?,
            trade_cooldown_minutes: Self::parse_f64(
                "TRADE_COOLDOWN_MINUTES",
                defaults.trade_cooldown_minutes,
            )?,
            max_spread_points: Self::parse_f64("MAX_SPREAD_POINTS", defaults.max_spread_points)?,
        })
    }

    fn parse_decimal(key: &str, default: Decimal) -> Result<Decimal> {
        match env::var(key) {
            Ok(raw) => Decimal::from_str(raw.trim()).context(format!("Failed to parse {}", key)),
            Err(_) => Ok(default),
        }
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_u32(key: &str, default: u32) -> Result<u32> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u32>()
            .context(format!("Failed to parse {}", key))
    }
}
