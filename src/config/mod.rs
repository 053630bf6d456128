//! Configuration module for Volume Sniper.
//!
//! Structured configuration loaded from environment variables, organized by concern:
//! Strategy, Risk and ML. Every section has a `Default` so tests never touch the environment.

mod ml_config;
mod risk_env_config;
mod strategy_config;

pub use ml_config::MlEnvConfig;
pub use risk_env_config::RiskEnvConfig;
pub use strategy_config::StrategyEnvConfig;

use crate::domain::trading::types::Timeframe;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Where candles and fills come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Simulated candles, simulated broker.
    Mock,
    /// Candles replayed from a CSV file, simulated broker.
    Replay,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "replay" => Ok(Mode::Replay),
            _ => anyhow::bail!("Invalid MODE: {}. Must be 'mock' or 'replay'", s),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub symbols: Vec<String>,
    pub database_url: String,
    pub scan_interval_secs: u64,
    pub candle_count: usize,
    pub timeframe: Timeframe,
    /// CSV file used in replay mode.
    pub replay_file: Option<String>,

    pub strategy: StrategyEnvConfig,
    pub risk: RiskEnvConfig,
    pub ml: MlEnvConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Mock,
            symbols: vec!["EURUSD".to_string()],
            database_url: "sqlite://data/volume_sniper.db".to_string(),
            scan_interval_secs: 5,
            candle_count: 500,
            timeframe: Timeframe::M5,
            replay_file: None,
            strategy: StrategyEnvConfig::default(),
            risk: RiskEnvConfig::default(),
            ml: MlEnvConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode_str = env::var("MODE").unwrap_or_else(|_| "mock".to_string());
        let mode = Mode::from_str(&mode_str)?;

        let symbols = parse_symbols(&env::var("SYMBOLS").unwrap_or_else(|_| "EURUSD".to_string()));
        if symbols.is_empty() {
            anyhow::bail!("SYMBOLS must list at least one symbol");
        }

        let timeframe =
            Timeframe::from_str(&env::var("TIMEFRAME").unwrap_or_else(|_| "M5".to_string()))?;

        let replay_file = env::var("REPLAY_FILE").ok().filter(|s| !s.is_empty());
        if mode == Mode::Replay && replay_file.is_none() {
            anyhow::bail!("REPLAY_FILE is required when MODE=replay");
        }

        Ok(Self {
            mode,
            symbols,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/volume_sniper.db".to_string()),
            scan_interval_secs: env::var("SCAN_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<u64>()
                .context("Failed to parse SCAN_INTERVAL_SECS")?,
            candle_count: env::var("CANDLE_COUNT")
                .unwrap_or_else(|_| "500".to_string())
                .parse::<usize>()
                .context("Failed to parse CANDLE_COUNT")?,
            timeframe,
            replay_file,
            strategy: StrategyEnvConfig::from_env().context("Failed to load strategy config")?,
            risk: RiskEnvConfig::from_env().context("Failed to load risk config")?,
            ml: MlEnvConfig::from_env().context("Failed to load ML config")?,
        })
    }
}

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_symbol_list_parsing() {
        assert_eq!(
            parse_symbols(" eurusd, XAUUSD ,,btcusd"),
            vec!["EURUSD", "XAUUSD", "BTCUSD"]
        );
        assert!(parse_symbols(" , ").is_empty());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.mode, Mode::Mock);
        assert_eq!(config.candle_count, 500);
        assert_eq!(config.risk.risk_per_trade, dec!(0.01));
        assert_eq!(config.risk.min_margin_level, dec!(150));
        assert_eq!(config.strategy.profile_bins, 50);
        assert_eq!(config.ml.n_trees, 100);
        assert_eq!(MlEnvConfig::offline().max_depth, 8);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(Mode::from_str("REPLAY").unwrap(), Mode::Replay);
        assert!(Mode::from_str("live").is_err());
    }
}
