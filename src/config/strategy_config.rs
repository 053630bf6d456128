//! Strategy configuration parsing from environment variables.
//!
//! Profile geometry, targeting limits and setup thresholds.

use crate::domain::market::volume_profile::ValueAreaMode;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Strategy environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyEnvConfig {
    // Volume profile
    pub profile_lookback: usize,
    pub profile_decay: f64,
    pub profile_bins: usize,
    pub min_profile_candles: usize,
    pub value_area_fraction: f64,
    pub value_area_mode: ValueAreaMode,
    pub lva_fraction: f64,

    // Anchoring
    pub anchor_lookback: usize,
    pub min_anchored_candles: usize,

    // Targeting
    pub max_stop_fraction: f64,
    pub min_reward_risk: f64,
    pub max_reward_risk: f64,
    pub fallback_r_multiple: f64,
    pub swing_lookback: usize,
    pub min_profit_fraction: f64,

    // Setups
    pub atr_tolerance_multiplier: f64,
    pub ai_threshold: f64,
}

impl Default for StrategyEnvConfig {
    fn default() -> Self {
        Self {
            profile_lookback: 96,
            profile_decay: 0.95,
            profile_bins: 50,
            min_profile_candles: 20,
            value_area_fraction: 0.70,
            value_area_mode: ValueAreaMode::Ranked,
            lva_fraction: 0.40,
            anchor_lookback: 30,
            min_anchored_candles: 10,
            max_stop_fraction: 0.0035,
            min_reward_risk: 1.0,
            max_reward_risk: 2.5,
            fallback_r_multiple: 2.0,
            swing_lookback: 50,
            min_profit_fraction: 0.0015,
            atr_tolerance_multiplier: 0.5,
            ai_threshold: 0.60,
        }
    }
}

impl StrategyEnvConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();

        let value_area_mode = match env::var("VALUE_AREA_MODE") {
            Ok(raw) => ValueAreaMode::from_str(&raw)?,
            Err(_) => d.value_area_mode,
        };

        Ok(Self {
            profile_lookback: Self::parse_usize("PROFILE_LOOKBACK", d.profile_lookback)?,
            profile_decay: Self::parse_f64("PROFILE_DECAY", d.profile_decay)?,
            profile_bins: Self::parse_usize("PROFILE_BINS", d.profile_bins)?,
            min_profile_candles: Self::parse_usize("MIN_PROFILE_CANDLES", d.min_profile_candles)?,
            value_area_fraction: Self::parse_f64("VALUE_AREA_FRACTION", d.value_area_fraction)?,
            value_area_mode,
            lva_fraction: Self::parse_f64("LVA_FRACTION", d.lva_fraction)?,
            anchor_lookback: Self::parse_usize("ANCHOR_LOOKBACK", d.anchor_lookback)?,
            min_anchored_candles: Self::parse_usize(
                "MIN_ANCHORED_CANDLES",
                d.min_anchored_candles,
            )?,
            max_stop_fraction: Self::parse_f64("MAX_STOP_FRACTION", d.max_stop_fraction)?,
            min_reward_risk: Self::parse_f64("MIN_REWARD_RISK", d.min_reward_risk)?,
            max_reward_risk: Self::parse_f64("MAX_REWARD_RISK", d.max_reward_risk)?,
            fallback_r_multiple: Self::parse_f64("FALLBACK_R_MULTIPLE", d.fallback_r_multiple)?,
            swing_lookback: Self::parse_usize("SWING_LOOKBACK", d.swing_lookback)?,
            min_profit_fraction: Self::parse_f64("MIN_PROFIT_FRACTION", d.min_profit_fraction)?,
            atr_tolerance_multiplier: Self::parse_f64(
                "ATR_TOLERANCE_MULTIPLIER",
                d.atr_tolerance_multiplier,
            )?,
            ai_threshold: Self::parse_f64("AI_THRESHOLD", d.ai_threshold)?,
        })
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }
}
