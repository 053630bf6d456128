use super::logical_target::{RewardRiskBand, TargetLevels, logical_target};
use super::setups::SetupMatch;
use super::smart_stop::smart_stop;
use crate::application::market_structure::find_low_volume_area;
use crate::config::StrategyEnvConfig;
use crate::domain::errors::TargetingError;
use crate::domain::market::volume_profile::{ScanDirection, VolumeProfile};
use crate::domain::trading::signal::Signal;
use crate::domain::trading::types::Side;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PlanRejection {
    #[error(transparent)]
    Targeting(#[from] TargetingError),

    #[error("stop {stop:.5} does not protect {side} entry {entry:.5}")]
    UnprotectedStop { side: Side, entry: f64, stop: f64 },

    #[error("profit potential {potential:.5} below minimum {minimum:.5}")]
    InsufficientProfit { potential: f64, minimum: f64 },
}

/// Turns a structural setup into a concrete entry/stop/target.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePlanner {
    pub max_stop_fraction: f64,
    pub min_profit_fraction: f64,
    pub lva_fraction: f64,
    pub band: RewardRiskBand,
}

impl Default for TradePlanner {
    fn default() -> Self {
        Self::from(&StrategyEnvConfig::default())
    }
}

impl From<&StrategyEnvConfig> for TradePlanner {
    fn from(config: &StrategyEnvConfig) -> Self {
        Self {
            max_stop_fraction: config.max_stop_fraction,
            min_profit_fraction: config.min_profit_fraction,
            lva_fraction: config.lva_fraction,
            band: RewardRiskBand {
                min: config.min_reward_risk,
                max: config.max_reward_risk,
                fallback: config.fallback_r_multiple,
            },
        }
    }
}

impl TradePlanner {
    pub fn plan(
        &self,
        symbol: &str,
        setup: SetupMatch,
        entry: f64,
        profile: &VolumeProfile,
        swings: (f64, f64),
        confidence: f64,
    ) -> Result<Signal, PlanRejection> {
        let (swing_high, swing_low) = swings;
        let side = setup.kind.side();

        let direction = match side {
            Side::Long => ScanDirection::Down,
            Side::Short => ScanDirection::Up,
        };
        let lva = find_low_volume_area(profile, entry, direction, self.lva_fraction);

        let stop = smart_stop(side, entry, lva, setup.swing, self.max_stop_fraction);
        let protective = (entry - stop) * side.sign();
        if protective == 0.0 {
            return Err(TargetingError::ZeroRisk.into());
        }
        if protective < 0.0 {
            return Err(PlanRejection::UnprotectedStop { side, entry, stop });
        }

        let levels = TargetLevels {
            swing_high,
            swing_low,
            vah: profile.vah,
            val: profile.val,
            poc: profile.poc,
        };
        let target = logical_target(side, entry, stop, &levels, &self.band)?;

        let potential = (target - entry).abs();
        let minimum = entry * self.min_profit_fraction;
        if potential < minimum {
            return Err(PlanRejection::InsufficientProfit { potential, minimum });
        }

        Ok(Signal {
            symbol: symbol.to_string(),
            side,
            entry,
            stop,
            target,
            setup: setup.kind,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::volume_profile::{ProfileBin, ValueAreaMode};
    use crate::domain::trading::signal::SetupKind;

    fn flat_profile(poc: f64, vah: f64, val: f64) -> VolumeProfile {
        let bins = (0..10)
            .map(|i| ProfileBin {
                price: 99.0 + 0.2 * i as f64,
                weight: 10.0,
                raw_weight: 10.0,
            })
            .collect();
        VolumeProfile {
            bins,
            poc,
            vah,
            val,
            mode: ValueAreaMode::Ranked,
            value_area: vec![0],
        }
    }

    #[test]
    fn test_long_plan_is_well_ordered() {
        let planner = TradePlanner::default();
        let setup = SetupMatch {
            kind: SetupKind::ValueAreaBreakout,
            swing: 99.8,
        };
        let signal = planner
            .plan("EURUSD", setup, 100.0, &flat_profile(99.5, 99.9, 99.2), (101.0, 98.0), 0.7)
            .unwrap();

        assert!(signal.is_well_ordered());
        assert_eq!(signal.stop, 99.8);
        let rr = signal.reward_risk_ratio();
        assert!((1.0..=2.5).contains(&rr) || (rr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_on_wrong_side_is_rejected() {
        let planner = TradePlanner::default();
        let setup = SetupMatch {
            kind: SetupKind::ValueAreaBreakout,
            swing: 100.1,
        };
        let err = planner
            .plan("EURUSD", setup, 100.0, &flat_profile(99.5, 99.9, 99.2), (101.0, 98.0), 0.7)
            .unwrap_err();
        assert!(matches!(err, PlanRejection::UnprotectedStop { .. }));
    }

    #[test]
    fn test_tiny_risk_fails_profit_check() {
        let planner = TradePlanner::default();
        // risk 0.02 -> 2R target is 0.04 away, below 0.15% of 100
        let setup = SetupMatch {
            kind: SetupKind::PocBounceShort,
            swing: 100.02,
        };
        let err = planner
            .plan("EURUSD", setup, 100.0, &flat_profile(100.0, 100.0, 100.0), (100.0, 100.0), 0.7)
            .unwrap_err();
        assert!(matches!(err, PlanRejection::InsufficientProfit { .. }));
    }
}
