use crate::domain::errors::TargetingError;
use crate::domain::trading::types::Side;

/// Structure levels a target may snap to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetLevels {
    pub swing_high: f64,
    pub swing_low: f64,
    pub vah: f64,
    pub val: f64,
    pub poc: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardRiskBand {
    pub min: f64,
    pub max: f64,
    /// R multiple used when no level qualifies.
    pub fallback: f64,
}

impl Default for RewardRiskBand {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 2.5,
            fallback: 2.0,
        }
    }
}

/// Nearest structure level in the favourable direction whose reward:risk lies inside `band`.
/// Falls back to `entry ± fallback × risk`.
pub fn logical_target(
    side: Side,
    entry: f64,
    stop: f64,
    levels: &TargetLevels,
    band: &RewardRiskBand,
) -> Result<f64, TargetingError> {
    let risk = (entry - stop).abs();
    if risk == 0.0 {
        return Err(TargetingError::ZeroRisk);
    }
    if (entry - stop) * side.sign() < 0.0 {
        return Err(TargetingError::WrongSide);
    }

    let fallback = entry + side.sign() * risk * band.fallback;

    let mut candidates: Vec<f64> = match side {
        Side::Long => [levels.swing_high, levels.vah, levels.poc]
            .into_iter()
            .filter(|&p| p > entry)
            .collect(),
        Side::Short => [levels.swing_low, levels.val, levels.poc]
            .into_iter()
            .filter(|&p| p < entry)
            .collect(),
    };
    candidates.push(fallback);

    // Closest to entry first.
    match side {
        Side::Long => candidates.sort_by(|a, b| a.total_cmp(b)),
        Side::Short => candidates.sort_by(|a, b| b.total_cmp(a)),
    }

    Ok(candidates
        .into_iter()
        .find(|&target| {
            let ratio = (target - entry).abs() / risk;
            ratio >= band.min && ratio <= band.max
        })
        .unwrap_or(fallback))
}
