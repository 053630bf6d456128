use crate::domain::ml::feature_registry::FeatureSnapshot;
use crate::domain::trading::types::Side;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumLimits {
    pub long_max_rsi: f64,
    pub short_min_rsi: f64,
    pub long_min_mfi: f64,
    pub short_max_mfi: f64,
}

impl Default for MomentumLimits {
    fn default() -> Self {
        Self {
            long_max_rsi: 75.0,
            short_min_rsi: 25.0,
            long_min_mfi: 40.0,
            short_max_mfi: 60.0,
        }
    }
}

/// Rejects entries into exhausted moves. `Err` carries the reason for the skip log.
pub fn check_momentum(
    side: Side,
    features: &FeatureSnapshot,
    limits: &MomentumLimits,
) -> Result<(), String> {
    let field = |name: &str| {
        features
            .get(name)
            .ok_or_else(|| format!("missing {} feature", name))
    };

    let rsi = field("rsi")?;
    let bb_pct = field("bb_pct")?;
    let mfi = field("mfi")?;
    let is_doji = field("is_doji")?;

    match side {
        Side::Long => {
            if rsi > limits.long_max_rsi {
                return Err(format!("RSI too high ({:.1})", rsi));
            }
            if bb_pct > 1.0 {
                return Err(format!("price above upper Bollinger band (%B {:.2})", bb_pct));
            }
            if mfi < limits.long_min_mfi {
                return Err(format!("no volume support (MFI {:.1})", mfi));
            }
        }
        Side::Short => {
            if rsi < limits.short_min_rsi {
                return Err(format!("RSI too low ({:.1})", rsi));
            }
            if bb_pct < 0.0 {
                return Err(format!("price below lower Bollinger band (%B {:.2})", bb_pct));
            }
            if mfi > limits.short_max_mfi {
                return Err(format!("buying pressure in volume (MFI {:.1})", mfi));
            }
        }
    }

    if is_doji >= 1.0 {
        return Err("last candle is a doji".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(rsi: f64, bb_pct: f64, mfi: f64, doji: f64) -> FeatureSnapshot {
        let mut snap = FeatureSnapshot::new(0);
        snap.set("rsi", rsi);
        snap.set("bb_pct", bb_pct);
        snap.set("mfi", mfi);
        snap.set("is_doji", doji);
        snap
    }

    #[test]
    fn test_long_filters() {
        let limits = MomentumLimits::default();
        assert!(check_momentum(Side::Long, &snapshot(55.0, 0.6, 55.0, 0.0), &limits).is_ok());
        assert!(check_momentum(Side::Long, &snapshot(80.0, 0.6, 55.0, 0.0), &limits).is_err());
        assert!(check_momentum(Side::Long, &snapshot(55.0, 1.2, 55.0, 0.0), &limits).is_err());
        assert!(check_momentum(Side::Long, &snapshot(55.0, 0.6, 35.0, 0.0), &limits).is_err());
    }

    #[test]
    fn test_short_filters() {
        let limits = MomentumLimits::default();
        assert!(check_momentum(Side::Short, &snapshot(45.0, 0.4, 45.0, 0.0), &limits).is_ok());
        assert!(check_momentum(Side::Short, &snapshot(20.0, 0.4, 45.0, 0.0), &limits).is_err());
        assert!(check_momentum(Side::Short, &snapshot(45.0, -0.1, 45.0, 0.0), &limits).is_err());
        assert!(check_momentum(Side::Short, &snapshot(45.0, 0.4, 65.0, 0.0), &limits).is_err());
    }

    #[test]
    fn test_doji_blocks_both_sides() {
        let limits = MomentumLimits::default();
        let err = check_momentum(Side::Short, &snapshot(45.0, 0.4, 45.0, 1.0), &limits).unwrap_err();
        assert!(err.contains("doji"));
        assert!(check_momentum(Side::Long, &snapshot(55.0, 0.6, 55.0, 1.0), &limits).is_err());
    }

    #[test]
    fn test_missing_field_rejects() {
        let mut snap = snapshot(55.0, 0.6, 55.0, 0.0);
        snap.values.remove("mfi");
        assert!(check_momentum(Side::Long, &snap, &MomentumLimits::default()).is_err());
    }
}
