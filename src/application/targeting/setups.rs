//! Structural setup detection.
//!
//! Setups are checked in priority order and the first whose structure matches decides the
//! outcome for the cycle. A matched structure that fails its confirmation yields no setup; the
//! detector never falls through to a lower-priority pattern.

use crate::domain::trading::signal::SetupKind;
use crate::domain::trading::types::Candle;

/// Market state the detector looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetupContext {
    pub last: Candle,
    /// Quote mid price.
    pub mid: f64,
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub vwap: f64,
    pub atr: f64,
    /// EMA20 - EMA50.
    pub trend_strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetupMatch {
    pub kind: SetupKind,
    /// Structural stop candidate before LVA refinement and capping.
    pub swing: f64,
}

pub fn detect_setup(ctx: &SetupContext, atr_multiplier: f64) -> Option<SetupMatch> {
    let tol = ctx.atr * atr_multiplier;
    let close = ctx.last.close;

    if close > ctx.vah + tol && close > ctx.vwap {
        return Some(SetupMatch {
            kind: SetupKind::ValueAreaBreakout,
            swing: ctx.vah - tol,
        });
    }

    if ctx.val - tol < ctx.last.low && ctx.last.low < ctx.val + tol && close > ctx.val {
        let confirmed = ctx.trend_strength > 0.0 || ctx.mid > ctx.vwap;
        return confirmed.then_some(SetupMatch {
            kind: SetupKind::ValueAreaLowRejection,
            swing: ctx.last.low - tol,
        });
    }

    if ctx.vah - tol < ctx.last.high && ctx.last.high < ctx.vah + tol && close < ctx.vah {
        let confirmed = ctx.trend_strength < 0.0 || ctx.mid < ctx.vwap;
        return confirmed.then_some(SetupMatch {
            kind: SetupKind::ValueAreaHighRejection,
            swing: ctx.last.high + tol,
        });
    }

    if (ctx.mid - ctx.poc).abs() < tol {
        if ctx.last.low <= ctx.poc && ctx.poc < close && ctx.mid > ctx.vwap {
            return Some(SetupMatch {
                kind: SetupKind::PocBounceLong,
                swing: ctx.poc - tol,
            });
        }
        if ctx.last.high >= ctx.poc && ctx.poc > close && ctx.mid < ctx.vwap {
            return Some(SetupMatch {
                kind: SetupKind::PocBounceShort,
                swing: ctx.poc + tol,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(open: f64, high: f64, low: f64, close: f64) -> SetupContext {
        SetupContext {
            last: Candle {
                timestamp: 0,
                open,
                high,
                low,
                close,
                volume: 1.0,
            },
            mid: close,
            poc: 100.0,
            vah: 102.0,
            val: 98.0,
            vwap: 100.0,
            atr: 1.0,
            trend_strength: 0.0,
        }
    }

    #[test]
    fn test_breakout_above_value_area() {
        let m = detect_setup(&ctx(102.0, 103.0, 101.9, 102.8), 0.5).unwrap();
        assert_eq!(m.kind, SetupKind::ValueAreaBreakout);
        assert_eq!(m.swing, 101.5);
    }

    #[test]
    fn test_val_rejection_needs_confirmation() {
        let mut c = ctx(98.5, 99.0, 97.8, 98.4);
        c.mid = 98.4; // below vwap
        c.trend_strength = -0.1;
        assert!(detect_setup(&c, 0.5).is_none());

        c.trend_strength = 0.2;
        let m = detect_setup(&c, 0.5).unwrap();
        assert_eq!(m.kind, SetupKind::ValueAreaLowRejection);
        assert!((m.swing - 97.3).abs() < 1e-9);
    }

    #[test]
    fn test_vah_rejection_short() {
        let mut c = ctx(101.5, 102.3, 101.2, 101.4);
        c.trend_strength = -0.5;
        let m = detect_setup(&c, 0.5).unwrap();
        assert_eq!(m.kind, SetupKind::ValueAreaHighRejection);
        assert!((m.swing - 102.8).abs() < 1e-9);
    }

    #[test]
    fn test_poc_bounce_both_directions() {
        let mut c = ctx(99.9, 100.4, 99.8, 100.3);
        c.vwap = 99.5;
        let m = detect_setup(&c, 0.5).unwrap();
        assert_eq!(m.kind, SetupKind::PocBounceLong);
        assert_eq!(m.swing, 99.5);

        let mut c = ctx(100.1, 100.2, 99.6, 99.7);
        c.vwap = 100.5;
        let m = detect_setup(&c, 0.5).unwrap();
        assert_eq!(m.kind, SetupKind::PocBounceShort);
        assert_eq!(m.swing, 100.5);
    }

    #[test]
    fn test_quiet_market_has_no_setup() {
        assert!(detect_setup(&ctx(100.8, 101.0, 100.6, 100.9), 0.5).is_none());
    }
}
