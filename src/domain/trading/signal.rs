use super::types::Side;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural setups recognised by the scanner.
///
/// The tag is what lands in the trade ledger and what the traded-today guard matches on,
/// so it must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetupKind {
    ValueAreaBreakout,
    ValueAreaLowRejection,
    ValueAreaHighRejection,
    PocBounceLong,
    PocBounceShort,
}

impl SetupKind {
    pub fn tag(self) -> &'static str {
        match self {
            SetupKind::ValueAreaBreakout => "VAH_Break",
            SetupKind::ValueAreaLowRejection => "VAL_Rej",
            SetupKind::ValueAreaHighRejection => "VAH_Rej",
            SetupKind::PocBounceLong => "POC_Bounce_Long",
            SetupKind::PocBounceShort => "POC_Bounce_Short",
        }
    }

    pub fn side(self) -> Side {
        match self {
            SetupKind::ValueAreaBreakout
            | SetupKind::ValueAreaLowRejection
            | SetupKind::PocBounceLong => Side::Long,
            SetupKind::ValueAreaHighRejection | SetupKind::PocBounceShort => Side::Short,
        }
    }
}

impl fmt::Display for SetupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Ephemeral trade idea, one per symbol per cycle at most.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub setup: SetupKind,
    /// Classifier probability for `side`.
    pub confidence: f64,
}

impl Signal {
    pub fn risk(&self) -> f64 {
        (self.entry - self.stop).abs()
    }

    pub fn reward(&self) -> f64 {
        (self.target - self.entry).abs()
    }

    /// |target - entry| / |entry - stop|, zero when risk is zero.
    pub fn reward_risk_ratio(&self) -> f64 {
        let risk = self.risk();
        if risk > 0.0 { self.reward() / risk } else { 0.0 }
    }

    /// Stop behind entry and target ahead of it, for the signal's side.
    pub fn is_well_ordered(&self) -> bool {
        match self.side {
            Side::Long => self.stop < self.entry && self.entry < self.target,
            Side::Short => self.target < self.entry && self.entry < self.stop,
        }
    }
}
