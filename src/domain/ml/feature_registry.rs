use crate::domain::errors::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current version of the model input contract.
pub const SCHEMA_VERSION: u32 = 1;

/// Ordered list of model inputs.
/// Training and inference both vectorize through this list; reordering it invalidates every stored model.
pub const FEATURE_NAMES: &[&str] = &[
    "rsi",
    "stoch_k",
    "cci",
    "rsi_prev1",
    "rsi_prev2",
    "macd_hist",
    "trend_strength",
    "macd_hist_prev1",
    "macd_hist_prev2",
    "trend_strength_prev1",
    "trend_strength_prev2",
    "bb_pct",
    "bb_width",
    "atr",
    "mfi",
    "obv_slope",
    "mfi_prev1",
    "mfi_prev2",
    "wick_upper",
    "wick_lower",
    "is_doji",
    "engulfing",
];

/// Every engineered field for one candle, keyed by name.
///
/// Carries more fields than the model consumes (e.g. `macd`, `stoch_d`) so filters and
/// the trade ledger can read them without recomputing indicators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub version: u32,
    pub timestamp: i64,
    pub values: BTreeMap<String, f64>,
}

impl FeatureSnapshot {
    pub fn new(timestamp: i64) -> Self {
        Self {
            version: SCHEMA_VERSION,
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    /// JSON form stored on trade records and experiences.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Versioned, ordered feature contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub names: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::current()
    }
}

impl FeatureSchema {
    pub fn current() -> Self {
        Self {
            version: SCHEMA_VERSION,
            names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Same version and identical name order.
    pub fn matches(&self, other: &FeatureSchema) -> bool {
        self.version == other.version && self.names == other.names
    }

    /// Projects a snapshot onto the contract. Rows with a missing or non-finite field are rejected.
    pub fn vectorize(&self, snapshot: &FeatureSnapshot) -> Result<Vec<f64>, SchemaError> {
        if snapshot.version != self.version {
            return Err(SchemaError::VersionMismatch {
                expected: self.version,
                actual: snapshot.version,
            });
        }

        self.names
            .iter()
            .map(|name| match snapshot.get(name) {
                None => Err(SchemaError::MissingField { name: name.clone() }),
                Some(v) if !v.is_finite() => Err(SchemaError::NonFinite { name: name.clone() }),
                Some(v) => Ok(v),
            })
            .collect()
    }
}
