use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the 70% value area is assembled from the bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueAreaMode {
    /// Heaviest bins first regardless of adjacency. VAH/VAL are the extremes of the chosen set.
    #[default]
    Ranked,
    /// Grow outward from the POC, one neighbour at a time, toward the heavier side.
    Contiguous,
}

impl FromStr for ValueAreaMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ranked" => Ok(ValueAreaMode::Ranked),
            "contiguous" => Ok(ValueAreaMode::Contiguous),
            _ => anyhow::bail!("Invalid value area mode: {}. Must be ranked or contiguous", s),
        }
    }
}

/// Direction in which a low-volume area is searched, relative to the current price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileBin {
    /// Lower edge of the bin.
    pub price: f64,
    /// Smoothed decayed volume.
    pub weight: f64,
    /// Decayed volume before smoothing.
    pub raw_weight: f64,
}

/// Result of one profile computation. Immutable; recompute when the window changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    /// Bins in ascending price order.
    pub bins: Vec<ProfileBin>,
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub mode: ValueAreaMode,
    /// Indices into `bins` forming the value area.
    pub value_area: Vec<usize>,
}

impl VolumeProfile {
    pub fn total_weight(&self) -> f64 {
        self.bins.iter().map(|b| b.weight).sum()
    }

    pub fn mean_weight(&self) -> f64 {
        if self.bins.is_empty() {
            0.0
        } else {
            self.total_weight() / self.bins.len() as f64
        }
    }

    pub fn value_area_weight(&self) -> f64 {
        self.value_area.iter().map(|&i| self.bins[i].weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            ValueAreaMode::from_str("Contiguous").unwrap(),
            ValueAreaMode::Contiguous
        );
        assert!(ValueAreaMode::from_str("fuzzy").is_err());
        assert_eq!(ValueAreaMode::default(), ValueAreaMode::Ranked);
    }
}
