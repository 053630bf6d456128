//! Probability engine configuration parsing from environment variables.

use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq)]
pub struct MlEnvConfig {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    /// How many times each live experience is duplicated into the training set.
    pub experience_weight: usize,
    pub min_training_rows: usize,
    pub seed: u64,
}

impl Default for MlEnvConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 5,
            min_samples_leaf: 1,
            experience_weight: 5,
            min_training_rows: 50,
            seed: 42,
        }
    }
}

impl MlEnvConfig {
    /// Heavier profile used by the offline trainer.
    pub fn offline() -> Self {
        Self {
            n_trees: 150,
            max_depth: 8,
            min_samples_leaf: 10,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            n_trees: Self::parse::<usize>("ML_TREES", d.n_trees)?,
            max_depth: Self::parse::<u16>("ML_MAX_DEPTH", d.max_depth)?,
            min_samples_leaf: Self::parse::<usize>("ML_MIN_SAMPLES_LEAF", d.min_samples_leaf)?,
            experience_weight: Self::parse::<usize>("ML_EXPERIENCE_WEIGHT", d.experience_weight)?,
            min_training_rows: Self::parse::<usize>("ML_MIN_TRAINING_ROWS", d.min_training_rows)?,
            seed: Self::parse::<u64>("ML_SEED", d.seed)?,
        })
    }

    fn parse<T>(key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<T>()
            .context(format!("Failed to parse {}", key))
    }
}
