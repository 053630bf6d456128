//! Batch training with a chronological hold-out, used by the `train_ml` binary.
//!
//! Shares `engineer_features` and the feature schema with the live engine, so a model produced
//! here can be dropped into the model store and served without translation.

use super::ensemble::{BaggedTrees, EnsembleParams};
use super::feature_engineering::engineer_features;
use crate::config::MlEnvConfig;
use crate::domain::ml::feature_registry::FeatureSchema;
use crate::domain::trading::types::Candle;
use anyhow::{Context, Result, bail};
use tracing::info;

#[derive(Debug)]
pub struct OfflineReport {
    pub model: BaggedTrees,
    pub train_rows: usize,
    pub test_rows: usize,
    pub accuracy: f64,
    /// Hit rate of "up" calls made with probability above `confidence_threshold`.
    pub precision_at_threshold: Option<f64>,
    pub confident_calls: usize,
    pub confidence_threshold: f64,
}

pub fn train_offline(
    candles: &[Candle],
    config: &MlEnvConfig,
    test_fraction: f64,
    confidence_threshold: f64,
) -> Result<OfflineReport> {
    let schema = FeatureSchema::current();
    let frame = engineer_features(candles)?;
    if frame.is_empty() {
        bail!("Need at least 200 candles, got {}", candles.len());
    }

    let (x, y) = frame
        .labelled_rows(&schema)
        .context("Engineered rows violate the feature schema")?;
    if x.len() < config.min_training_rows {
        bail!("Only {} labelled rows, need {}", x.len(), config.min_training_rows);
    }

    // Chronological split: the test set is strictly later than the training set.
    let split = ((x.len() as f64) * (1.0 - test_fraction)).round() as usize;
    let split = split.clamp(1, x.len() - 1);
    let (x_train, x_test) = x.split_at(split);
    let (y_train, y_test) = y.split_at(split);

    info!(
        "OfflineTrainer: Fitting {} trees (depth {}, min leaf {}) on {} rows, testing on {}",
        config.n_trees,
        config.max_depth,
        config.min_samples_leaf,
        x_train.len(),
        x_test.len()
    );

    let model = BaggedTrees::fit(x_train, y_train, &EnsembleParams::from(config))?;
    let p_up = model.predict_up(x_test)?;

    let correct = p_up
        .iter()
        .zip(y_test)
        .filter(|&(&p, &label)| u32::from(p > 0.5) == label)
        .count();
    let accuracy = correct as f64 / y_test.len() as f64;

    let confident: Vec<u32> = p_up
        .iter()
        .zip(y_test)
        .filter(|&(&p, _)| p > confidence_threshold)
        .map(|(_, &label)| label)
        .collect();
    let precision_at_threshold = if confident.is_empty() {
        None
    } else {
        Some(confident.iter().filter(|&&l| l == 1).count() as f64 / confident.len() as f64)
    };

    Ok(OfflineReport {
        model,
        train_rows: x_train.len(),
        test_rows: x_test.len(),
        accuracy,
        precision_at_threshold,
        confident_calls: confident.len(),
        confidence_threshold,
    })
}
