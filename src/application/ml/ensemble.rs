use anyhow::{Context, Result, anyhow, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters,
};
use std::fmt;

type Tree = DecisionTreeClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleParams {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl From<&crate::config::MlEnvConfig> for EnsembleParams {
    fn from(config: &crate::config::MlEnvConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf.max(1),
            seed: config.seed,
        }
    }
}

/// Bagged decision trees voting on next-candle direction (class 1 = up).
///
/// Bagging is done here over smartcore's `DecisionTreeClassifier` rather than with its
/// `RandomForestClassifier` because the forest only exposes hard class predictions. The
/// confirmation gate needs a probability, which this type reports as the share of trees
/// voting "up". Per-tree seeds also keep a fit reproducible under rayon.
#[derive(Serialize, Deserialize)]
pub struct BaggedTrees {
    trees: Vec<Tree>,
    n_features: usize,
}

impl fmt::Debug for BaggedTrees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaggedTrees")
            .field("trees", &self.trees.len())
            .field("n_features", &self.n_features)
            .finish()
    }
}

impl BaggedTrees {
    /// Fits `n_trees` trees on bootstrap resamples, in parallel.
    ///
    /// Each tree draws its sample from its own seeded RNG so a fit is reproducible regardless of
    /// thread scheduling. Resamples containing a single class are skipped.
    pub fn fit(x: &[Vec<f64>], y: &[u32], params: &EnsembleParams) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            bail!("Training set is empty or misaligned ({} rows, {} labels)", x.len(), y.len());
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            bail!("Training rows have inconsistent widths");
        }

        let tree_params = DecisionTreeClassifierParameters::default()
            .with_max_depth(params.max_depth)
            .with_min_samples_leaf(params.min_samples_leaf);

        let n = x.len();
        let trees: Vec<Tree> = (0..params.n_trees)
            .into_par_iter()
            .filter_map(|t| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let picks: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();

                let ys: Vec<u32> = picks.iter().map(|&i| y[i]).collect();
                if ys.iter().all(|&c| c == ys[0]) {
                    return None;
                }
                let xs: Vec<Vec<f64>> = picks.iter().map(|&i| x[i].clone()).collect();

                let matrix = DenseMatrix::from_2d_vec(&xs).ok()?;
                Tree::fit(&matrix, &ys, tree_params.clone()).ok()
            })
            .collect();

        if trees.is_empty() {
            bail!("No tree could be fitted ({} rows, {} requested)", n, params.n_trees);
        }

        Ok(Self { trees, n_features })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Share of trees voting "up" for each row.
    pub fn predict_up(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != self.n_features) {
            bail!("Expected {} features, got {}", self.n_features, bad.len());
        }

        let matrix = DenseMatrix::from_2d_vec(&rows.to_vec())
            .map_err(|e| anyhow!("Matrix creation failed: {}", e))?;

        let mut votes = vec![0usize; rows.len()];
        for tree in &self.trees {
            let predictions = tree
                .predict(&matrix)
                .map_err(|e| anyhow!("Prediction failed: {}", e))?;
            for (v, p) in votes.iter_mut().zip(predictions) {
                if p == 1 {
                    *v += 1;
                }
            }
        }

        let total = self.trees.len() as f64;
        Ok(votes.into_iter().map(|v| v as f64 / total).collect())
    }

    /// `[p_down, p_up]` for a single row.
    pub fn predict_proba(&self, row: &[f64]) -> Result<[f64; 2]> {
        let up = self
            .predict_up(&[row.to_vec()])?
            .first()
            .copied()
            .context("No prediction returned")?;
        Ok([1.0 - up, up])
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize ensemble")
    }

    pub fn from_json(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).context("Failed to deserialize ensemble")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Class is 1 when the first feature is positive.
    fn separable(n: usize) -> (Vec<Vec<f64>>, Vec<u32>) {
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let v = (i as f64 / n as f64) * 2.0 - 1.0;
                vec![v, (i % 7) as f64]
            })
            .collect();
        let y = x.iter().map(|r| u32::from(r[0] > 0.0)).collect();
        (x, y)
    }

    fn params() -> EnsembleParams {
        EnsembleParams {
            n_trees: 15,
            max_depth: 4,
            min_samples_leaf: 1,
            seed: 42,
        }
    }

    #[test]
    fn test_learns_separable_rule() {
        let (x, y) = separable(200);
        let model = BaggedTrees::fit(&x, &y, &params()).unwrap();
        assert!(model.n_trees() > 0);

        let [down, up] = model.predict_proba(&[0.9, 3.0]).unwrap();
        assert!(up > 0.8, "up={}", up);
        assert!((down + up - 1.0).abs() < 1e-12);

        let [_, up] = model.predict_proba(&[-0.9, 3.0]).unwrap();
        assert!(up < 0.2, "up={}", up);
    }

    #[test]
    fn test_single_class_cannot_fit() {
        let x = vec![vec![1.0, 2.0]; 30];
        let y = vec![1u32; 30];
        assert!(BaggedTrees::fit(&x, &y, &params()).is_err());
    }

    #[test]
    fn test_wrong_width_rejected_at_predict() {
        let (x, y) = separable(100);
        let model = BaggedTrees::fit(&x, &y, &params()).unwrap();
        assert!(model.predict_proba(&[0.5]).is_err());
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = separable(120);
        let a = BaggedTrees::fit(&x, &y, &params()).unwrap();
        let b = BaggedTrees::fit(&x, &y, &params()).unwrap();
        let rows = vec![vec![0.05, 1.0], vec![-0.05, 2.0], vec![0.3, 5.0]];
        assert_eq!(a.predict_up(&rows).unwrap(), b.predict_up(&rows).unwrap());
    }

    #[test]
    fn test_json_blob_restores_predictions() {
        let (x, y) = separable(120);
        let model = BaggedTrees::fit(&x, &y, &params()).unwrap();
        let restored = BaggedTrees::from_json(&model.to_json().unwrap()).unwrap();
        let rows = vec![vec![0.4, 0.0], vec![-0.4, 6.0]];
        assert_eq!(
            model.predict_up(&rows).unwrap(),
            restored.predict_up(&rows).unwrap()
        );
    }
}
