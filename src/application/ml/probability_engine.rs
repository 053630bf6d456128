use super::ensemble::{BaggedTrees, EnsembleParams};
use super::feature_engineering::engineer_features;
use super::model_registry::{ModelRegistry, SymbolModel};
use crate::config::MlEnvConfig;
use crate::domain::errors::DecisionError;
use crate::domain::ml::feature_registry::{FeatureSchema, FeatureSnapshot};
use crate::domain::repositories::{ExperienceStore, ModelStore};
use crate::domain::trading::trade_record::ExperienceSample;
use crate::domain::trading::types::{Candle, Side};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Where a probability came from.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionSource {
    Model { generation: u64 },
    /// Fail-closed default; the reason is kept for logging.
    Neutral(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub p_down: f64,
    pub p_up: f64,
    pub source: PredictionSource,
}

impl Prediction {
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            p_down: 0.5,
            p_up: 0.5,
            source: PredictionSource::Neutral(reason.into()),
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self.source, PredictionSource::Neutral(_))
    }

    pub fn for_side(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.p_up,
            Side::Short => self.p_down,
        }
    }
}

/// What one successful fit consumed.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model: Arc<SymbolModel>,
    pub market_rows: usize,
    /// Experiences accepted into the fit, counted once each.
    pub experiences: usize,
    /// Rows the ensemble was fitted on, replicated experiences included.
    pub total_rows: usize,
}

/// Per-symbol classifier lifecycle: training, inference and the experience feedback loop.
pub struct ProbabilityEngine {
    registry: Arc<ModelRegistry>,
    model_store: Arc<dyn ModelStore>,
    experiences: Arc<dyn ExperienceStore>,
    config: MlEnvConfig,
    schema: FeatureSchema,
    load_attempted: Mutex<HashSet<String>>,
}

impl ProbabilityEngine {
    pub fn new(
        registry: Arc<ModelRegistry>,
        model_store: Arc<dyn ModelStore>,
        experiences: Arc<dyn ExperienceStore>,
        config: MlEnvConfig,
    ) -> Self {
        Self {
            registry,
            model_store,
            experiences,
            config,
            schema: FeatureSchema::current(),
            load_attempted: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Current model, lazily restored from the model store on first access.
    pub async fn current_model(&self, symbol: &str) -> Option<Arc<SymbolModel>> {
        if let Some(model) = self.registry.get(symbol).await {
            return Some(model);
        }

        {
            let mut attempted = self.load_attempted.lock().await;
            if !attempted.insert(symbol.to_string()) {
                return None;
            }
        }

        match self.model_store.load(symbol).await {
            Ok(Some(stored)) => match self.registry.install_stored(&stored).await {
                Ok(model) => {
                    info!(
                        "ProbabilityEngine [{}]: Restored model trained at {} (generation {})",
                        symbol, stored.trained_at, model.generation
                    );
                    Some(model)
                }
                Err(e) => {
                    error!("ProbabilityEngine [{}]: Stored model is unreadable: {:#}", symbol, e);
                    None
                }
            },
            Ok(None) => {
                debug!("ProbabilityEngine [{}]: No stored model", symbol);
                None
            }
            Err(e) => {
                error!("ProbabilityEngine [{}]: Failed to load model: {:#}", symbol, e);
                None
            }
        }
    }

    /// Retrains the symbol's model from `candles` plus its live experiences.
    ///
    /// Either source may be empty. Returns `Ok(None)` when together they give fewer than
    /// `min_training_rows` rows. The new model is installed before it is persisted; a
    /// persistence failure is logged and does not undo the install.
    pub async fn train(
        &self,
        symbol: &str,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> Result<Option<TrainingReport>> {
        let frame = engineer_features(candles)?;
        if frame.is_empty() {
            debug!(
                "ProbabilityEngine [{}]: {} candles give no market rows",
                symbol,
                candles.len()
            );
        }

        let (mut x, mut y) = frame
            .labelled_rows(&self.schema)
            .context("Engineered rows violate the feature schema")?;
        let market_rows = x.len();

        let samples = self.experiences.load(symbol).await?;
        let mut accepted = 0;
        for sample in &samples {
            match self.schema.vectorize(&sample.snapshot) {
                Ok(row) => {
                    for _ in 0..self.config.experience_weight {
                        x.push(row.clone());
                        y.push(u32::from(sample.label));
                    }
                    accepted += 1;
                }
                Err(e) => warn!(
                    "ProbabilityEngine [{}]: Skipping experience recorded at {}: {}",
                    symbol, sample.recorded_at, e
                ),
            }
        }

        if x.len() < self.config.min_training_rows {
            info!(
                "ProbabilityEngine [{}]: Only {} training rows, need {}",
                symbol,
                x.len(),
                self.config.min_training_rows
            );
            return Ok(None);
        }

        let total_rows = x.len();
        let params = EnsembleParams::from(&self.config);
        let ensemble = tokio::task::spawn_blocking(move || BaggedTrees::fit(&x, &y, &params))
            .await
            .context("Training task panicked")??;

        let model = self
            .registry
            .install(symbol, self.schema.clone(), ensemble, now)
            .await;

        info!(
            "ProbabilityEngine [{}]: Trained {} trees on {} market rows + {} experiences (x{}) -> generation {}",
            symbol,
            model.ensemble.n_trees(),
            market_rows,
            accepted,
            self.config.experience_weight,
            model.generation
        );

        match model.to_stored() {
            Ok(stored) => {
                if let Err(e) = self.model_store.save(&stored).await {
                    error!("ProbabilityEngine [{}]: Failed to persist model: {:#}", symbol, e);
                }
            }
            Err(e) => error!("ProbabilityEngine [{}]: Failed to encode model: {:#}", symbol, e),
        }

        Ok(Some(TrainingReport {
            model,
            market_rows,
            experiences: accepted,
            total_rows,
        }))
    }

    /// Refits every symbol present in the experience corpus.
    ///
    /// `history` supplies market candles per symbol; a symbol without history is fitted on its
    /// experiences alone. A failure on one symbol is logged and reported as `None` for it.
    pub async fn retrain_from_experience(
        &self,
        history: &HashMap<String, Vec<Candle>>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, Option<TrainingReport>)>> {
        let symbols = self
            .experiences
            .symbols()
            .await
            .context("Failed to list experience symbols")?;

        let mut reports = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let candles = history.get(&symbol).map(Vec::as_slice).unwrap_or(&[]);
            info!(
                "ProbabilityEngine [{}]: Retraining from experience ({} candles)",
                symbol,
                candles.len()
            );
            let report = match self.train(&symbol, candles, now).await {
                Ok(report) => report,
                Err(e) => {
                    error!("ProbabilityEngine [{}]: Retrain failed: {:#}", symbol, e);
                    None
                }
            };
            reports.push((symbol, report));
        }
        Ok(reports)
    }

    /// Win probabilities for the latest feature row. Never fails: any problem yields the
    /// neutral [0.5, 0.5] answer.
    pub async fn predict(&self, symbol: &str, snapshot: Option<&FeatureSnapshot>) -> Prediction {
        let Some(model) = self.current_model(symbol).await else {
            return Prediction::neutral("no model");
        };
        let Some(snapshot) = snapshot else {
            return Prediction::neutral("no features");
        };

        if !model.schema.matches(&self.schema) {
            let err = DecisionError::ModelContractMismatch {
                symbol: symbol.to_string(),
                expected: self.schema.len(),
                actual: model.schema.len(),
            };
            warn!("ProbabilityEngine [{}]: {}", symbol, err);
            return Prediction::neutral(err.kind());
        }

        let row = match model.schema.vectorize(snapshot) {
            Ok(row) => row,
            Err(e) => {
                warn!("ProbabilityEngine [{}]: Rejected feature row: {}", symbol, e);
                return Prediction::neutral(e.to_string());
            }
        };

        match model.ensemble.predict_proba(&row) {
            Ok([p_down, p_up]) => Prediction {
                p_down,
                p_up,
                source: PredictionSource::Model {
                    generation: model.generation,
                },
            },
            Err(e) => {
                warn!("ProbabilityEngine [{}]: Inference failed: {:#}", symbol, e);
                Prediction::neutral("inference failed")
            }
        }
    }

    /// Appends one realized outcome to the learning corpus.
    pub async fn record_experience(
        &self,
        symbol: &str,
        snapshot: FeatureSnapshot,
        label: u8,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let sample = ExperienceSample {
            symbol: symbol.to_string(),
            snapshot,
            label,
            recorded_at: now,
        };
        self.experiences
            .append(&sample)
            .await
            .with_context(|| format!("Failed to record experience for {}", symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::feature_engineering::tests::synthetic_candles;
    use crate::domain::ml::feature_registry::FEATURE_NAMES;
    use crate::infrastructure::repositories::{InMemoryExperienceStore, InMemoryModelStore};

    fn small_config() -> MlEnvConfig {
        MlEnvConfig {
            n_trees: 10,
            max_depth: 3,
            ..MlEnvConfig::default()
        }
    }

    fn engine(models: Arc<InMemoryModelStore>, experiences: Arc<InMemoryExperienceStore>) -> ProbabilityEngine {
        ProbabilityEngine::new(Arc::new(ModelRegistry::new()), models, experiences, small_config())
    }

    fn full_snapshot() -> FeatureSnapshot {
        let mut snap = FeatureSnapshot::new(0);
        for name in FEATURE_NAMES {
            snap.set(name, 0.1);
        }
        snap
    }

    #[tokio::test]
    async fn test_no_model_is_neutral() {
        let engine = engine(Arc::new(InMemoryModelStore::new()), Arc::new(InMemoryExperienceStore::new()));
        let p = engine.predict("EURUSD", Some(&full_snapshot())).await;
        assert!(p.is_neutral());
        assert_eq!((p.p_down, p.p_up), (0.5, 0.5));
    }

    #[tokio::test]
    async fn test_train_installs_and_persists() {
        let store = Arc::new(InMemoryModelStore::new());
        let engine = engine(store.clone(), Arc::new(InMemoryExperienceStore::new()));

        let report = engine
            .train("EURUSD", &synthetic_candles(300), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(report.model.ensemble.n_trees() > 0);
        assert_eq!(report.experiences, 0);
        assert_eq!(report.total_rows, report.market_rows);
        assert!(store.load("EURUSD").await.unwrap().is_some());

        let p = engine.predict("EURUSD", Some(&full_snapshot())).await;
        assert!(!p.is_neutral());
        assert!((p.p_up + p.p_down - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_missing_field_fails_closed() {
        let engine = engine(Arc::new(InMemoryModelStore::new()), Arc::new(InMemoryExperienceStore::new()));
        engine
            .train("EURUSD", &synthetic_candles(300), Utc::now())
            .await
            .unwrap();

        let mut snap = full_snapshot();
        snap.values.remove("obv_slope");
        let p = engine.predict("EURUSD", Some(&snap)).await;
        assert!(p.is_neutral());
        assert_eq!(p.p_up, 0.5);

        let p = engine.predict("EURUSD", None).await;
        assert!(p.is_neutral());
    }

    #[tokio::test]
    async fn test_schema_drift_fails_closed() {
        let engine = engine(Arc::new(InMemoryModelStore::new()), Arc::new(InMemoryExperienceStore::new()));

        let mut drifted = FeatureSchema::current();
        drifted.names.swap(0, 1);
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![(i % 2) as f64; drifted.len()]).collect();
        let y: Vec<u32> = (0..40).map(|i| (i % 2) as u32).collect();
        let ensemble = BaggedTrees::fit(&x, &y, &EnsembleParams::from(&small_config())).unwrap();
        engine.registry().install("EURUSD", drifted, ensemble, Utc::now()).await;

        let p = engine.predict("EURUSD", Some(&full_snapshot())).await;
        assert_eq!(
            p.source,
            PredictionSource::Neutral("model_contract_mismatch".to_string())
        );
    }

    #[tokio::test]
    async fn test_model_restored_lazily_from_store() {
        let store = Arc::new(InMemoryModelStore::new());
        let experiences = Arc::new(InMemoryExperienceStore::new());
        engine(store.clone(), experiences.clone())
            .train("GBPUSD", &synthetic_candles(300), Utc::now())
            .await
            .unwrap();

        let fresh = engine(store, experiences);
        assert!(fresh.registry().get("GBPUSD").await.is_none());
        let p = fresh.predict("GBPUSD", Some(&full_snapshot())).await;
        assert!(!p.is_neutral());
    }

    #[tokio::test]
    async fn test_bad_experiences_are_skipped_and_good_ones_weighted() {
        let experiences = Arc::new(InMemoryExperienceStore::new());
        let engine = engine(Arc::new(InMemoryModelStore::new()), experiences.clone());

        engine
            .record_experience("EURUSD", full_snapshot(), 1, Utc::now())
            .await
            .unwrap();
        engine
            .record_experience("EURUSD", FeatureSnapshot::new(0), 0, Utc::now())
            .await
            .unwrap();
        assert_eq!(experiences.count().await.unwrap(), 2);

        let report = engine
            .train("EURUSD", &synthetic_candles(300), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.experiences, 1);
        assert_eq!(
            report.total_rows,
            report.market_rows + small_config().experience_weight
        );
    }

    #[tokio::test]
    async fn test_retrain_folds_new_experiences_into_next_generation() {
        let experiences = Arc::new(InMemoryExperienceStore::new());
        let store = Arc::new(InMemoryModelStore::new());
        let engine = engine(store.clone(), experiences.clone());
        let candles = synthetic_candles(300);

        let first = engine
            .train("EURUSD", &candles, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.experiences, 0);

        for label in [1, 0, 1] {
            engine
                .record_experience("EURUSD", full_snapshot(), label, Utc::now())
                .await
                .unwrap();
        }

        let history = HashMap::from([("EURUSD".to_string(), candles)]);
        let reports = engine
            .retrain_from_experience(&history, Utc::now())
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        let (symbol, second) = &reports[0];
        let second = second.as_ref().unwrap();

        assert_eq!(symbol, "EURUSD");
        assert!(second.model.generation > first.model.generation);
        assert_eq!(second.experiences, 3);
        assert_eq!(second.market_rows, first.market_rows);
        assert_eq!(
            second.total_rows,
            first.total_rows + 3 * small_config().experience_weight
        );
        assert_eq!(
            engine.registry().generation("EURUSD").await,
            Some(second.model.generation)
        );
        assert_eq!(
            store.load("EURUSD").await.unwrap().unwrap().trained_at,
            second.model.trained_at
        );
    }

    #[tokio::test]
    async fn test_retrain_without_candles_uses_experiences_alone() {
        let experiences = Arc::new(InMemoryExperienceStore::new());
        let engine = engine(Arc::new(InMemoryModelStore::new()), experiences.clone());

        // 10 samples x5 reaches the 50-row minimum.
        for i in 0..10u8 {
            let mut snap = full_snapshot();
            snap.set("rsi", if i % 2 == 0 { 70.0 } else { 30.0 });
            engine
                .record_experience("XAUUSD", snap, i % 2, Utc::now())
                .await
                .unwrap();
        }
        engine
            .record_experience("GBPUSD", full_snapshot(), 1, Utc::now())
            .await
            .unwrap();

        let reports = engine
            .retrain_from_experience(&HashMap::new(), Utc::now())
            .await
            .unwrap();
        let symbols: Vec<&str> = reports.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(symbols, vec!["GBPUSD", "XAUUSD"]);

        // Five rows are below the minimum.
        assert!(reports[0].1.is_none());
        let xau = reports[1].1.as_ref().unwrap();
        assert_eq!(xau.market_rows, 0);
        assert_eq!(xau.total_rows, 50);
        assert!(!engine.predict("XAUUSD", Some(&full_snapshot())).await.is_neutral());
    }
}
