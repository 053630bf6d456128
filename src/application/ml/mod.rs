//! Probability engine: feature engineering, bagged tree ensemble, model registry and training.

pub mod ensemble;
pub mod feature_engineering;
pub mod model_registry;
pub mod offline_trainer;
pub mod probability_engine;

pub use ensemble::{BaggedTrees, EnsembleParams};
pub use feature_engineering::{FeatureFrame, engineer_features};
pub use model_registry::{ModelRegistry, SymbolModel};
pub use offline_trainer::{OfflineReport, train_offline};
pub use probability_engine::{Prediction, PredictionSource, ProbabilityEngine, TrainingReport};
