use super::ensemble::BaggedTrees;
use crate::domain::ml::feature_registry::FeatureSchema;
use crate::domain::repositories::StoredModel;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Trained classifier for one symbol together with the contract it was trained on.
#[derive(Debug)]
pub struct SymbolModel {
    pub symbol: String,
    pub schema: FeatureSchema,
    pub ensemble: BaggedTrees,
    /// Registry-wide install counter at the time this model became current.
    pub generation: u64,
    pub trained_at: DateTime<Utc>,
}

impl SymbolModel {
    pub fn to_stored(&self) -> Result<StoredModel> {
        Ok(StoredModel {
            symbol: self.symbol.clone(),
            schema: self.schema.clone(),
            blob: self.ensemble.to_json()?,
            trained_at: self.trained_at,
        })
    }
}

/// Current model per symbol. Models are immutable once installed; a retrain swaps the `Arc`.
#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, Arc<SymbolModel>>>,
    generation: AtomicU64,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, symbol: &str) -> Option<Arc<SymbolModel>> {
        self.models.read().await.get(symbol).cloned()
    }

    /// Makes `ensemble` the current model for `symbol` and returns it.
    pub async fn install(
        &self,
        symbol: &str,
        schema: FeatureSchema,
        ensemble: BaggedTrees,
        trained_at: DateTime<Utc>,
    ) -> Arc<SymbolModel> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let model = Arc::new(SymbolModel {
            symbol: symbol.to_string(),
            schema,
            ensemble,
            generation,
            trained_at,
        });
        self.models
            .write()
            .await
            .insert(symbol.to_string(), Arc::clone(&model));
        model
    }

    /// Installs a model restored from durable storage.
    pub async fn install_stored(&self, stored: &StoredModel) -> Result<Arc<SymbolModel>> {
        let ensemble = BaggedTrees::from_json(&stored.blob)?;
        Ok(self
            .install(&stored.symbol, stored.schema.clone(), ensemble, stored.trained_at)
            .await)
    }

    pub async fn generation(&self, symbol: &str) -> Option<u64> {
        self.get(symbol).await.map(|m| m.generation)
    }
}
