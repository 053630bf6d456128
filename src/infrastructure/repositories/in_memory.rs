//! In-Memory Repository Implementations
//!
//! Thread-safe implementations of the traits in `domain::repositories`, used by
//! tests and by mock mode when no database is configured.
//!
//! # Limitations
//!
//! - Data is lost on restart
//! - `close` is atomic per record because every mutation holds the write lock

use crate::domain::repositories::{ExperienceStore, ModelStore, StoredModel, TradeLedger};
use crate::domain::trading::trade_record::{
    ExperienceSample, NewTradeRecord, TradeRecord, TradeStatus,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory trade ledger
pub struct InMemoryTradeLedger {
    records: Arc<RwLock<Vec<TradeRecord>>>,
}

impl InMemoryTradeLedger {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot of every record, open or closed.
    pub async fn all(&self) -> Vec<TradeRecord> {
        self.records.read().await.clone()
    }
}

impl Default for InMemoryTradeLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeLedger for InMemoryTradeLedger {
    async fn insert(&self, record: NewTradeRecord) -> Result<i64> {
        let mut records = self.records.write().await;
        let id = records.len() as i64 + 1;
        records.push(record.into_record(id));
        Ok(id)
    }

    async fn open_records(&self) -> Result<Vec<TradeRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| r.is_open()).cloned().collect())
    }

    async fn close(&self, id: i64, result: Decimal) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == id && r.is_open()) {
            Some(record) => {
                record.status = TradeStatus::Closed;
                record.result = Some(result);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn has_traded_today(&self, symbol: &str, setup: &str, day: NaiveDate) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records.iter().any(|r| {
            r.symbol == symbol && r.setup == setup && r.opened_at.date_naive() == day
        }))
    }

    async fn minutes_since_last_trade(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.symbol == symbol)
            .map(|r| r.opened_at)
            .max()
            .map(|last| (now - last).num_seconds() as f64 / 60.0))
    }
}

/// In-memory learning corpus
pub struct InMemoryExperienceStore {
    samples: Arc<RwLock<Vec<ExperienceSample>>>,
}

impl InMemoryExperienceStore {
    pub fn new() -> Self {
        Self {
            samples: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryExperienceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExperienceStore for InMemoryExperienceStore {
    async fn append(&self, sample: &ExperienceSample) -> Result<()> {
        self.samples.write().await.push(sample.clone());
        Ok(())
    }

    async fn load(&self, symbol: &str) -> Result<Vec<ExperienceSample>> {
        let samples = self.samples.read().await;
        Ok(samples
            .iter()
            .filter(|s| s.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.samples.read().await.len())
    }

    async fn symbols(&self) -> Result<Vec<String>> {
        let samples = self.samples.read().await;
        let symbols: BTreeSet<String> = samples.iter().map(|s| s.symbol.clone()).collect();
        Ok(symbols.into_iter().collect())
    }
}

/// In-memory model storage, one model per symbol
pub struct InMemoryModelStore {
    models: Arc<RwLock<HashMap<String, StoredModel>>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self {
            models: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryModelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn save(&self, model: &StoredModel) -> Result<()> {
        self.models
            .write()
            .await
            .insert(model.symbol.clone(), model.clone());
        Ok(())
    }

    async fn load(&self, symbol: &str) -> Result<Option<StoredModel>> {
        Ok(self.models.read().await.get(symbol).cloned())
    }
}
