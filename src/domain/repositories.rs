//! Repository abstractions for the trade ledger, the learning corpus and model storage.
//!
//! The decision pipeline only talks to these traits. `infrastructure::persistence` provides the
//! SQLite implementations and `infrastructure::repositories` the in-memory ones used in tests
//! and mock mode.

use crate::domain::ml::feature_registry::FeatureSchema;
use crate::domain::trading::trade_record::{ExperienceSample, NewTradeRecord, TradeRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Persisted trades.
#[async_trait]
pub trait TradeLedger: Send + Sync {
    /// Insert a new OPEN record and return its id.
    async fn insert(&self, record: NewTradeRecord) -> Result<i64>;

    /// All records still OPEN, oldest first.
    async fn open_records(&self) -> Result<Vec<TradeRecord>>;

    /// Transition OPEN -> CLOSED with `result`.
    /// Returns `true` only if this call performed the transition.
    async fn close(&self, id: i64, result: Decimal) -> Result<bool>;

    /// Whether `symbol` already traded `setup` on `day` (UTC). Exact tag match.
    async fn has_traded_today(&self, symbol: &str, setup: &str, day: NaiveDate) -> Result<bool>;

    /// Minutes between the most recent trade on `symbol` and `now`, if any.
    async fn minutes_since_last_trade(&self, symbol: &str, now: DateTime<Utc>) -> Result<Option<f64>>;
}

/// Append-only learning corpus.
#[async_trait]
pub trait ExperienceStore: Send + Sync {
    async fn append(&self, sample: &ExperienceSample) -> Result<()>;

    async fn load(&self, symbol: &str) -> Result<Vec<ExperienceSample>>;

    async fn count(&self) -> Result<usize>;

    /// Distinct symbols with at least one sample, sorted.
    async fn symbols(&self) -> Result<Vec<String>>;
}

/// Durable copy of a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredModel {
    pub symbol: String,
    pub schema: FeatureSchema,
    /// serde_json encoding of the ensemble.
    pub blob: String,
    pub trained_at: DateTime<Utc>,
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Replace the stored model for `model.symbol`.
    async fn save(&self, model: &StoredModel) -> Result<()>;

    async fn load(&self, symbol: &str) -> Result<Option<StoredModel>>;
}
