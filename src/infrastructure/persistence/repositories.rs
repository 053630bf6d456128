use crate::domain::ml::feature_registry::{FeatureSchema, FeatureSnapshot};
use crate::domain::repositories::{ExperienceStore, ModelStore, StoredModel, TradeLedger};
use crate::domain::trading::trade_record::{
    ExperienceSample, NewTradeRecord, TradeRecord, TradeStatus,
};
use crate::domain::trading::types::Side;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("Invalid timestamp {}", ms))
}

pub struct SqliteTradeLedger {
    pool: SqlitePool,
}

impl SqliteTradeLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<TradeRecord> {
        let side: String = row.try_get("side")?;
        let status: String = row.try_get("status")?;
        let quantity: String = row.try_get("quantity")?;
        let result: Option<String> = row.try_get("result")?;

        Ok(TradeRecord {
            id: row.try_get("id")?,
            symbol: row.try_get("symbol")?,
            side: Side::from_str(&side)?,
            quantity: Decimal::from_str(&quantity).context("Corrupt quantity")?,
            entry: row.try_get("entry")?,
            setup: row.try_get("setup")?,
            snapshot: row.try_get("snapshot")?,
            status: TradeStatus::from_str(&status)?,
            result: result
                .map(|r| Decimal::from_str(&r))
                .transpose()
                .context("Corrupt result")?,
            ticket: row.try_get("ticket")?,
            opened_at: from_millis(row.try_get("opened_at")?)?,
        })
    }
}

#[async_trait]
impl TradeLedger for SqliteTradeLedger {
    async fn insert(&self, record: NewTradeRecord) -> Result<i64> {
        let outcome = sqlx::query(
            r#"
            INSERT INTO trades (symbol, side, quantity, entry, setup, snapshot, status, ticket, opened_at)
            VALUES (?, ?, ?, ?, ?, ?, 'OPEN', ?, ?)
            "#,
        )
        .bind(&record.symbol)
        .bind(record.side.to_string())
        .bind(record.quantity.to_string())
        .bind(record.entry)
        .bind(&record.setup)
        .bind(&record.snapshot)
        .bind(record.ticket)
        .bind(record.opened_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert trade")?;

        let id = outcome.last_insert_rowid();
        info!(
            "Persisted trade {} [{}] {} {} ({})",
            id, record.symbol, record.side, record.quantity, record.setup
        );
        Ok(id)
    }

    async fn open_records(&self) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query("SELECT * FROM trades WHERE status = 'OPEN' ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn close(&self, id: i64, result: Decimal) -> Result<bool> {
        // Conditional update: a second close of the same id affects no rows.
        let outcome = sqlx::query(
            "UPDATE trades SET status = 'CLOSED', result = ? WHERE id = ? AND status = 'OPEN'",
        )
        .bind(result.to_string())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to close trade")?;

        Ok(outcome.rows_affected() == 1)
    }

    async fn has_traded_today(&self, symbol: &str, setup: &str, day: NaiveDate) -> Result<bool> {
        let start = day
            .and_hms_opt(0, 0, 0)
            .context("Invalid day")?
            .and_utc()
            .timestamp_millis();
        let end = start + 86_400_000;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM trades
            WHERE symbol = ? AND setup = ? AND opened_at >= ? AND opened_at < ?
            "#,
        )
        .bind(symbol)
        .bind(setup)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count")?;
        Ok(count > 0)
    }

    async fn minutes_since_last_trade(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let row = sqlx::query("SELECT MAX(opened_at) as last FROM trades WHERE symbol = ?")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;

        let last: Option<i64> = row.try_get("last")?;
        Ok(last.map(|ms| (now.timestamp_millis() - ms) as f64 / 60_000.0))
    }
}

pub struct SqliteExperienceStore {
    pool: SqlitePool,
}

impl SqliteExperienceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExperienceStore for SqliteExperienceStore {
    async fn append(&self, sample: &ExperienceSample) -> Result<()> {
        let snapshot = sample
            .snapshot
            .to_json()
            .context("Failed to encode experience snapshot")?;
        sqlx::query(
            "INSERT INTO experiences (symbol, snapshot, label, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&sample.symbol)
        .bind(snapshot)
        .bind(i64::from(sample.label))
        .bind(sample.recorded_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to append experience")?;

        debug!("Appended experience [{}] label={}", sample.symbol, sample.label);
        Ok(())
    }

    async fn load(&self, symbol: &str) -> Result<Vec<ExperienceSample>> {
        let rows = sqlx::query("SELECT * FROM experiences WHERE symbol = ? ORDER BY id ASC")
            .bind(symbol)
            .fetch_all(&self.pool)
            .await?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows {
            let snapshot: String = row.try_get("snapshot")?;
            let label: i64 = row.try_get("label")?;
            samples.push(ExperienceSample {
                symbol: row.try_get("symbol")?,
                snapshot: serde_json::from_str::<FeatureSnapshot>(&snapshot)
                    .context("Corrupt experience snapshot")?,
                label: u8::from(label > 0),
                recorded_at: from_millis(row.try_get("recorded_at")?)?,
            });
        }
        Ok(samples)
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM experiences")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }

    async fn symbols(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT symbol FROM experiences ORDER BY symbol ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list experience symbols")?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("symbol").map_err(Into::into))
            .collect()
    }
}

pub struct SqliteModelStore {
    pool: SqlitePool,
}

impl SqliteModelStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelStore for SqliteModelStore {
    async fn save(&self, model: &StoredModel) -> Result<()> {
        let schema = serde_json::to_string(&model.schema).context("Failed to encode schema")?;
        sqlx::query(
            r#"
            INSERT INTO models (symbol, schema, blob, trained_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                schema = excluded.schema,
                blob = excluded.blob,
                trained_at = excluded.trained_at
            "#,
        )
        .bind(&model.symbol)
        .bind(schema)
        .bind(&model.blob)
        .bind(model.trained_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save model")?;

        info!("Persisted model [{}]", model.symbol);
        Ok(())
    }

    async fn load(&self, symbol: &str) -> Result<Option<StoredModel>> {
        let row = sqlx::query("SELECT * FROM models WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let schema: String = row.try_get("schema")?;
        Ok(Some(StoredModel {
            symbol: row.try_get("symbol")?,
            schema: serde_json::from_str::<FeatureSchema>(&schema)
                .context("Corrupt model schema")?,
            blob: row.try_get("blob")?,
            trained_at: from_millis(row.try_get("trained_at")?)?,
        }))
    }
}
