use super::types::Side;
use crate::domain::ml::feature_registry::FeatureSnapshot;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

impl FromStr for TradeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(TradeStatus::Open),
            "CLOSED" => Ok(TradeStatus::Closed),
            _ => anyhow::bail!("Invalid trade status: {}", s),
        }
    }
}

/// Persisted trade, created at submission and closed once by the lifecycle tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry: f64,
    pub setup: String,
    /// Serialized `FeatureSnapshot` captured at entry. May be empty for legacy rows.
    pub snapshot: String,
    pub status: TradeStatus,
    pub result: Option<Decimal>,
    /// Broker position ticket. `None` means the record can never be matched against deals.
    pub ticket: Option<i64>,
    pub opened_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Decodes the stored snapshot. Empty or malformed payloads yield `None`.
    pub fn feature_snapshot(&self) -> Option<FeatureSnapshot> {
        if self.snapshot.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.snapshot).ok()
    }
}

/// Insert payload for the ledger; id and status are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTradeRecord {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry: f64,
    pub setup: String,
    pub snapshot: String,
    pub ticket: Option<i64>,
    pub opened_at: DateTime<Utc>,
}

impl NewTradeRecord {
    pub fn into_record(self, id: i64) -> TradeRecord {
        TradeRecord {
            id,
            symbol: self.symbol,
            side: self.side,
            quantity: self.quantity,
            entry: self.entry,
            setup: self.setup,
            snapshot: self.snapshot,
            status: TradeStatus::Open,
            result: None,
            ticket: self.ticket,
            opened_at: self.opened_at,
        }
    }
}

/// One realized outcome for the learning corpus. Written once, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceSample {
    pub symbol: String,
    pub snapshot: FeatureSnapshot,
    /// 1 when the trade closed in profit, else 0.
    pub label: u8,
    pub recorded_at: DateTime<Utc>,
}
