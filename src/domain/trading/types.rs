use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short. Multiplies a distance into the favourable direction.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LONG" | "BUY" => Ok(Side::Long),
            "SHORT" | "SELL" => Ok(Side::Short),
            _ => anyhow::bail!("Invalid side: {}", s),
        }
    }
}

/// One OHLCV bar. Timestamps are unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Current top of book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Live account state as reported by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountInfo {
    pub balance: Decimal,
    pub equity: Decimal,
    /// Equity / used margin in percent. Zero when the broker has nothing to report (no open exposure).
    pub margin_level: Decimal,
    pub margin_free: Decimal,
    pub leverage: u32,
}

/// Broker-owned open trade. Read-only mirror on the engine side.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticket: i64,
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub open_price: f64,
    /// Zero means "not set", as brokers report it.
    pub stop: f64,
    pub target: f64,
}

/// Role of a deal within a position's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealEntry {
    In,
    Out,
    InOut,
}

/// Executed deal from broker history.
#[derive(Debug, Clone, PartialEq)]
pub struct Deal {
    pub symbol: String,
    pub entry: DealEntry,
    /// Ticket of the position this deal belongs to.
    pub position_id: i64,
    pub profit: Decimal,
    pub swap: Decimal,
    pub commission: Decimal,
    pub timestamp: i64,
}

impl Deal {
    /// Gross profit plus swap plus commission.
    pub fn realized_profit(&self) -> Decimal {
        self.profit + self.swap + self.commission
    }
}

/// Static trading parameters of an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub contract_size: Decimal,
    /// Monetary value of one price step for one lot. Zero when the broker cannot tell.
    pub tick_value: Decimal,
    /// Smallest price increment ("point").
    pub point: f64,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_step: Decimal,
}

/// Market order with protective levels.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub stop: f64,
    pub target: f64,
    pub comment: String,
}

/// Candle granularity requested from the candle source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
}

impl Timeframe {
    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3600,
        }
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "M1" | "1M" => Ok(Timeframe::M1),
            "M5" | "5M" => Ok(Timeframe::M5),
            "M15" | "15M" => Ok(Timeframe::M15),
            "H1" | "1H" => Ok(Timeframe::H1),
            _ => anyhow::bail!("Invalid TIMEFRAME: {}. Must be M1, M5, M15 or H1", s),
        }
    }
}
