use crate::domain::trading::types::{
    AccountInfo, Candle, Deal, InstrumentSpec, OrderRequest, Position, Quote, Side, Timeframe,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Supplies ordered OHLCV history per symbol.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Oldest first. `Ok(None)` when the source has nothing for the symbol.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Option<Vec<Candle>>>;
}

/// Broker connectivity. `Err` means the transport failed; `Ok(None)`/`Ok(false)` means the broker answered no.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn get_account(&self) -> Result<Option<AccountInfo>>;

    async fn get_open_positions(&self, symbol: Option<&str>) -> Result<Vec<Position>>;

    async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>>;

    async fn instrument_spec(&self, symbol: &str) -> Result<Option<InstrumentSpec>>;

    /// Margin required for `volume` lots at `price`, if the broker can compute it.
    async fn calc_margin(
        &self,
        symbol: &str,
        side: Side,
        volume: Decimal,
        price: f64,
    ) -> Result<Option<Decimal>>;

    /// Returns the ticket of the opened position on success.
    async fn submit_order(&self, order: OrderRequest) -> Result<Option<i64>>;

    async fn modify_position(&self, ticket: i64, stop: f64, target: f64) -> Result<bool>;

    async fn close_position(&self, ticket: i64) -> Result<bool>;

    async fn get_deal_history(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Deal>>;

    async fn reconnect(&self) -> Result<()>;
}
