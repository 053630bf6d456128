use crate::application::agents::session_filter::AssetClass;
use crate::domain::ports::{BrokerGateway, CandleSource};
use crate::domain::trading::types::{
    AccountInfo, Candle, Deal, DealEntry, InstrumentSpec, OrderRequest, Position, Quote, Side,
    Timeframe,
};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Typical five-digit FX contract.
pub fn fx_spec(symbol: &str) -> InstrumentSpec {
    InstrumentSpec {
        symbol: symbol.to_string(),
        contract_size: Decimal::from(100_000),
        tick_value: Decimal::ONE,
        point: 0.00001,
        volume_min: Decimal::new(1, 2),
        volume_max: Decimal::from(100),
        volume_step: Decimal::new(1, 2),
    }
}

/// Contract terms for the simulated broker, by asset class. Non-FX instruments carry no
/// tick value, so sizing falls back to price distance times contract size.
pub fn simulated_spec(symbol: &str) -> InstrumentSpec {
    let (contract_size, tick_value, point) = match AssetClass::classify(symbol) {
        AssetClass::Crypto => (Decimal::ONE, Decimal::ZERO, 0.01),
        AssetClass::Equity => (Decimal::ONE, Decimal::ZERO, 0.01),
        AssetClass::ForexOrIndex if symbol.contains("XAU") => {
            (Decimal::from(100), Decimal::ONE, 0.01)
        }
        AssetClass::ForexOrIndex if symbol.contains("JPY") => {
            (Decimal::from(100_000), Decimal::ZERO, 0.001)
        }
        AssetClass::ForexOrIndex => return fx_spec(symbol),
    };
    InstrumentSpec {
        symbol: symbol.to_string(),
        contract_size,
        tick_value,
        point,
        volume_min: Decimal::new(1, 2),
        volume_max: Decimal::from(100),
        volume_step: Decimal::new(1, 2),
    }
}

fn base_price(symbol: &str) -> f64 {
    if symbol.contains("BTC") {
        60_000.0
    } else if symbol.contains("ETH") {
        3_000.0
    } else if symbol.contains("XAU") {
        2_400.0
    } else if symbol.contains("JPY") {
        150.0
    } else {
        1.10
    }
}

fn symbol_seed(symbol: &str) -> u64 {
    symbol
        .bytes()
        .fold(1469598103934665603u64, |h, b| (h ^ u64::from(b)).wrapping_mul(1099511628211))
}

/// Latest traded price per symbol, used by `MockBroker` to quote.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn last_price(&self, symbol: &str) -> Option<f64>;
}

/// Deterministic random-walk candles. Each fetch moves the series forward by one bar.
pub struct SimulatedCandleSource {
    seed: u64,
    offsets: Mutex<HashMap<String, usize>>,
    last_close: Mutex<HashMap<String, f64>>,
    unavailable: HashSet<String>,
}

impl SimulatedCandleSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            offsets: Mutex::new(HashMap::new()),
            last_close: Mutex::new(HashMap::new()),
            unavailable: HashSet::new(),
        }
    }

    /// Symbols listed here answer `None`, as a terminal without history would.
    pub fn with_unavailable(mut self, symbols: &[&str]) -> Self {
        self.unavailable = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    fn generate(&self, symbol: &str, timeframe: Timeframe, len: usize) -> Vec<Candle> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ symbol_seed(symbol));
        let step = timeframe.seconds();
        let start = 1_700_000_000 - 1_700_000_000 % step;
        let mut price = base_price(symbol);

        (0..len)
            .map(|i| {
                let open = price;
                let drift = rng.random_range(-1.0..1.0) * 0.0015;
                let close = (open * (1.0 + drift)).max(f64::EPSILON);
                let wick_up = rng.random_range(0.0..1.0) * 0.0008 * open;
                let wick_down = rng.random_range(0.0..1.0) * 0.0008 * open;
                price = close;
                Candle {
                    timestamp: start + i as i64 * step,
                    open,
                    high: open.max(close) + wick_up,
                    low: (open.min(close) - wick_down).max(f64::EPSILON),
                    close,
                    volume: rng.random_range(50.0..500.0_f64).round(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl CandleSource for SimulatedCandleSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Option<Vec<Candle>>> {
        if self.unavailable.contains(symbol) || count == 0 {
            return Ok(None);
        }
        let offset = {
            let mut offsets = self.offsets.lock().await;
            let entry = offsets.entry(symbol.to_string()).or_insert(0);
            let current = *entry;
            *entry += 1;
            current
        };
        let series = self.generate(symbol, timeframe, count + offset);
        if let Some(last) = series.last() {
            self.last_close
                .lock()
                .await
                .insert(symbol.to_string(), last.close);
        }
        Ok(Some(series[offset..].to_vec()))
    }
}

#[async_trait]
impl PriceFeed for SimulatedCandleSource {
    async fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_close.lock().await.get(symbol).copied()
    }
}

#[derive(Default)]
struct BrokerState {
    account: Option<AccountInfo>,
    quotes: HashMap<String, Quote>,
    specs: HashMap<String, InstrumentSpec>,
    positions: Vec<Position>,
    deals: Vec<Deal>,
    submitted: Vec<OrderRequest>,
    modifications: Vec<(i64, f64, f64)>,
    margin_per_lot: Option<Decimal>,
    pending_failures: usize,
    reconnects: usize,
    reject_orders: bool,
    next_ticket: i64,
}

/// In-process broker with scripted state. Tests drive it directly; mock and replay modes pair
/// it with a `PriceFeed` for quotes and settles positions whose stop or target is crossed.
#[derive(Clone)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
    feed: Option<Arc<dyn PriceFeed>>,
}

impl MockBroker {
    pub fn new(account: AccountInfo) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                account: Some(account),
                next_ticket: 1000,
                ..Default::default()
            })),
            feed: None,
        }
    }

    pub fn with_price_feed(mut self, feed: Arc<dyn PriceFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub async fn set_account(&self, account: Option<AccountInfo>) {
        self.state.lock().await.account = account;
    }

    pub async fn set_quote(&self, symbol: &str, bid: f64, ask: f64) {
        self.state
            .lock()
            .await
            .quotes
            .insert(symbol.to_string(), Quote { bid, ask });
    }

    pub async fn set_spec(&self, spec: InstrumentSpec) {
        self.state.lock().await.specs.insert(spec.symbol.clone(), spec);
    }

    /// Broker-side margin per lot. Without it `calc_margin` answers `None`.
    pub async fn set_margin_per_lot(&self, margin: Option<Decimal>) {
        self.state.lock().await.margin_per_lot = margin;
    }

    pub async fn add_position(&self, position: Position) {
        self.state.lock().await.positions.push(position);
    }

    pub async fn push_deal(&self, deal: Deal) {
        self.state.lock().await.deals.push(deal);
    }

    /// The next `n` broker calls fail with a transport error.
    pub async fn fail_next(&self, n: usize) {
        self.state.lock().await.pending_failures = n;
    }

    pub async fn reject_orders(&self, reject: bool) {
        self.state.lock().await.reject_orders = reject;
    }

    pub async fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().await.submitted.clone()
    }

    pub async fn modifications(&self) -> Vec<(i64, f64, f64)> {
        self.state.lock().await.modifications.clone()
    }

    pub async fn reconnect_count(&self) -> usize {
        self.state.lock().await.reconnects
    }

    /// Closes `ticket` at `exit` and books the exit deal.
    pub async fn settle(&self, ticket: i64, exit: f64, timestamp: i64) -> Option<Decimal> {
        let mut state = self.state.lock().await;
        Self::settle_locked(&mut state, ticket, exit, timestamp)
    }

    fn settle_locked(
        state: &mut BrokerState,
        ticket: i64,
        exit: f64,
        timestamp: i64,
    ) -> Option<Decimal> {
        let index = state.positions.iter().position(|p| p.ticket == ticket)?;
        let position = state.positions.remove(index);
        let contract = state
            .specs
            .get(&position.symbol)
            .map(|s| s.contract_size)
            .unwrap_or(Decimal::ONE);
        let move_per_unit = (exit - position.open_price) * position.side.sign();
        let profit = (Decimal::from_f64(move_per_unit).unwrap_or(Decimal::ZERO)
            * position.volume
            * contract)
            .round_dp(2);

        state.deals.push(Deal {
            symbol: position.symbol.clone(),
            entry: DealEntry::Out,
            position_id: ticket,
            profit,
            swap: Decimal::ZERO,
            commission: Decimal::ZERO,
            timestamp,
        });
        info!(
            "MockBroker [{}]: Settled ticket {} at {:.5} -> {}",
            position.symbol, ticket, exit, profit
        );
        Some(profit)
    }

    fn take_failure(state: &mut BrokerState) -> Result<()> {
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            bail!("MockBroker: connection dropped");
        }
        Ok(())
    }

    async fn feed_price(&self, symbol: &str) -> Option<f64> {
        match &self.feed {
            Some(feed) => feed.last_price(symbol).await,
            None => None,
        }
    }

    async fn current_quote(&self, state: &BrokerState, symbol: &str) -> Option<Quote> {
        if let Some(quote) = state.quotes.get(symbol) {
            return Some(*quote);
        }
        let price = self.feed_price(symbol).await?;
        let point = state.specs.get(symbol).map(|s| s.point).unwrap_or(0.00001);
        Some(Quote {
            bid: price - point,
            ask: price + point,
        })
    }

    /// Settles feed-priced positions whose stop or target was crossed.
    async fn settle_crossed(&self, state: &mut BrokerState) {
        if self.feed.is_none() {
            return;
        }
        let now = Utc::now().timestamp();
        let mut crossed = Vec::new();
        for position in &state.positions {
            let Some(price) = self.feed_price(&position.symbol).await else {
                continue;
            };
            let stop_hit = position.stop > 0.0
                && match position.side {
                    Side::Long => price <= position.stop,
                    Side::Short => price >= position.stop,
                };
            let target_hit = position.target > 0.0
                && match position.side {
                    Side::Long => price >= position.target,
                    Side::Short => price <= position.target,
                };
            if stop_hit {
                crossed.push((position.ticket, position.stop));
            } else if target_hit {
                crossed.push((position.ticket, position.target));
            }
        }
        for (ticket, exit) in crossed {
            Self::settle_locked(state, ticket, exit, now);
        }
    }
}

#[async_trait]
impl BrokerGateway for MockBroker {
    async fn get_account(&self) -> Result<Option<AccountInfo>> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        Ok(state.account.clone())
    }

    async fn get_open_positions(&self, symbol: Option<&str>) -> Result<Vec<Position>> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        self.settle_crossed(&mut state).await;
        Ok(state
            .positions
            .iter()
            .filter(|p| symbol.is_none_or(|s| p.symbol == s))
            .cloned()
            .collect())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        Ok(self.current_quote(&state, symbol).await)
    }

    async fn instrument_spec(&self, symbol: &str) -> Result<Option<InstrumentSpec>> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        Ok(state.specs.get(symbol).cloned())
    }

    async fn calc_margin(
        &self,
        _symbol: &str,
        _side: Side,
        volume: Decimal,
        _price: f64,
    ) -> Result<Option<Decimal>> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        Ok(state.margin_per_lot.map(|m| m * volume))
    }

    async fn submit_order(&self, order: OrderRequest) -> Result<Option<i64>> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        if state.reject_orders {
            warn!("MockBroker [{}]: Rejecting order", order.symbol);
            return Ok(None);
        }
        let Some(quote) = self.current_quote(&state, &order.symbol).await else {
            return Ok(None);
        };

        state.next_ticket += 1;
        let ticket = state.next_ticket;
        let open_price = match order.side {
            Side::Long => quote.ask,
            Side::Short => quote.bid,
        };
        state.positions.push(Position {
            ticket,
            symbol: order.symbol.clone(),
            side: order.side,
            volume: order.volume,
            open_price,
            stop: order.stop,
            target: order.target,
        });
        info!(
            "MockBroker [{}]: Filled {} {} @ {:.5} (ticket {})",
            order.symbol, order.side, order.volume, open_price, ticket
        );
        state.submitted.push(order);
        Ok(Some(ticket))
    }

    async fn modify_position(&self, ticket: i64, stop: f64, target: f64) -> Result<bool> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        let Some(position) = state.positions.iter_mut().find(|p| p.ticket == ticket) else {
            return Ok(false);
        };
        position.stop = stop;
        position.target = target;
        state.modifications.push((ticket, stop, target));
        Ok(true)
    }

    async fn close_position(&self, ticket: i64) -> Result<bool> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        let Some(position) = state.positions.iter().find(|p| p.ticket == ticket).cloned() else {
            return Ok(false);
        };
        let exit = self
            .current_quote(&state, &position.symbol)
            .await
            .map(|q| q.mid())
            .unwrap_or(position.open_price);
        Ok(Self::settle_locked(&mut state, ticket, exit, Utc::now().timestamp()).is_some())
    }

    async fn get_deal_history(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Deal>> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        self.settle_crossed(&mut state).await;
        let (from, to) = (from.timestamp(), to.timestamp());
        Ok(state
            .deals
            .iter()
            .filter(|d| d.timestamp >= from && d.timestamp <= to)
            .cloned()
            .collect())
    }

    async fn reconnect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.reconnects += 1;
        info!("MockBroker: Reconnected (#{})", state.reconnects);
        Ok(())
    }
}
