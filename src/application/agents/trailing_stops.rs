//! Progress-based stop management for open positions.
//!
//! Progress is the share of the entry-to-target distance already covered:
//!
//! - from 20% with the stop still behind entry: move to break-even plus a small fee buffer
//! - from 50%: trail behind the nearest low-volume area between entry and price, or lock
//!   30% of the open gain when no such area exists
//!
//! Stops only ever tighten, and small improvements are not sent to the broker.

use crate::application::market_structure::{ProfileSettings, compute_profile, find_low_volume_area};
use crate::domain::market::volume_profile::ScanDirection;
use crate::domain::ports::{BrokerGateway, CandleSource};
use crate::domain::trading::types::{Position, Side, Timeframe};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

const BREAK_EVEN_PROGRESS: f64 = 0.20;
const TRAIL_PROGRESS: f64 = 0.50;
const BREAK_EVEN_OFFSET: f64 = 0.0002;
const LVA_BUFFER: f64 = 0.0003;
const LOCKED_GAIN: f64 = 0.30;
const MIN_IMPROVEMENT: f64 = 0.0002;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopAdjustment {
    BreakEven(f64),
    Trail(f64),
}

impl StopAdjustment {
    pub fn stop(self) -> f64 {
        match self {
            StopAdjustment::BreakEven(s) | StopAdjustment::Trail(s) => s,
        }
    }
}

/// Share of the way from entry to target, or `None` when there is no usable target.
pub fn progress(position: &Position, price: f64) -> Option<f64> {
    if position.target == 0.0 {
        return None;
    }
    let total = (position.target - position.open_price).abs();
    if total == 0.0 {
        return None;
    }
    Some((price - position.open_price).abs() / total)
}

/// Decides the new stop for `position` at `price`. `lva` is only consulted past the trail threshold.
pub fn evaluate_stop(position: &Position, price: f64, lva: Option<f64>) -> Option<StopAdjustment> {
    let progress = progress(position, price)?;
    let open = position.open_price;
    let stop = position.stop;
    let gain = (price - open).abs();
    let buffer = price * LVA_BUFFER;
    let min_step = price * MIN_IMPROVEMENT;

    match position.side {
        Side::Long => {
            if price <= open {
                return None;
            }
            if progress >= BREAK_EVEN_PROGRESS && stop < open {
                return Some(StopAdjustment::BreakEven(open * (1.0 + BREAK_EVEN_OFFSET)));
            }
            if progress < TRAIL_PROGRESS {
                return None;
            }
            let candidate = match lva {
                Some(level) if level > open && level < price => level - buffer,
                _ => open + gain * LOCKED_GAIN,
            };
            (candidate > stop && candidate < price && candidate - stop > min_step)
                .then_some(StopAdjustment::Trail(candidate))
        }
        Side::Short => {
            if price >= open {
                return None;
            }
            let unset = stop == 0.0;
            if progress >= BREAK_EVEN_PROGRESS && (unset || stop > open) {
                return Some(StopAdjustment::BreakEven(open * (1.0 - BREAK_EVEN_OFFSET)));
            }
            if progress < TRAIL_PROGRESS {
                return None;
            }
            let candidate = match lva {
                Some(level) if level < open && level > price => level + buffer,
                _ => open - gain * LOCKED_GAIN,
            };
            let tighter = unset || (candidate < stop && stop - candidate > min_step);
            (tighter && candidate > price).then_some(StopAdjustment::Trail(candidate))
        }
    }
}

pub struct TrailingStopManager {
    broker: Arc<dyn BrokerGateway>,
    candles: Arc<dyn CandleSource>,
    profile: ProfileSettings,
    lva_fraction: f64,
    timeframe: Timeframe,
    candle_count: usize,
}

impl TrailingStopManager {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        candles: Arc<dyn CandleSource>,
        profile: ProfileSettings,
        lva_fraction: f64,
        timeframe: Timeframe,
        candle_count: usize,
    ) -> Self {
        Self {
            broker,
            candles,
            profile,
            lva_fraction,
            timeframe,
            candle_count,
        }
    }

    /// One pass over all open positions. Returns the number of stops moved.
    pub async fn manage(&self) -> Result<usize> {
        let positions = self.broker.get_open_positions(None).await?;
        let mut moved = 0;

        for position in positions {
            match self.manage_position(&position).await {
                Ok(true) => moved += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "TrailingStops [{}]: Ticket {} skipped: {}",
                    position.symbol, position.ticket, e
                ),
            }
        }
        Ok(moved)
    }

    async fn manage_position(&self, position: &Position) -> Result<bool> {
        let Some(quote) = self.broker.get_quote(&position.symbol).await? else {
            debug!("TrailingStops [{}]: No quote", position.symbol);
            return Ok(false);
        };
        // Exit side of the book.
        let price = match position.side {
            Side::Long => quote.bid,
            Side::Short => quote.ask,
        };

        let lva = match progress(position, price) {
            Some(p) if p >= TRAIL_PROGRESS => self.nearest_lva(position, price).await,
            _ => None,
        };

        let Some(adjustment) = evaluate_stop(position, price, lva) else {
            return Ok(false);
        };

        let stop = adjustment.stop();
        if !self
            .broker
            .modify_position(position.ticket, stop, position.target)
            .await?
        {
            warn!(
                "TrailingStops [{}]: Broker refused stop {:.5} for ticket {}",
                position.symbol, stop, position.ticket
            );
            return Ok(false);
        }

        match adjustment {
            StopAdjustment::BreakEven(_) => info!(
                "TrailingStops [{}]: Ticket {} stop to break-even {:.5}",
                position.symbol, position.ticket, stop
            ),
            StopAdjustment::Trail(_) => info!(
                "TrailingStops [{}]: Ticket {} stop trailed {:.5} -> {:.5}",
                position.symbol, position.ticket, position.stop, stop
            ),
        }
        Ok(true)
    }

    async fn nearest_lva(&self, position: &Position, price: f64) -> Option<f64> {
        let candles = match self
            .candles
            .fetch_candles(&position.symbol, self.timeframe, self.candle_count)
            .await
        {
            Ok(Some(c)) => c,
            Ok(None) => return None,
            Err(e) => {
                debug!("TrailingStops [{}]: No candles for LVA: {}", position.symbol, e);
                return None;
            }
        };
        let profile = compute_profile(&candles, &self.profile)?;
        let direction = match position.side {
            Side::Long => ScanDirection::Down,
            Side::Short => ScanDirection::Up,
        };
        find_low_volume_area(&profile, price, direction, self.lva_fraction)
    }
}
