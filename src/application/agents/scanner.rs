//! Per-symbol decision pipeline.
//!
//! One call to [`SymbolScanner::scan_symbol`] evaluates a single symbol end to end:
//! session and cooldown gates, market data, feature engineering, model confirmation,
//! structure-based setup detection, trade planning, sizing and submission.
//! Every early exit is reported as a [`SkipReason`] or a [`DecisionError`]; nothing is
//! written to the ledger unless the broker returned a ticket.

use super::session_filter;
use crate::application::market_structure::{
    ProfileSettings, anchored_window, compute_profile, compute_vwap, swing_extremes,
};
use crate::application::ml::{ProbabilityEngine, engineer_features};
use crate::application::risk_management::{RiskManager, SizingEngine, with_single_reconnect};
use crate::application::targeting::{
    MomentumLimits, SetupContext, TradePlanner, check_momentum, detect_setup,
};
use crate::config::{RiskEnvConfig, StrategyEnvConfig};
use crate::domain::clock::Clock;
use crate::domain::errors::DecisionError;
use crate::domain::ports::{BrokerGateway, CandleSource};
use crate::domain::repositories::TradeLedger;
use crate::domain::trading::signal::Signal;
use crate::domain::trading::trade_record::NewTradeRecord;
use crate::domain::trading::types::{OrderRequest, Timeframe};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Why a symbol produced no order this cycle without anything having failed.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    SessionClosed,
    Cooldown,
    SpreadTooWide,
    NoSetup,
    WeakConfirmation { probability: f64, threshold: f64 },
    AlreadyTradedToday(String),
    Momentum(String),
    PlanRejected(String),
    ZeroSize,
}

impl SkipReason {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::SessionClosed => "session_closed",
            SkipReason::Cooldown => "cooldown",
            SkipReason::SpreadTooWide => "spread",
            SkipReason::NoSetup => "no_setup",
            SkipReason::WeakConfirmation { .. } => "weak_confirmation",
            SkipReason::AlreadyTradedToday(_) => "traded_today",
            SkipReason::Momentum(_) => "momentum",
            SkipReason::PlanRejected(_) => "plan_rejected",
            SkipReason::ZeroSize => "zero_size",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::WeakConfirmation {
                probability,
                threshold,
            } => write!(f, "confirmation {:.2} <= {:.2}", probability, threshold),
            SkipReason::AlreadyTradedToday(tag) => write!(f, "{} already traded today", tag),
            SkipReason::Momentum(why) => write!(f, "momentum filter: {}", why),
            SkipReason::PlanRejected(why) => write!(f, "plan rejected: {}", why),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Skipped(SkipReason),
    Submitted {
        signal: Signal,
        volume: Decimal,
        ticket: i64,
        record_id: i64,
    },
}

pub struct SymbolScanner {
    candles: Arc<dyn CandleSource>,
    broker: Arc<dyn BrokerGateway>,
    ledger: Arc<dyn TradeLedger>,
    engine: Arc<ProbabilityEngine>,
    clock: Arc<dyn Clock>,
    risk: RiskManager,
    sizer: SizingEngine,
    planner: TradePlanner,
    profile: ProfileSettings,
    momentum: MomentumLimits,
    strategy: StrategyEnvConfig,
    timeframe: Timeframe,
    candle_count: usize,
}

impl SymbolScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        candles: Arc<dyn CandleSource>,
        broker: Arc<dyn BrokerGateway>,
        ledger: Arc<dyn TradeLedger>,
        engine: Arc<ProbabilityEngine>,
        clock: Arc<dyn Clock>,
        strategy: StrategyEnvConfig,
        risk: RiskEnvConfig,
        timeframe: Timeframe,
        candle_count: usize,
    ) -> Self {
        Self {
            candles,
            broker,
            ledger,
            engine,
            clock,
            risk: RiskManager::new(risk.clone()),
            sizer: SizingEngine::new(risk),
            planner: TradePlanner::from(&strategy),
            profile: ProfileSettings::from(&strategy),
            momentum: MomentumLimits::default(),
            strategy,
            timeframe,
            candle_count,
        }
    }

    pub async fn scan_symbol(&self, symbol: &str) -> Result<ScanOutcome, DecisionError> {
        let now = self.clock.now();

        if !session_filter::is_tradable(symbol, now) {
            return Ok(ScanOutcome::Skipped(SkipReason::SessionClosed));
        }

        let since_last = self
            .ledger
            .minutes_since_last_trade(symbol, now)
            .await
            .map_err(|e| DecisionError::data_unavailable(symbol, format!("ledger: {:#}", e)))?;
        if !self.risk.cooldown_elapsed(symbol, since_last) {
            return Ok(ScanOutcome::Skipped(SkipReason::Cooldown));
        }

        let candles = self
            .candles
            .fetch_candles(symbol, self.timeframe, self.candle_count)
            .await
            .map_err(|e| DecisionError::data_unavailable(symbol, format!("candles: {:#}", e)))?
            .ok_or_else(|| DecisionError::data_unavailable(symbol, "no candles"))?;
        let Some(last) = candles.last().copied() else {
            return Err(DecisionError::data_unavailable(symbol, "empty candle series"));
        };

        let broker = self.broker.as_ref();
        let spec = with_single_reconnect(broker, "instrument spec", || {
            broker.instrument_spec(symbol)
        })
        .await?;
        let quote = with_single_reconnect(broker, "quote", || broker.get_quote(symbol)).await?;
        if !self.risk.spread_ok(symbol, &quote, spec.point) {
            return Ok(ScanOutcome::Skipped(SkipReason::SpreadTooWide));
        }
        let mid = quote.mid();

        let frame = engineer_features(&candles)
            .map_err(|e| DecisionError::data_unavailable(symbol, format!("features: {:#}", e)))?;
        let snapshot = frame.last().ok_or_else(|| {
            DecisionError::data_unavailable(
                symbol,
                format!("{} candles is not enough history for features", candles.len()),
            )
        })?;

        if self.engine.current_model(symbol).await.is_none() {
            match self.engine.train(symbol, &candles, now).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return Err(DecisionError::data_unavailable(symbol, "not enough data to train"));
                }
                Err(e) => {
                    return Err(DecisionError::data_unavailable(
                        symbol,
                        format!("training failed: {:#}", e),
                    ));
                }
            }
        }
        let prediction = self.engine.predict(symbol, Some(&snapshot)).await;

        let window = anchored_window(
            &candles,
            self.strategy.anchor_lookback,
            self.strategy.min_anchored_candles,
            self.strategy.profile_lookback,
        );
        let profile = compute_profile(window, &self.profile)
            .ok_or_else(|| DecisionError::data_unavailable(symbol, "volume profile unavailable"))?;
        let vwap = compute_vwap(&candles)
            .ok_or_else(|| DecisionError::data_unavailable(symbol, "VWAP unavailable"))?;
        let (Some(atr), Some(trend_strength)) =
            (snapshot.get("atr"), snapshot.get("trend_strength"))
        else {
            return Err(DecisionError::data_unavailable(symbol, "ATR or trend missing"));
        };

        info!(
            "Scanner [{}]: mid {:.5} | p_up {:.2} | POC {:.5} VAH {:.5} VAL {:.5} VWAP {:.5}",
            symbol, mid, prediction.p_up, profile.poc, profile.vah, profile.val, vwap
        );

        let ctx = SetupContext {
            last,
            mid,
            poc: profile.poc,
            vah: profile.vah,
            val: profile.val,
            vwap,
            atr,
            trend_strength,
        };
        let Some(setup) = detect_setup(&ctx, self.strategy.atr_tolerance_multiplier) else {
            return Ok(ScanOutcome::Skipped(SkipReason::NoSetup));
        };
        let side = setup.kind.side();

        let probability = prediction.for_side(side);
        if probability <= self.strategy.ai_threshold {
            debug!(
                "Scanner [{}]: {} needs {:.2}, model gives {:.2}",
                symbol, setup.kind, self.strategy.ai_threshold, probability
            );
            return Ok(ScanOutcome::Skipped(SkipReason::WeakConfirmation {
                probability,
                threshold: self.strategy.ai_threshold,
            }));
        }

        let tag = setup.kind.tag();
        let traded = self
            .ledger
            .has_traded_today(symbol, tag, now.date_naive())
            .await
            .map_err(|e| DecisionError::data_unavailable(symbol, format!("ledger: {:#}", e)))?;
        if traded {
            return Ok(ScanOutcome::Skipped(SkipReason::AlreadyTradedToday(
                tag.to_string(),
            )));
        }

        if let Err(why) = check_momentum(side, &snapshot, &self.momentum) {
            info!("Scanner [{}]: {} blocked: {}", symbol, setup.kind, why);
            return Ok(ScanOutcome::Skipped(SkipReason::Momentum(why)));
        }

        let swings = swing_extremes(&candles, self.strategy.swing_lookback)
            .ok_or_else(|| DecisionError::data_unavailable(symbol, "no swing extremes"))?;
        let signal = match self
            .planner
            .plan(symbol, setup, mid, &profile, swings, probability)
        {
            Ok(signal) => signal,
            Err(rejection) => {
                info!("Scanner [{}]: {} rejected: {}", symbol, setup.kind, rejection);
                return Ok(ScanOutcome::Skipped(SkipReason::PlanRejected(
                    rejection.to_string(),
                )));
            }
        };

        let account = with_single_reconnect(broker, "account", || broker.get_account()).await?;
        let volume = self
            .sizer
            .size_position(broker, &account, &spec, side, signal.entry, signal.stop)
            .await;
        if volume.is_zero() {
            return Ok(ScanOutcome::Skipped(SkipReason::ZeroSize));
        }

        info!(
            "Scanner [{}]: {} {} {} @ {:.5} SL {:.5} TP {:.5} (R:R {:.2}, p {:.2})",
            symbol,
            signal.setup,
            signal.side,
            volume,
            signal.entry,
            signal.stop,
            signal.target,
            signal.reward_risk_ratio(),
            probability
        );

        let snapshot_json = snapshot.to_json().map_err(|e| {
            DecisionError::data_unavailable(symbol, format!("snapshot encoding failed: {}", e))
        })?;

        let order = OrderRequest {
            symbol: symbol.to_string(),
            side,
            volume,
            stop: signal.stop,
            target: signal.target,
            comment: tag.to_string(),
        };
        let ticket = match self.broker.submit_order(order).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => {
                error!("Scanner [{}]: Broker rejected {} order", symbol, signal.setup);
                return Err(DecisionError::BrokerRejection {
                    symbol: symbol.to_string(),
                    reason: "order not accepted".to_string(),
                });
            }
            Err(e) => {
                error!("Scanner [{}]: Order submission failed: {:#}", symbol, e);
                return Err(DecisionError::BrokerRejection {
                    symbol: symbol.to_string(),
                    reason: format!("{:#}", e),
                });
            }
        };

        let record = NewTradeRecord {
            symbol: symbol.to_string(),
            side,
            quantity: volume,
            entry: signal.entry,
            setup: tag.to_string(),
            snapshot: snapshot_json,
            ticket: Some(ticket),
            opened_at: now,
        };
        let record_id = match self.ledger.insert(record).await {
            Ok(id) => id,
            Err(e) => {
                // The position exists at the broker; only the learning link is lost.
                error!(
                    "Scanner [{}]: Ticket {} opened but not recorded: {:#}",
                    symbol, ticket, e
                );
                return Err(DecisionError::data_unavailable(
                    symbol,
                    format!("ledger insert failed for ticket {}", ticket),
                ));
            }
        };

        Ok(ScanOutcome::Submitted {
            signal,
            volume,
            ticket,
            record_id,
        })
    }
}
