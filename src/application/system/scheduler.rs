//! Fixed-interval driver.
//!
//! Every tick runs, in order: lifecycle reconciliation, stop management, the account gate,
//! then one scan per configured symbol. A failing symbol never stops the others.

use crate::application::agents::{LifecycleTracker, ScanOutcome, SymbolScanner, TrailingStopManager};
use crate::application::market_structure::ProfileSettings;
use crate::application::ml::ProbabilityEngine;
use crate::application::risk_management::{RiskManager, with_single_reconnect};
use crate::config::Config;
use crate::domain::clock::Clock;
use crate::domain::errors::DecisionError;
use crate::domain::ports::{BrokerGateway, CandleSource};
use crate::domain::repositories::TradeLedger;
use crate::infrastructure::observability::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every stage of a tick.
#[derive(Clone)]
pub struct Services {
    pub candles: Arc<dyn CandleSource>,
    pub broker: Arc<dyn BrokerGateway>,
    pub ledger: Arc<dyn TradeLedger>,
    pub engine: Arc<ProbabilityEngine>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    /// False when the account gate blocked scanning this tick.
    pub trading_allowed: bool,
    pub scanned: usize,
    /// `(symbol, reason)` for symbols that ended without an order.
    pub skipped: Vec<(String, String)>,
    /// `(symbol, error kind)` for symbols whose decision failed.
    pub failed: Vec<(String, String)>,
    /// Validated signals that reached the broker, filled or not.
    pub signals: usize,
    pub orders: usize,
    pub closed: usize,
    pub experiences: usize,
    pub stops_moved: usize,
}

pub struct Scheduler {
    symbols: Vec<String>,
    interval: Duration,
    broker: Arc<dyn BrokerGateway>,
    engine: Arc<ProbabilityEngine>,
    risk: RiskManager,
    scanner: SymbolScanner,
    lifecycle: LifecycleTracker,
    trailing: TrailingStopManager,
    metrics: Metrics,
}

impl Scheduler {
    pub fn new(config: &Config, services: Services, metrics: Metrics) -> Self {
        let scanner = SymbolScanner::new(
            services.candles.clone(),
            services.broker.clone(),
            services.ledger.clone(),
            services.engine.clone(),
            services.clock.clone(),
            config.strategy.clone(),
            config.risk.clone(),
            config.timeframe,
            config.candle_count,
        );
        let lifecycle = LifecycleTracker::new(
            services.broker.clone(),
            services.ledger.clone(),
            services.engine.clone(),
            services.clock.clone(),
        );
        let trailing = TrailingStopManager::new(
            services.broker.clone(),
            services.candles.clone(),
            ProfileSettings::from(&config.strategy),
            config.strategy.lva_fraction,
            config.timeframe,
            config.candle_count,
        );

        Self {
            symbols: config.symbols.clone(),
            interval: Duration::from_secs(config.scan_interval_secs.max(1)),
            broker: services.broker,
            engine: services.engine,
            risk: RiskManager::new(config.risk.clone()),
            scanner,
            lifecycle,
            trailing,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// One full cycle. Never fails; every problem is logged and reported.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        match self.lifecycle.track().await {
            Ok(lifecycle) => {
                report.closed = lifecycle.closed + lifecycle.force_closed;
                report.experiences = lifecycle.learned;
                self.metrics
                    .experiences_total
                    .inc_by(lifecycle.learned as f64);
            }
            Err(e) => error!("Scheduler: Lifecycle tracking failed: {:#}", e),
        }

        match self.trailing.manage().await {
            Ok(moved) => report.stops_moved = moved,
            Err(e) => error!("Scheduler: Stop management failed: {:#}", e),
        }

        let account = match with_single_reconnect(self.broker.as_ref(), "account", || {
            self.broker.get_account()
        })
        .await
        {
            Ok(account) => Some(account),
            Err(e) => {
                error!("Scheduler: {}", e);
                None
            }
        };
        report.trading_allowed = self.risk.can_trade(account.as_ref());

        if report.trading_allowed {
            for symbol in &self.symbols {
                self.scan(symbol, &mut report).await;
            }
        } else {
            warn!("Scheduler: Trading blocked by account gate, scan skipped");
        }

        self.metrics.scan_cycles_total.inc();
        report
    }

    async fn scan(&self, symbol: &str, report: &mut TickReport) {
        report.scanned += 1;

        match self.scanner.scan_symbol(symbol).await {
            Ok(ScanOutcome::Skipped(reason)) => {
                debug!("Scheduler [{}]: Skipped ({})", symbol, reason);
                self.metrics.inc_skip(reason.label());
                report.skipped.push((symbol.to_string(), reason.to_string()));
            }
            Ok(ScanOutcome::Submitted { signal, ticket, .. }) => {
                self.metrics.inc_signal(&signal.setup.to_string());
                self.metrics.inc_orders("filled");
                report.signals += 1;
                report.orders += 1;
                debug!("Scheduler [{}]: Ticket {} recorded", symbol, ticket);
            }
            Err(e) => {
                match &e {
                    DecisionError::BrokerRejection { .. } => {
                        self.metrics.inc_orders("rejected");
                        report.signals += 1;
                        warn!("Scheduler [{}]: {}", symbol, e);
                    }
                    DecisionError::DataUnavailable { .. } => warn!("Scheduler [{}]: {}", symbol, e),
                    _ => error!("Scheduler [{}]: {}", symbol, e),
                }
                self.metrics.inc_skip(e.kind());
                report.failed.push((symbol.to_string(), e.kind().to_string()));
            }
        }

        if let Some(generation) = self.engine.registry().generation(symbol).await {
            self.metrics.set_model_generation(symbol, generation);
        }
    }

    /// Ticks at the configured interval until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Scheduler: Starting, {} symbols every {:?}",
            self.symbols.len(),
            self.interval
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    info!(
                        "Scheduler: Tick done: scanned={} signals={} orders={} skipped={} failed={} closed={} learned={} stops={}",
                        report.scanned,
                        report.signals,
                        report.orders,
                        report.skipped.len(),
                        report.failed.len(),
                        report.closed,
                        report.experiences,
                        report.stops_moved
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Scheduler: Stopped");
    }
}
