use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub mod scheduler;

pub use scheduler::{Scheduler, Services, TickReport};

use crate::application::ml::{ModelRegistry, ProbabilityEngine};
use crate::config::{Config, Mode};
use crate::domain::clock::SystemClock;
use crate::domain::ports::CandleSource;
use crate::domain::trading::types::AccountInfo;
use crate::infrastructure::csv_candles::CsvCandleSource;
use crate::infrastructure::mock::{MockBroker, PriceFeed, SimulatedCandleSource, simulated_spec};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::persistence::{
    Database, SqliteExperienceStore, SqliteModelStore, SqliteTradeLedger,
};

const MOCK_SEED: u64 = 42;
const SIMULATED_BALANCE: i64 = 10_000;
const SIMULATED_LEVERAGE: u32 = 30;

fn simulated_account() -> AccountInfo {
    let balance = Decimal::from(SIMULATED_BALANCE);
    AccountInfo {
        balance,
        equity: balance,
        margin_level: Decimal::ZERO,
        margin_free: balance,
        leverage: SIMULATED_LEVERAGE,
    }
}

pub struct Application {
    pub config: Config,
    pub scheduler: Arc<Scheduler>,
    pub metrics: Metrics,
    pub broker: Arc<MockBroker>,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!("Building Volume Sniper (Mode: {:?})...", config.mode);

        let db = Database::new(&config.database_url)
            .await
            .context("Failed to open database")?;
        let ledger = Arc::new(SqliteTradeLedger::new(db.pool.clone()));
        let experiences = Arc::new(SqliteExperienceStore::new(db.pool.clone()));
        let models = Arc::new(SqliteModelStore::new(db.pool.clone()));

        let (candles, feed): (Arc<dyn CandleSource>, Arc<dyn PriceFeed>) = match config.mode {
            Mode::Mock => {
                let source = Arc::new(SimulatedCandleSource::new(MOCK_SEED));
                let candles: Arc<dyn CandleSource> = source.clone();
                (candles, source as Arc<dyn PriceFeed>)
            }
            Mode::Replay => {
                let path = config
                    .replay_file
                    .as_deref()
                    .context("REPLAY_FILE is required when MODE=replay")?;
                let fallback = config.symbols.first().map(String::as_str).unwrap_or("EURUSD");
                let source = Arc::new(CsvCandleSource::from_path(
                    Path::new(path),
                    fallback,
                    config.candle_count,
                )?);
                for symbol in &config.symbols {
                    if !source.symbols().contains(symbol) {
                        warn!("Replay [{}]: No history in {}", symbol, path);
                    }
                }
                let candles: Arc<dyn CandleSource> = source.clone();
                (candles, source as Arc<dyn PriceFeed>)
            }
        };

        let broker = Arc::new(MockBroker::new(simulated_account()).with_price_feed(feed));
        for symbol in &config.symbols {
            broker.set_spec(simulated_spec(symbol)).await;
        }

        let engine = Arc::new(ProbabilityEngine::new(
            Arc::new(ModelRegistry::new()),
            models,
            experiences,
            config.ml.clone(),
        ));

        let metrics = Metrics::new()?;
        let services = Services {
            candles,
            broker: broker.clone(),
            ledger,
            engine,
            clock: Arc::new(SystemClock),
        };
        let scheduler = Arc::new(Scheduler::new(&config, services, metrics.clone()));

        info!(
            "Application built: {} symbols on {:?}, database {}",
            config.symbols.len(),
            config.timeframe,
            config.database_url
        );

        Ok(Self {
            config,
            scheduler,
            metrics,
            broker,
        })
    }

    /// Runs the scheduler until Ctrl+C, then lets the current tick finish.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = self.scheduler.clone();
        let task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received, finishing current tick...");
        shutdown_tx.send(true).ok();
        task.await.context("Scheduler task panicked")?;

        info!("Final metrics:\n{}", self.metrics.render());
        Ok(())
    }
}
