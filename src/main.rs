//! Volume Sniper - volume-profile scanner with a self-training confirmation model
//!
//! # Usage
//! ```sh
//! MODE=mock SYMBOLS=EURUSD,XAUUSD,BTCUSD cargo run
//! MODE=replay REPLAY_FILE=data/eurusd_m5.csv SYMBOLS=EURUSD cargo run
//! ```
//!
//! Configuration is read from the environment (and `.env`); see `Config::from_env`.

use anyhow::Result;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;
use volume_sniper::application::system::Application;
use volume_sniper::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Volume Sniper {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: Mode={:?}, Symbols={:?}, Timeframe={:?}, Interval={}s",
        config.mode, config.symbols, config.timeframe, config.scan_interval_secs
    );

    let app = Application::build(config).await?;
    info!("Running. Press Ctrl+C to shutdown.");
    app.run().await?;

    info!("Shutdown complete.");
    Ok(())
}
