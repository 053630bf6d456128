//! Offline trainer: fits the confirmation model on a CSV candle history, reports
//! out-of-sample quality and writes the model for the live engine to pick up.
//!
//! With `--from-experience` it instead refits every symbol found in the database's
//! experience corpus, the same way the live engine trains, and stores the new models.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use volume_sniper::application::ml::{ModelRegistry, ProbabilityEngine, train_offline};
use volume_sniper::config::MlEnvConfig;
use volume_sniper::domain::ml::feature_registry::FeatureSchema;
use volume_sniper::domain::repositories::{ModelStore, StoredModel};
use volume_sniper::domain::trading::types::Candle;
use volume_sniper::infrastructure::csv_candles::read_candles;
use volume_sniper::infrastructure::persistence::{
    Database, SqliteExperienceStore, SqliteModelStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Candle history CSV (timestamp,open,high,low,close,volume[,symbol])
    #[arg(long, required_unless_present = "from_experience")]
    input: Option<PathBuf>,

    /// Symbol to train; also used for rows without a symbol column
    #[arg(long, default_value = "EURUSD")]
    symbol: String,

    /// Where to write the stored model as JSON
    #[arg(long, default_value = "data/ml/model.json")]
    output: PathBuf,

    /// Also upsert the model into this database (e.g. sqlite://data/volume_sniper.db)
    #[arg(long)]
    database: Option<String>,

    /// Chronological share of rows held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Probability above which an "up" call counts as confident
    #[arg(long, default_value_t = 0.6)]
    threshold: f64,

    /// Number of trees (overrides the offline default)
    #[arg(long)]
    n_trees: Option<usize>,

    /// Maximum tree depth (overrides the offline default)
    #[arg(long)]
    max_depth: Option<u16>,

    /// Refit every symbol in the experience corpus of --database; --input is optional market history
    #[arg(long, requires = "database")]
    from_experience: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();
    if !(0.0..1.0).contains(&args.test_fraction) {
        anyhow::bail!("--test-fraction must be in [0, 1)");
    }

    if args.from_experience {
        let mut config = MlEnvConfig::from_env()?;
        apply_overrides(&mut config, &args);
        return retrain_from_experience(&args, config).await;
    }

    let mut config = MlEnvConfig::offline();
    apply_overrides(&mut config, &args);

    let input = args.input.as_deref().context("--input is required")?;
    let series = read_candles(input, &args.symbol)?;
    let candles = series
        .get(&args.symbol)
        .with_context(|| format!("No candles for {} in {}", args.symbol, input.display()))?;
    info!("Loaded {} candles for {}", candles.len(), args.symbol);

    let report = train_offline(candles, &config, args.test_fraction, args.threshold)?;

    println!("Symbol:          {}", args.symbol);
    println!("Trees / depth:   {} / {}", config.n_trees, config.max_depth);
    println!("Rows:            {} train, {} test", report.train_rows, report.test_rows);
    println!("Accuracy:        {:.2}%", report.accuracy * 100.0);
    match report.precision_at_threshold {
        Some(p) => println!(
            "Precision @{:.2}: {:.2}% over {} calls",
            report.confidence_threshold,
            p * 100.0,
            report.confident_calls
        ),
        None => println!(
            "Precision @{:.2}: no confident calls",
            report.confidence_threshold
        ),
    }
    if report.test_rows > 0 && report.accuracy < 0.5 {
        warn!("Out-of-sample accuracy below 50%, model is no better than a coin");
    }

    let stored = StoredModel {
        symbol: args.symbol.clone(),
        schema: FeatureSchema::current(),
        blob: report.model.to_json()?,
        trained_at: Utc::now(),
    };

    if let Some(parent) = args.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    std::fs::write(&args.output, serde_json::to_string_pretty(&stored)?)
        .with_context(|| format!("Cannot write {}", args.output.display()))?;
    info!("Model written to {}", args.output.display());

    if let Some(url) = &args.database {
        let db = Database::new(url).await?;
        SqliteModelStore::new(db.pool.clone()).save(&stored).await?;
        info!("Model stored for {} in {}", args.symbol, url);
    }

    Ok(())
}

fn apply_overrides(config: &mut MlEnvConfig, args: &Args) {
    if let Some(n) = args.n_trees {
        config.n_trees = n;
    }
    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }
}

async fn retrain_from_experience(args: &Args, config: MlEnvConfig) -> Result<()> {
    let url = args
        .database
        .as_deref()
        .context("--from-experience needs --database")?;
    let db = Database::new(url).await?;

    let history = match args.input.as_deref() {
        Some(path) => load_history(path, &args.symbol)?,
        None => HashMap::new(),
    };

    let engine = ProbabilityEngine::new(
        Arc::new(ModelRegistry::new()),
        Arc::new(SqliteModelStore::new(db.pool.clone())),
        Arc::new(SqliteExperienceStore::new(db.pool.clone())),
        config,
    );
    let reports = engine.retrain_from_experience(&history, Utc::now()).await?;
    if reports.is_empty() {
        warn!("No experiences recorded in {}", url);
    }

    for (symbol, report) in &reports {
        match report {
            Some(r) => println!(
                "{:<10} generation {} | {} market rows + {} experiences = {} rows",
                symbol, r.model.generation, r.market_rows, r.experiences, r.total_rows
            ),
            None => println!("{:<10} not retrained", symbol),
        }
    }
    Ok(())
}

fn load_history(path: &Path, fallback_symbol: &str) -> Result<HashMap<String, Vec<Candle>>> {
    let history = read_candles(path, fallback_symbol)?;
    info!(
        "Loaded market history for {} symbols from {}",
        history.len(),
        path.display()
    );
    Ok(history)
}
