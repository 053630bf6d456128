//! CSV-backed candle history.
//!
//! Expected header: `timestamp,open,high,low,close,volume` with an optional `symbol`
//! column. Rows without a symbol are attributed to the fallback symbol given at load time.
//! Timestamps are unix seconds.

use crate::domain::ports::CandleSource;
use crate::infrastructure::mock::PriceFeed;
use crate::domain::trading::types::{Candle, Timeframe};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    symbol: Option<String>,
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Parses candles from any reader, grouped by symbol and sorted oldest first.
pub fn parse_candles<R: Read>(reader: R, fallback_symbol: &str) -> Result<HashMap<String, Vec<Candle>>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut series: HashMap<String, Vec<Candle>> = HashMap::new();

    for (line, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("Malformed candle row {}", line + 1))?;
        let symbol = row
            .symbol
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| fallback_symbol.to_string());
        series.entry(symbol).or_default().push(Candle {
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    for candles in series.values_mut() {
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);
    }
    Ok(series)
}

pub fn read_candles(path: &Path, fallback_symbol: &str) -> Result<HashMap<String, Vec<Candle>>> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    parse_candles(BufReader::new(file), fallback_symbol)
}

/// Replays recorded history one candle per fetch.
///
/// Each symbol starts with `warmup` candles visible; every `fetch_candles` call reveals one more.
/// Once the history is exhausted the source answers `None`.
pub struct CsvCandleSource {
    series: HashMap<String, Vec<Candle>>,
    cursors: Mutex<HashMap<String, usize>>,
    warmup: usize,
}

impl CsvCandleSource {
    pub fn new(series: HashMap<String, Vec<Candle>>, warmup: usize) -> Self {
        Self {
            series,
            cursors: Mutex::new(HashMap::new()),
            warmup,
        }
    }

    pub fn from_path(path: &Path, fallback_symbol: &str, warmup: usize) -> Result<Self> {
        let series = read_candles(path, fallback_symbol)?;
        for (symbol, candles) in &series {
            info!("CsvCandleSource [{}]: Loaded {} candles", symbol, candles.len());
        }
        Ok(Self::new(series, warmup))
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

#[async_trait]
impl CandleSource for CsvCandleSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Option<Vec<Candle>>> {
        let Some(candles) = self.series.get(symbol) else {
            return Ok(None);
        };

        let mut cursors = self.cursors.lock().await;
        let cursor = cursors
            .entry(symbol.to_string())
            .or_insert(self.warmup.min(candles.len()));
        if *cursor > candles.len() || candles.is_empty() {
            return Ok(None);
        }

        let end = *cursor;
        *cursor += 1;
        if end == 0 {
            return Ok(None);
        }
        let start = end.saturating_sub(count);
        Ok(Some(candles[start..end].to_vec()))
    }
}

#[async_trait]
impl PriceFeed for CsvCandleSource {
    /// Close of the newest candle revealed so far.
    async fn last_price(&self, symbol: &str) -> Option<f64> {
        let candles = self.series.get(symbol)?;
        let cursor = *self.cursors.lock().await.get(symbol)?;
        let revealed = cursor.saturating_sub(1).min(candles.len());
        revealed.checked_sub(1).map(|i| candles[i].close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
timestamp,open,high,low,close,volume
120,1.2,1.3,1.1,1.25,10
60,1.1,1.2,1.0,1.15,12
180,1.25,1.35,1.2,1.3,9
";

    #[test]
    fn test_parse_sorts_and_uses_fallback_symbol() {
        let series = parse_candles(SAMPLE.as_bytes(), "EURUSD").unwrap();
        let candles = &series["EURUSD"];
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].timestamp, 60);
        assert_eq!(candles[2].close, 1.3);
    }

    #[test]
    fn test_parse_groups_by_symbol_column() {
        let data = "symbol,timestamp,open,high,low,close,volume\n\
                    EURUSD,60,1,1,1,1,1\n\
                    XAUUSD,60,2400,2401,2399,2400,5\n\
                    EURUSD,120,1,1,1,1,1\n";
        let series = parse_candles(data.as_bytes(), "IGNORED").unwrap();
        assert_eq!(series["EURUSD"].len(), 2);
        assert_eq!(series["XAUUSD"].len(), 1);
        assert!(!series.contains_key("IGNORED"));
    }

    #[test]
    fn test_malformed_row_is_an_error() {
        let data = "timestamp,open,high,low,close,volume\n60,abc,1,1,1,1\n";
        assert!(parse_candles(data.as_bytes(), "EURUSD").is_err());
    }

    #[tokio::test]
    async fn test_replay_reveals_one_candle_per_fetch() {
        let series = parse_candles(SAMPLE.as_bytes(), "EURUSD").unwrap();
        let source = CsvCandleSource::new(series, 2);

        let first = source.fetch_candles("EURUSD", Timeframe::M5, 10).await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        let second = source.fetch_candles("EURUSD", Timeframe::M5, 10).await.unwrap().unwrap();
        assert_eq!(second.len(), 3);
        assert!(source.fetch_candles("EURUSD", Timeframe::M5, 10).await.unwrap().is_none());
        assert!(source.fetch_candles("GBPUSD", Timeframe::M5, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_price_tracks_revealed_history() {
        let series = parse_candles(SAMPLE.as_bytes(), "EURUSD").unwrap();
        let source = CsvCandleSource::new(series, 2);
        assert_eq!(source.last_price("EURUSD").await, None);

        source.fetch_candles("EURUSD", Timeframe::M5, 10).await.unwrap();
        assert_eq!(source.last_price("EURUSD").await, Some(1.25));
        source.fetch_candles("EURUSD", Timeframe::M5, 10).await.unwrap();
        assert_eq!(source.last_price("EURUSD").await, Some(1.3));
    }
}
