//! Candle history -> engineered feature rows.
//!
//! Indicators are streamed through the `ta` crate one candle at a time. Values that cannot be
//! computed for a row (lags at the start of the window, divisions by a zero range) are left as
//! NaN and repaired afterwards: forward fill, then backward fill, then zero.

use crate::domain::errors::SchemaError;
use crate::domain::ml::feature_registry::{FeatureSchema, FeatureSnapshot};
use crate::domain::trading::types::Candle;
use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, CommodityChannelIndex, ExponentialMovingAverage, Maximum,
    Minimum, MoneyFlowIndex, MovingAverageConvergenceDivergence, OnBalanceVolume,
    RelativeStrengthIndex, SimpleMovingAverage,
};

/// Fewer candles than this produce an empty frame.
pub const MIN_CANDLES: usize = 200;

const OBV_SLOPE_PERIOD: usize = 5;
const LAGGED: &[&str] = &["rsi", "macd_hist", "trend_strength", "mfi"];

/// Column-oriented feature table, one row per input candle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub timestamps: Vec<i64>,
    pub closes: Vec<f64>,
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn row(&self, i: usize) -> Option<FeatureSnapshot> {
        let ts = *self.timestamps.get(i)?;
        let mut snap = FeatureSnapshot::new(ts);
        for (name, values) in &self.columns {
            snap.set(name, values[i]);
        }
        Some(snap)
    }

    pub fn last(&self) -> Option<FeatureSnapshot> {
        self.len().checked_sub(1).and_then(|i| self.row(i))
    }

    /// Model inputs with next-candle direction labels (1 = next close higher).
    /// The final row has no successor and is dropped.
    pub fn labelled_rows(
        &self,
        schema: &FeatureSchema,
    ) -> Result<(Vec<Vec<f64>>, Vec<u32>), SchemaError> {
        let usable = self.len().saturating_sub(1);
        let mut x = Vec::with_capacity(usable);
        let mut y = Vec::with_capacity(usable);
        for i in 0..usable {
            if let Some(row) = self.row(i) {
                x.push(schema.vectorize(&row)?);
                y.push(u32::from(self.closes[i + 1] > self.closes[i]));
            }
        }
        Ok((x, y))
    }
}

fn ta_err(e: ta::errors::TaError) -> anyhow::Error {
    anyhow!("Indicator initialisation failed: {:?}", e)
}

/// Computes every engineered feature for `candles` (oldest first).
///
/// Returns an empty frame when fewer than `MIN_CANDLES` candles are supplied.
pub fn engineer_features(candles: &[Candle]) -> Result<FeatureFrame> {
    if candles.len() < MIN_CANDLES {
        return Ok(FeatureFrame::default());
    }

    let no_volume = candles.iter().all(|c| c.volume == 0.0);

    let mut rsi = RelativeStrengthIndex::new(14).map_err(ta_err)?;
    let mut atr = AverageTrueRange::new(14).map_err(ta_err)?;
    let mut cci = CommodityChannelIndex::new(20).map_err(ta_err)?;
    let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9).map_err(ta_err)?;
    let mut ema20 = ExponentialMovingAverage::new(20).map_err(ta_err)?;
    let mut ema50 = ExponentialMovingAverage::new(50).map_err(ta_err)?;
    let mut bb = BollingerBands::new(20, 2.0).map_err(ta_err)?;
    let mut mfi = MoneyFlowIndex::new(14).map_err(ta_err)?;
    let mut obv = OnBalanceVolume::new();
    let mut rsi_max = Maximum::new(14).map_err(ta_err)?;
    let mut rsi_min = Minimum::new(14).map_err(ta_err)?;
    let mut stoch_k = SimpleMovingAverage::new(3).map_err(ta_err)?;
    let mut stoch_d = SimpleMovingAverage::new(3).map_err(ta_err)?;

    let n = candles.len();
    let mut cols: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut push = |name: &str, v: f64| {
        cols.entry(name.to_string())
            .or_insert_with(|| Vec::with_capacity(n))
            .push(v);
    };

    let mut obv_history: Vec<f64> = Vec::with_capacity(n);
    let mut last_stoch = 50.0;
    let mut prev_body: Option<f64> = None;

    for c in candles {
        let volume = if no_volume { 1.0 } else { c.volume };
        let item = ta::DataItem::builder()
            .open(c.open)
            .high(c.high)
            .low(c.low)
            .close(c.close)
            .volume(volume)
            .build()
            .map_err(ta_err)?;

        // Momentum
        let rsi_v = rsi.next(c.close);
        let hi = rsi_max.next(rsi_v);
        let lo = rsi_min.next(rsi_v);
        if hi > lo {
            let raw = (rsi_v - lo) / (hi - lo) * 100.0;
            if raw.is_finite() {
                last_stoch = raw;
            }
        }
        let k = stoch_k.next(last_stoch);
        let d = stoch_d.next(k);
        push("rsi", rsi_v);
        push("stoch_k", k);
        push("stoch_d", d);
        push("cci", cci.next(&item));

        // Trend
        let m = macd.next(c.close);
        push("macd", m.macd);
        push("macd_signal", m.signal);
        push("macd_hist", m.histogram);
        push("trend_strength", ema20.next(c.close) - ema50.next(c.close));

        // Volatility
        push("atr", atr.next(&item));
        let bands = bb.next(c.close);
        let band_range = bands.upper - bands.lower;
        push(
            "bb_pct",
            if band_range > 0.0 { (c.close - bands.lower) / band_range } else { f64::NAN },
        );
        push(
            "bb_width",
            if c.close != 0.0 { band_range / c.close } else { f64::NAN },
        );

        // Volume flow
        push("mfi", mfi.next(&item));
        let obv_v = obv.next(&item);
        obv_history.push(obv_v);
        let slope = obv_history
            .len()
            .checked_sub(OBV_SLOPE_PERIOD + 1)
            .map(|i| obv_v - obv_history[i])
            .unwrap_or(f64::NAN);
        push("obv_slope", slope);

        // Price action
        let body = c.body();
        push("wick_upper", c.high - c.open.max(c.close));
        push("wick_lower", c.open.min(c.close) - c.low);
        push("is_doji", if body <= c.range() * 0.1 { 1.0 } else { 0.0 });
        let engulfing = match prev_body {
            Some(prev) if body > prev && c.close > c.open => 1.0,
            Some(prev) if body > prev && c.close < c.open => -1.0,
            _ => 0.0,
        };
        push("engulfing", engulfing);
        prev_body = Some(body);
    }

    for &name in LAGGED {
        let base = cols.get(name).cloned().unwrap_or_default();
        for lag in 1..=2 {
            let shifted: Vec<f64> = (0..n)
                .map(|i| if i >= lag { base[i - lag] } else { f64::NAN })
                .collect();
            cols.insert(format!("{}_prev{}", name, lag), shifted);
        }
    }

    for values in cols.values_mut() {
        fill_gaps(values);
    }

    Ok(FeatureFrame {
        timestamps: candles.iter().map(|c| c.timestamp).collect(),
        closes: candles.iter().map(|c| c.close).collect(),
        columns: cols,
    })
}

/// Forward fill, then backward fill, then zero.
fn fill_gaps(values: &mut [f64]) {
    let mut last: Option<f64> = None;
    for v in values.iter_mut() {
        if v.is_finite() {
            last = Some(*v);
        } else if let Some(prev) = last {
            *v = prev;
        }
    }

    let mut next: Option<f64> = None;
    for v in values.iter_mut().rev() {
        if v.is_finite() {
            next = Some(*v);
        } else if let Some(after) = next {
            *v = after;
        }
    }

    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::ml::feature_registry::FEATURE_NAMES;

    /// Deterministic wavy series with a mild uptrend.
    pub(crate) fn synthetic_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                let base = 100.0 + t * 0.01 + (t / 7.0).sin() * 0.8 + (t / 3.0).cos() * 0.3;
                let open = base - (t / 5.0).sin() * 0.1;
                let close = base + (t / 4.0).cos() * 0.15;
                Candle {
                    timestamp: 1_700_000_000 + i as i64 * 300,
                    open,
                    high: open.max(close) + 0.2,
                    low: open.min(close) - 0.2,
                    close,
                    volume: 1000.0 + ((t / 2.0).sin() * 400.0).abs(),
                }
            })
            .collect()
    }

    #[test]
    fn test_short_history_yields_empty_frame() {
        let frame = engineer_features(&synthetic_candles(199)).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_every_contract_field_present_and_finite() {
        let frame = engineer_features(&synthetic_candles(260)).unwrap();
        assert_eq!(frame.len(), 260);

        let schema = FeatureSchema::current();
        for i in [0, 1, 5, 259] {
            let row = frame.row(i).unwrap();
            let vec = schema.vectorize(&row).unwrap();
            assert_eq!(vec.len(), FEATURE_NAMES.len());
        }
    }

    #[test]
    fn test_lags_shift_by_one_and_two() {
        let frame = engineer_features(&synthetic_candles(220)).unwrap();
        let rsi = frame.column("rsi").unwrap();
        let prev1 = frame.column("rsi_prev1").unwrap();
        let prev2 = frame.column("rsi_prev2").unwrap();
        assert_eq!(prev1[100], rsi[99]);
        assert_eq!(prev2[100], rsi[98]);
        // Back-filled head
        assert_eq!(prev2[0], rsi[0]);
    }

    #[test]
    fn test_zero_volume_everywhere_is_replaced() {
        let mut candles = synthetic_candles(210);
        for c in &mut candles {
            c.volume = 0.0;
        }
        let frame = engineer_features(&candles).unwrap();
        let last = frame.last().unwrap();
        assert!(last.get("mfi").unwrap().is_finite());
        assert!(last.get("obv_slope").unwrap().is_finite());
    }

    #[test]
    fn test_doji_and_engulfing_flags() {
        let mut candles = synthetic_candles(200);
        let n = candles.len();
        candles[n - 2] = Candle {
            timestamp: candles[n - 2].timestamp,
            open: 100.0,
            high: 100.5,
            low: 99.5,
            close: 100.02,
            volume: 1000.0,
        };
        candles[n - 1] = Candle {
            timestamp: candles[n - 1].timestamp,
            open: 100.0,
            high: 100.2,
            low: 99.0,
            close: 99.1,
            volume: 1000.0,
        };
        let frame = engineer_features(&candles).unwrap();
        let doji = frame.column("is_doji").unwrap();
        let engulfing = frame.column("engulfing").unwrap();
        assert_eq!(doji[n - 2], 1.0);
        assert_eq!(doji[n - 1], 0.0);
        assert_eq!(engulfing[n - 1], -1.0);
        let last = frame.last().unwrap();
        assert!((last.get("wick_upper").unwrap() - 0.2).abs() < 1e-9);
        assert!((last.get("wick_lower").unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_labels_follow_next_close() {
        let frame = engineer_features(&synthetic_candles(230)).unwrap();
        let (x, y) = frame.labelled_rows(&FeatureSchema::current()).unwrap();
        assert_eq!(x.len(), 229);
        assert_eq!(y.len(), 229);
        for i in [0, 50, 228] {
            let expected = u32::from(frame.closes[i + 1] > frame.closes[i]);
            assert_eq!(y[i], expected);
        }
    }

    #[test]
    fn test_fill_gaps_order() {
        let mut v = vec![f64::NAN, 2.0, f64::NAN, 4.0, f64::NAN];
        fill_gaps(&mut v);
        assert_eq!(v, vec![2.0, 2.0, 2.0, 4.0, 4.0]);

        let mut all_missing = vec![f64::NAN; 3];
        fill_gaps(&mut all_missing);
        assert_eq!(all_missing, vec![0.0; 3]);
    }
}
