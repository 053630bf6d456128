use crate::domain::trading::types::Candle;

/// Volume-weighted typical price over the whole window. `None` without volume.
pub fn compute_vwap(window: &[Candle]) -> Option<f64> {
    let (pv, v) = window.iter().fold((0.0, 0.0), |(pv, v), c| {
        (pv + c.typical_price() * c.volume, v + c.volume)
    });
    if v > 0.0 { Some(pv / v) } else { None }
}

/// Index (into `window`) of the lowest low among the trailing `lookback` candles.
/// Windows shorter than `lookback` anchor at the first candle. Ties keep the earliest candle.
pub fn find_anchor_pivot(window: &[Candle], lookback: usize) -> usize {
    if window.len() < lookback || lookback == 0 {
        return 0;
    }
    let start = window.len() - lookback;
    window[start..]
        .iter()
        .enumerate()
        .fold((start, f64::INFINITY), |(best, low), (i, c)| {
            if c.low < low { (start + i, c.low) } else { (best, low) }
        })
        .0
}

/// Candles from the anchor pivot to the end, or the trailing `fallback` candles when the
/// anchored slice is shorter than `min_len`.
pub fn anchored_window(
    window: &[Candle],
    anchor_lookback: usize,
    min_len: usize,
    fallback: usize,
) -> &[Candle] {
    let pivot = find_anchor_pivot(window, anchor_lookback);
    let anchored = &window[pivot..];
    if anchored.len() < min_len {
        &window[window.len().saturating_sub(fallback)..]
    } else {
        anchored
    }
}

/// Highest high and lowest low over the trailing `lookback` candles.
pub fn swing_extremes(window: &[Candle], lookback: usize) -> Option<(f64, f64)> {
    if window.is_empty() {
        return None;
    }
    let start = window.len().saturating_sub(lookback);
    Some(window[start..].iter().fold(
        (f64::NEG_INFINITY, f64::INFINITY),
        |(hi, lo), c| (hi.max(c.high), lo.min(c.low)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(low: f64, high: f64, close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: 0,
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn test_vwap_weights_typical_price_by_volume() {
        let window = vec![bar(9.0, 12.0, 9.0, 1.0), bar(19.0, 22.0, 19.0, 3.0)];
        // typical prices 10 and 20
        let vwap = compute_vwap(&window).unwrap();
        assert!((vwap - 17.5).abs() < 1e-12);
    }

    #[test]
    fn test_vwap_without_volume_is_none() {
        assert!(compute_vwap(&[bar(1.0, 2.0, 1.5, 0.0)]).is_none());
        assert!(compute_vwap(&[]).is_none());
    }

    #[test]
    fn test_anchor_pivot_finds_lowest_low() {
        let mut window: Vec<Candle> = (0..60).map(|_| bar(100.0, 101.0, 100.5, 1.0)).collect();
        window[45].low = 95.0;
        window[50].low = 95.0;
        assert_eq!(find_anchor_pivot(&window, 30), 45);

        // Pivot older than the lookback is ignored.
        window[10].low = 90.0;
        assert_eq!(find_anchor_pivot(&window, 30), 45);
    }

    #[test]
    fn test_short_window_anchors_at_start() {
        let window: Vec<Candle> = (0..12).map(|i| bar(100.0 - i as f64, 101.0, 100.0, 1.0)).collect();
        assert_eq!(find_anchor_pivot(&window, 30), 0);
    }

    #[test]
    fn test_anchored_window_falls_back_when_pivot_is_recent() {
        let mut window: Vec<Candle> = (0..200).map(|_| bar(100.0, 101.0, 100.5, 1.0)).collect();
        window[195].low = 90.0;
        let slice = anchored_window(&window, 30, 10, 96);
        assert_eq!(slice.len(), 96);

        window[195].low = 100.0;
        window[175].low = 90.0;
        let slice = anchored_window(&window, 30, 10, 96);
        assert_eq!(slice.len(), 25);
    }

    #[test]
    fn test_swing_extremes_respect_lookback() {
        let mut window: Vec<Candle> = (0..80).map(|_| bar(99.0, 101.0, 100.0, 1.0)).collect();
        window[5].high = 150.0;
        window[70].high = 104.0;
        window[75].low = 97.0;
        assert_eq!(swing_extremes(&window, 50), Some((104.0, 97.0)));
    }
}
