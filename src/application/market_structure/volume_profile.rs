//! Decayed volume profile over a candle window.
//!
//! Each candle contributes `volume * decay^age` (newest age 0) to the histogram bin of its close.
//! The histogram is smoothed with a centered 3-bin mean before POC and value area are derived,
//! which removes single-bin spikes and favours real volume clusters.

use crate::config::StrategyEnvConfig;
use crate::domain::market::volume_profile::{
    ProfileBin, ScanDirection, ValueAreaMode, VolumeProfile,
};
use crate::domain::trading::types::Candle;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSettings {
    pub lookback: usize,
    pub decay: f64,
    pub bins: usize,
    pub min_candles: usize,
    pub value_area_fraction: f64,
    pub mode: ValueAreaMode,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self::from(&StrategyEnvConfig::default())
    }
}

impl From<&StrategyEnvConfig> for ProfileSettings {
    fn from(config: &StrategyEnvConfig) -> Self {
        Self {
            lookback: config.profile_lookback,
            decay: config.profile_decay,
            bins: config.profile_bins.max(1),
            min_candles: config.min_profile_candles,
            value_area_fraction: config.value_area_fraction,
            mode: config.value_area_mode,
        }
    }
}

/// Builds the profile from the trailing `lookback` candles of `window`.
///
/// Returns `None` when fewer than `min_candles` candles are supplied or the window carries no
/// volume. A window whose closes are all equal yields a single level.
pub fn compute_profile(window: &[Candle], settings: &ProfileSettings) -> Option<VolumeProfile> {
    if window.len() < settings.min_candles || window.is_empty() {
        return None;
    }

    let start = window.len().saturating_sub(settings.lookback);
    let subset = &window[start..];
    let newest = subset.len() - 1;

    let weights: Vec<f64> = subset
        .iter()
        .enumerate()
        .map(|(i, c)| settings.decay.powi((newest - i) as i32) * c.volume)
        .collect();

    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }

    let (lo, hi) = subset.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
        (lo.min(c.close), hi.max(c.close))
    });

    if hi <= lo {
        let bin = ProfileBin {
            price: lo,
            weight: total,
            raw_weight: total,
        };
        return Some(VolumeProfile {
            bins: vec![bin],
            poc: lo,
            vah: lo,
            val: lo,
            mode: settings.mode,
            value_area: vec![0],
        });
    }

    let n = settings.bins;
    let width = (hi - lo) / n as f64;

    let mut raw = vec![0.0; n];
    for (candle, w) in subset.iter().zip(&weights) {
        let idx = (((candle.close - lo) / width).floor() as usize).min(n - 1);
        raw[idx] += w;
    }

    let bins: Vec<ProfileBin> = (0..n)
        .map(|i| {
            let from = i.saturating_sub(1);
            let to = (i + 1).min(n - 1);
            let neighbourhood = &raw[from..=to];
            ProfileBin {
                price: lo + width * i as f64,
                weight: neighbourhood.iter().sum::<f64>() / neighbourhood.len() as f64,
                raw_weight: raw[i],
            }
        })
        .collect();

    let poc_idx = (0..n)
        .min_by(|&a, &b| heavier_first(&bins[a], &bins[b]))
        .unwrap_or(0);

    let value_area = match settings.mode {
        ValueAreaMode::Ranked => ranked_value_area(&bins, settings.value_area_fraction),
        ValueAreaMode::Contiguous => {
            contiguous_value_area(&bins, poc_idx, settings.value_area_fraction)
        }
    };

    let (val, vah) = value_area
        .iter()
        .map(|&i| bins[i].price)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p), hi.max(p))
        });

    Some(VolumeProfile {
        poc: bins[poc_idx].price,
        vah,
        val,
        mode: settings.mode,
        value_area,
        bins,
    })
}

/// Ordering that puts the heavier bin first: smoothed weight, then raw weight, then lower price.
fn heavier_first(a: &ProfileBin, b: &ProfileBin) -> Ordering {
    b.weight
        .total_cmp(&a.weight)
        .then(b.raw_weight.total_cmp(&a.raw_weight))
        .then(a.price.total_cmp(&b.price))
}

fn ranked_value_area(bins: &[ProfileBin], fraction: f64) -> Vec<usize> {
    let total: f64 = bins.iter().map(|b| b.weight).sum();
    let target = total * fraction;

    let mut order: Vec<usize> = (0..bins.len()).collect();
    order.sort_by(|&a, &b| heavier_first(&bins[a], &bins[b]));

    let mut selected = Vec::new();
    let mut acc = 0.0;
    for idx in order {
        selected.push(idx);
        acc += bins[idx].weight;
        if acc >= target {
            break;
        }
    }
    selected
}

fn contiguous_value_area(bins: &[ProfileBin], poc_idx: usize, fraction: f64) -> Vec<usize> {
    let total: f64 = bins.iter().map(|b| b.weight).sum();
    let target = total * fraction;

    let mut low = poc_idx;
    let mut high = poc_idx;
    let mut acc = bins[poc_idx].weight;

    while acc < target {
        let can_go_lower = low > 0;
        let can_go_higher = high + 1 < bins.len();
        if !can_go_lower && !can_go_higher {
            break;
        }

        let lower = if can_go_lower { bins[low - 1].weight } else { f64::NEG_INFINITY };
        let upper = if can_go_higher { bins[high + 1].weight } else { f64::NEG_INFINITY };

        if can_go_lower && lower >= upper {
            low -= 1;
            acc += lower;
        } else {
            high += 1;
            acc += upper;
        }
    }

    (low..=high).collect()
}

/// First bin on the `direction` side of `price` whose weight is below `fraction` of the mean weight.
///
/// Bins are scanned outward from `price`: descending for `Down`, ascending for `Up`.
/// Bins at exactly `price` are ignored.
pub fn find_low_volume_area(
    profile: &VolumeProfile,
    price: f64,
    direction: ScanDirection,
    fraction: f64,
) -> Option<f64> {
    let threshold = profile.mean_weight() * fraction;

    match direction {
        ScanDirection::Down => profile
            .bins
            .iter()
            .rev()
            .filter(|b| b.price < price)
            .find(|b| b.weight < threshold)
            .map(|b| b.price),
        ScanDirection::Up => profile
            .bins
            .iter()
            .filter(|b| b.price > price)
            .find(|b| b.weight < threshold)
            .map(|b| b.price),
    }
}
