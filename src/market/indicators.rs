//! Price indicators computed from timeseries buckets.
//!
//! Degenerate inputs (too few points, zero baselines) produce neutral
//! values rather than NaN: 0 for volatility and momentum, 1 for ratios.

use crate::types::TimeseriesPoint;

/// Mid prices of the buckets where both sides traded, in order.
pub fn mid_prices(points: &[TimeseriesPoint]) -> Vec<f64> {
    points.iter().filter_map(|p| p.mid_price()).collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation of prices.
pub fn std_dev(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    let m = mean(prices);
    let variance = prices.iter().map(|p| (p - m).powi(2)).sum::<f64>() / prices.len() as f64;
    variance.sqrt()
}

/// Root mean square of consecutive returns.
pub fn rms_returns(prices: &[f64]) -> f64 {
    let returns: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    (returns.iter().map(|r| r * r).sum::<f64>() / returns.len() as f64).sqrt()
}

/// Relative change from the first to the last price.
pub fn momentum(prices: &[f64]) -> f64 {
    match (prices.first(), prices.last()) {
        (Some(&first), Some(&last)) if prices.len() >= 2 && first != 0.0 => (last - first) / first,
        _ => 0.0,
    }
}

/// `current` relative to the mean of `prices`.
pub fn ma_ratio(current: f64, prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return 1.0;
    }
    let m = mean(prices);
    if m == 0.0 {
        1.0
    } else {
        current / m
    }
}

/// Combined volume of the most recent bucket.
pub fn last_volume(points: &[TimeseriesPoint]) -> i64 {
    points.last().map(|p| p.volume()).unwrap_or(0)
}
