//! Daily-return statistics and volume aggregation by price level.

use serde::Serialize;

use crate::indicators::sample_std;
use crate::series::{MetricsError, MetricsResult, PriceSeries};

pub const DEFAULT_VOLUME_BUCKETS: usize = 10;

/// Percent change from the previous close, aligned to the series.
///
/// Index 0 has no predecessor. A zero previous close leaves that return
/// undefined instead of producing an infinity.
pub fn daily_returns(series: &PriceSeries) -> Vec<Option<f64>> {
    let bars = series.bars();
    std::iter::once(None)
        .chain(bars.windows(2).map(|pair| {
            let prev = pair[0].close;
            (prev != 0.0).then(|| (pair[1].close - prev) / prev * 100.0)
        }))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnDistribution {
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation, i.e. the period's volatility.
    pub std_dev: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub positive_days: usize,
    pub negative_days: usize,
    pub neutral_days: usize,
    pub avg_gain: Option<f64>,
    pub avg_loss: Option<f64>,
}

fn mean_of(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

pub fn return_distribution(series: &PriceSeries) -> ReturnDistribution {
    let returns: Vec<f64> = daily_returns(series).into_iter().flatten().collect();

    let gains: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();

    ReturnDistribution {
        count: returns.len(),
        mean: mean_of(&returns),
        std_dev: (returns.len() >= 2).then(|| sample_std(&returns)),
        max: returns.iter().copied().reduce(f64::max),
        min: returns.iter().copied().reduce(f64::min),
        positive_days: gains.len(),
        negative_days: losses.len(),
        neutral_days: returns.len() - gains.len() - losses.len(),
        avg_gain: mean_of(&gains),
        avg_loss: mean_of(&losses),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeBucket {
    /// Inclusive lower edge.
    pub low: f64,
    /// Exclusive upper edge, except for the last bucket which includes it.
    pub high: f64,
    pub volume: f64,
}

/// Sums volume into `bucket_count` equal-width close-price ranges.
///
/// A flat series (all closes equal) puts everything into the last bucket,
/// since every close equals the maximum.
pub fn volume_by_price_bucket(
    series: &PriceSeries,
    bucket_count: usize,
) -> MetricsResult<Vec<VolumeBucket>> {
    if bucket_count == 0 {
        return Err(MetricsError::InvalidWindow {
            indicator: "volume_by_price",
            window: bucket_count,
        });
    }

    let closes = series.closes();
    let min = closes.iter().copied().fold(f64::INFINITY, f64::min);
    let max = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / bucket_count as f64;

    let mut buckets: Vec<VolumeBucket> = (0..bucket_count)
        .map(|i| VolumeBucket {
            low: min + width * i as f64,
            high: if i + 1 == bucket_count {
                max
            } else {
                min + width * (i + 1) as f64
            },
            volume: 0.0,
        })
        .collect();

    for bar in series.bars() {
        let idx = if width == 0.0 {
            bucket_count - 1
        } else {
            (((bar.close - min) / width).floor() as usize).min(bucket_count - 1)
        };
        buckets[idx].volume += bar.volume;
    }
    Ok(buckets)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
}

pub fn volume_stats(series: &PriceSeries) -> VolumeStats {
    let volumes = series.volumes();
    VolumeStats {
        mean: volumes.iter().sum::<f64>() / volumes.len() as f64,
        max: volumes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min: volumes.iter().copied().fold(f64::INFINITY, f64::min),
    }
}
