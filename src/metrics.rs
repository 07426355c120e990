//! Per-bar derived metrics, aligned one-to-one with the input series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::cumulative_price_change::{
    PeriodSummary, TickerHistory, normalized_performance, period_summary,
};
use crate::distribution::{
    self, DEFAULT_VOLUME_BUCKETS, ReturnDistribution, VolumeBucket, VolumeStats,
};
use crate::indicators::{
    self, BollingerPoint, Crossover, DEFAULT_BOLLINGER_STD, DEFAULT_BOLLINGER_WINDOW,
    DEFAULT_RSI_PERIOD, MacdPoint,
};
use crate::series::{MetricsResult, PriceSeries};

pub const DEFAULT_MA_WINDOWS: [usize; 5] = [5, 10, 20, 50, 200];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub ma_windows: Vec<usize>,
    pub rsi_period: usize,
    pub bollinger_window: usize,
    pub bollinger_std: f64,
    pub volume_buckets: usize,
    /// Short and long SMA windows compared for crossovers.
    #[serde(default = "default_crossover")]
    pub crossover: (usize, usize),
}

fn default_crossover() -> (usize, usize) {
    (5, 50)
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            ma_windows: DEFAULT_MA_WINDOWS.to_vec(),
            rsi_period: DEFAULT_RSI_PERIOD,
            bollinger_window: DEFAULT_BOLLINGER_WINDOW,
            bollinger_std: DEFAULT_BOLLINGER_STD,
            volume_buckets: DEFAULT_VOLUME_BUCKETS,
            crossover: default_crossover(),
        }
    }
}

/// Computed fields for one bar. `None` means not enough look-back yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedPoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    /// One entry per configured window, in `MetricsConfig::ma_windows` order.
    pub moving_averages: Vec<Option<f64>>,
    pub ema12: f64,
    pub ema26: f64,
    pub macd: MacdPoint,
    pub rsi: Option<f64>,
    pub bollinger: Option<BollingerPoint>,
    pub daily_return: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedSeries {
    pub symbol: String,
    pub ma_windows: Vec<usize>,
    pub points: Vec<DerivedPoint>,
}

impl DerivedSeries {
    pub fn build(series: &PriceSeries, config: &MetricsConfig) -> MetricsResult<Self> {
        let moving_averages = config
            .ma_windows
            .iter()
            .map(|&w| indicators::simple_moving_average(series, w))
            .collect::<MetricsResult<Vec<_>>>()?;
        let ema12 = indicators::exponential_moving_average(series, indicators::MACD_FAST)?;
        let ema26 = indicators::exponential_moving_average(series, indicators::MACD_SLOW)?;
        let macd = indicators::macd(series)?;
        let rsi = indicators::rsi(series, config.rsi_period)?;
        let bollinger =
            indicators::bollinger_bands(series, config.bollinger_window, config.bollinger_std)?;
        let returns = distribution::daily_returns(series);

        let points = series
            .bars()
            .iter()
            .enumerate()
            .map(|(i, bar)| DerivedPoint {
                timestamp: bar.timestamp,
                close: bar.close,
                moving_averages: moving_averages.iter().map(|ma| ma[i]).collect(),
                ema12: ema12[i],
                ema26: ema26[i],
                macd: macd[i],
                rsi: rsi[i],
                bollinger: bollinger[i],
                daily_return: returns[i],
            })
            .collect();

        Ok(Self {
            symbol: series.symbol().to_string(),
            ma_windows: config.ma_windows.clone(),
            points,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&DerivedPoint> {
        self.points.last()
    }

    /// Column for one configured moving-average window.
    pub fn moving_average(&self, window: usize) -> Option<Vec<Option<f64>>> {
        let col = self.ma_windows.iter().position(|&w| w == window)?;
        Some(self.points.iter().map(|p| p.moving_averages[col]).collect())
    }
}

/// Everything the analysis view shows for a single ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerAnalysis {
    pub derived: DerivedSeries,
    pub summary: PeriodSummary,
    pub returns: ReturnDistribution,
    pub volume_profile: Vec<VolumeBucket>,
    pub volume: VolumeStats,
    pub crossovers: Vec<Crossover>,
}

impl TickerAnalysis {
    pub fn compute(series: &PriceSeries, config: &MetricsConfig) -> MetricsResult<Self> {
        let (short, long) = config.crossover;
        let crossovers = indicators::ma_crossovers(
            &indicators::simple_moving_average(series, short)?,
            &indicators::simple_moving_average(series, long)?,
        );
        Ok(Self {
            derived: DerivedSeries::build(series, config)?,
            summary: period_summary(series),
            returns: distribution::return_distribution(series),
            volume_profile: distribution::volume_by_price_bucket(series, config.volume_buckets)?,
            volume: distribution::volume_stats(series),
            crossovers,
        })
    }
}

/// One watchlist entry reduced to the side-by-side comparison figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub ticker: String,
    pub company_name: String,
    /// Closes rebased to 100; `None` when the first close is zero.
    pub performance: Option<Vec<f64>>,
    pub returns: ReturnDistribution,
    pub volume: VolumeStats,
    /// Bollinger bandwidth at the last bar.
    pub bandwidth: Option<f64>,
}

impl ComparisonRow {
    pub fn from_history(history: &TickerHistory, config: &MetricsConfig) -> MetricsResult<Self> {
        let series = &history.series;
        let bands = indicators::bollinger_bands(series, config.bollinger_window, config.bollinger_std)?;
        Ok(Self {
            ticker: series.symbol().to_string(),
            company_name: history.company_name.clone(),
            performance: normalized_performance(series),
            returns: distribution::return_distribution(series),
            volume: distribution::volume_stats(series),
            bandwidth: bands.last().copied().flatten().and_then(|b| b.bandwidth()),
        })
    }

    /// Base-100 value at the last bar.
    pub fn final_performance(&self) -> Option<f64> {
        self.performance.as_ref().and_then(|p| p.last().copied())
    }
}

/// Comparison rows for every fetched ticker, least volatile first.
///
/// Failed fetches are skipped. Tickers without a volatility figure sort last.
pub fn compare_histories<E: fmt::Display>(
    fetched: Vec<(String, Result<TickerHistory, E>)>,
    config: &MetricsConfig,
) -> Vec<ComparisonRow> {
    let mut rows: Vec<ComparisonRow> = fetched
        .into_iter()
        .filter_map(|(ticker, outcome)| {
            let history = outcome
                .map_err(|e| warn!(%ticker, error = %e, "skipping ticker in comparison"))
                .ok()?;
            ComparisonRow::from_history(&history, config)
                .map_err(|e| warn!(%ticker, error = %e, "skipping ticker in comparison"))
                .ok()
        })
        .collect();

    rows.sort_by(|a, b| match (a.returns.std_dev, b.returns.std_dev) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    rows
}
