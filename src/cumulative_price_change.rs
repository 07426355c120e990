//! Whole-window price movement: percent change, period summary and the
//! per-ticker reduction that feeds the ranking.

use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::series::{MetricsError, MetricsResult, PriceSeries};
use crate::snapshot::TickerSnapshot;

/// `(last close - first close) / first close * 100`.
pub fn percent_change(series: &PriceSeries) -> MetricsResult<f64> {
    let first_close = series.first().close;
    if first_close == 0.0 {
        return Err(MetricsError::DivisionByZero("percent change"));
    }
    Ok((series.last().close - first_close) / first_close * 100.0)
}

pub fn price_change(series: &PriceSeries) -> f64 {
    series.last().close - series.first().close
}

/// Closes rebased so the first bar is 100. `None` when the first close is zero.
pub fn normalized_performance(series: &PriceSeries) -> Option<Vec<f64>> {
    let base = series.first().close;
    if base == 0.0 {
        return None;
    }
    Some(series.bars().iter().map(|b| b.close / base * 100.0).collect())
}

/// Headline numbers for one ticker over the requested window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub high: f64,
    pub low: f64,
    pub avg_close: f64,
    pub avg_volume: f64,
    /// Measured from the first open, not the first close.
    pub change: f64,
    pub percent: Option<f64>,
    pub last_close: f64,
}

pub fn period_summary(series: &PriceSeries) -> PeriodSummary {
    let bars = series.bars();
    let n = bars.len() as f64;
    let start = series.first().open;
    let end = series.last().close;
    let change = end - start;

    PeriodSummary {
        high: bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max),
        low: bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
        avg_close: bars.iter().map(|b| b.close).sum::<f64>() / n,
        avg_volume: bars.iter().map(|b| b.volume).sum::<f64>() / n,
        change,
        percent: (start != 0.0).then(|| change / start * 100.0),
        last_close: end,
    }
}

/// Price history for one watchlist entry, as handed over by the fetch step.
#[derive(Debug, Clone)]
pub struct TickerHistory {
    pub company_name: String,
    pub market_cap: Option<f64>,
    pub series: PriceSeries,
}

impl TickerSnapshot {
    /// Reduces a series to its ranking tuple. Fails only when the percent
    /// change is undefined.
    pub fn from_history(history: &TickerHistory) -> MetricsResult<Self> {
        let series = &history.series;
        Ok(Self {
            ticker: series.symbol().to_string(),
            company_name: history.company_name.clone(),
            current_price: series.last().close,
            price_change: price_change(series),
            percent_change: percent_change(series)?,
            avg_volume: period_summary(series).avg_volume,
            market_cap: history.market_cap,
        })
    }
}

/// Builds ranking input from a possibly partial set of fetch results.
///
/// Failed fetches and tickers without a defined percent change are dropped;
/// the surviving snapshots keep the input order.
pub fn build_snapshots<E: fmt::Display>(
    fetched: Vec<(String, Result<TickerHistory, E>)>,
) -> Vec<TickerSnapshot> {
    let mut results = Vec::with_capacity(fetched.len());

    for (ticker, outcome) in fetched {
        let history = match outcome {
            Ok(history) => history,
            Err(e) => {
                warn!(%ticker, error = %e, "skipping ticker, no price history");
                continue;
            }
        };
        match TickerSnapshot::from_history(&history) {
            Ok(snapshot) => results.push(snapshot),
            Err(e) => warn!(%ticker, error = %e, "skipping ticker, no usable change"),
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::{assert_close, series_from_closes};

    #[test]
    fn percent_change_uses_first_and_last_close() {
        let series = series_from_closes(&[100.0, 110.0, 90.0, 120.0]);
        assert_close(percent_change(&series).unwrap(), 20.0);
        assert_close(price_change(&series), 20.0);
    }

    #[test]
    fn zero_first_close_is_division_by_zero() {
        let series = series_from_closes(&[0.0, 10.0]);
        assert_eq!(
            percent_change(&series),
            Err(MetricsError::DivisionByZero("percent change"))
        );
        assert_eq!(normalized_performance(&series), None);
    }

    #[test]
    fn normalized_performance_starts_at_100() {
        let series = series_from_closes(&[50.0, 75.0, 25.0]);
        assert_eq!(normalized_performance(&series).unwrap(), vec![100.0, 150.0, 50.0]);
    }

    #[test]
    fn summary_reports_range_and_averages() {
        let series = series_from_closes(&[10.0, 30.0, 20.0]);
        let summary = period_summary(&series);

        assert_close(summary.high, 30.0);
        assert_close(summary.low, 10.0);
        assert_close(summary.avg_close, 20.0);
        assert_close(summary.avg_volume, 1_000.0);
        assert_close(summary.change, 10.0);
        assert_close(summary.percent.unwrap(), 100.0);
    }

    fn history(closes: &[f64], name: &str) -> TickerHistory {
        TickerHistory {
            company_name: name.to_string(),
            market_cap: None,
            series: series_from_closes(closes),
        }
    }

    #[test]
    fn snapshot_takes_last_close_and_mean_volume() {
        let snapshot = TickerSnapshot::from_history(&history(&[100.0, 120.0], "Test Co")).unwrap();
        assert_eq!(snapshot.company_name, "Test Co");
        assert_close(snapshot.current_price, 120.0);
        assert_close(snapshot.percent_change, 20.0);
        assert_close(snapshot.avg_volume, 1_000.0);
    }

    #[test]
    fn partial_input_skips_failures_and_keeps_order() {
        let fetched: Vec<(String, Result<TickerHistory, String>)> = vec![
            ("A".into(), Ok(history(&[1.0, 2.0], "A Corp"))),
            ("B".into(), Err("timeout".into())),
            ("C".into(), Ok(history(&[0.0, 2.0], "C Corp"))),
            ("D".into(), Ok(history(&[4.0, 2.0], "D Corp"))),
        ];
        let snapshots = build_snapshots(fetched);
        let names: Vec<&str> = snapshots.iter().map(|s| s.company_name.as_str()).collect();
        assert_eq!(names, vec!["A Corp", "D Corp"]);
    }
}
