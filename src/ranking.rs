//! Top/bottom selection over ticker snapshots.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::snapshot::TickerSnapshot;

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum SortKey {
    PercentChange,
    PriceChange,
    AvgVolume,
    MarketCap,
    CurrentPrice,
}

impl SortKey {
    /// `None` (or NaN) ranks below every real value.
    pub fn value(&self, snapshot: &TickerSnapshot) -> Option<f64> {
        let raw = match self {
            SortKey::PercentChange => Some(snapshot.percent_change),
            SortKey::PriceChange => Some(snapshot.price_change),
            SortKey::AvgVolume => Some(snapshot.avg_volume),
            SortKey::MarketCap => snapshot.market_cap,
            SortKey::CurrentPrice => Some(snapshot.current_price),
        };
        raw.filter(|v| !v.is_nan())
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::PercentChange => "Change (%)",
            SortKey::PriceChange => "Change",
            SortKey::AvgVolume => "Avg Volume",
            SortKey::MarketCap => "Market Cap",
            SortKey::CurrentPrice => "Price",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn descending(key: SortKey, a: &TickerSnapshot, b: &TickerSnapshot) -> Ordering {
    match (key.value(a), key.value(b)) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Result of one ranking pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    /// Best first.
    pub top: Vec<TickerSnapshot>,
    /// Worst first.
    pub bottom: Vec<TickerSnapshot>,
}

/// Sorts descending by `key` (stable) and slices both ends.
///
/// `bottom` is the last `n` of that order, reversed so the worst comes
/// first. With fewer than `2n` snapshots the two sides overlap.
pub fn top_and_bottom(snapshots: &[TickerSnapshot], key: SortKey, n: usize) -> Ranking {
    let mut sorted: Vec<&TickerSnapshot> = snapshots.iter().collect();
    sorted.sort_by(|a, b| descending(key, a, b));

    let take = n.min(sorted.len());
    Ranking {
        top: sorted[..take].iter().map(|s| (*s).clone()).collect(),
        bottom: sorted[sorted.len() - take..]
            .iter()
            .rev()
            .map(|s| (*s).clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ticker: &str, pct: f64) -> TickerSnapshot {
        TickerSnapshot {
            ticker: ticker.to_string(),
            company_name: format!("{ticker} Inc"),
            current_price: 100.0 + pct,
            price_change: pct,
            percent_change: pct,
            avg_volume: 1_000.0,
            market_cap: None,
        }
    }

    fn tickers(list: &[TickerSnapshot]) -> Vec<&str> {
        list.iter().map(|s| s.ticker.as_str()).collect()
    }

    #[test]
    fn overlapping_top_and_bottom() {
        let snapshots = vec![snap("A", 5.0), snap("B", -3.0), snap("C", 10.0)];
        let ranking = top_and_bottom(&snapshots, SortKey::PercentChange, 2);

        assert_eq!(tickers(&ranking.top), vec!["C", "A"]);
        assert_eq!(tickers(&ranking.bottom), vec!["B", "A"]);
    }

    #[test]
    fn top_dominates_the_rest() {
        let values = [3.0, -1.0, 7.5, 0.0, 2.2, -8.0, 4.4, 1.1];
        let snapshots: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| snap(&format!("T{i}"), *v))
            .collect();
        let ranking = top_and_bottom(&snapshots, SortKey::PercentChange, 3);

        assert_eq!(ranking.top.len(), 3);
        let floor = ranking.top.iter().map(|s| s.percent_change).fold(f64::INFINITY, f64::min);
        let ceiling = ranking.bottom.iter().map(|s| s.percent_change).fold(f64::NEG_INFINITY, f64::max);
        for s in &snapshots {
            if !ranking.top.contains(s) {
                assert!(floor >= s.percent_change);
            }
            if !ranking.bottom.contains(s) {
                assert!(ceiling <= s.percent_change);
            }
        }
    }

    #[test]
    fn ties_keep_input_order() {
        let snapshots = vec![snap("X", 1.0), snap("Y", 1.0), snap("Z", 1.0)];
        let ranking = top_and_bottom(&snapshots, SortKey::PercentChange, 2);
        assert_eq!(tickers(&ranking.top), vec!["X", "Y"]);
    }

    #[test]
    fn missing_market_cap_sorts_last() {
        let mut a = snap("A", 1.0);
        a.market_cap = Some(5e9);
        let b = snap("B", 2.0);
        let mut c = snap("C", 3.0);
        c.market_cap = Some(9e9);
        let ranking = top_and_bottom(&[a, b, c], SortKey::MarketCap, 2);

        assert_eq!(tickers(&ranking.top), vec!["C", "A"]);
        assert_eq!(ranking.bottom[0].ticker, "B");
    }

    #[test]
    fn n_larger_than_input_is_clamped() {
        let ranking = top_and_bottom(&[snap("A", 1.0)], SortKey::AvgVolume, 10);
        assert_eq!(ranking.top.len(), 1);
        assert_eq!(ranking.bottom.len(), 1);
        assert!(top_and_bottom(&[], SortKey::PercentChange, 3).top.is_empty());
    }

    #[test]
    fn sort_key_parses_snake_case() {
        let key: SortKey = serde_json::from_str("\"avg_volume\"").unwrap();
        assert_eq!(key, SortKey::AvgVolume);
        assert_eq!(
            SortKey::from_str("market_cap", true).unwrap(),
            SortKey::MarketCap
        );
    }
}
