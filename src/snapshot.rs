use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::timeframe::Period;

/// Cross-ticker ranking input: one ticker reduced to a single point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub ticker: String,
    pub company_name: String,
    pub current_price: f64,
    pub price_change: f64,
    pub percent_change: f64,
    pub avg_volume: f64,
    /// Unknown for most chart-only providers.
    pub market_cap: Option<f64>,
}

/// Exchange grouping derived from the ticker suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketRegion {
    /// National Stock Exchange of India (`.NS`).
    Nse,
    /// Bombay Stock Exchange (`.BO`).
    Bse,
    /// Index symbols such as `^GSPC`.
    Index,
    Us,
}

fn suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<index>\^)?[A-Za-z0-9&\-]+(?:\.(?P<suffix>[A-Za-z]{1,3}))?$")
            .expect("static ticker pattern")
    })
}

impl MarketRegion {
    pub fn from_ticker(ticker: &str) -> Self {
        let Some(caps) = suffix_regex().captures(ticker.trim()) else {
            return MarketRegion::Us;
        };
        if caps.name("index").is_some() {
            return MarketRegion::Index;
        }
        match caps
            .name("suffix")
            .map(|m| m.as_str().to_ascii_uppercase())
            .as_deref()
        {
            Some("NS") => MarketRegion::Nse,
            Some("BO") => MarketRegion::Bse,
            _ => MarketRegion::Us,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegion::Nse => "NSE",
            MarketRegion::Bse => "BSE",
            MarketRegion::Index => "INDEX",
            MarketRegion::Us => "US",
        }
    }
}

impl fmt::Display for MarketRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stored snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreContext {
    pub index_name: String,
    pub time_period: Period,
}

/// A snapshot as written to the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    #[serde(flatten)]
    pub snapshot: TickerSnapshot,
    pub index_name: String,
    pub time_period: Period,
    pub recorded_date: DateTime<Utc>,
    pub market_region: MarketRegion,
}

impl PersistedSnapshot {
    pub fn new(snapshot: TickerSnapshot, context: &StoreContext, recorded_date: DateTime<Utc>) -> Self {
        let market_region = MarketRegion::from_ticker(&snapshot.ticker);
        Self {
            snapshot,
            index_name: context.index_name.clone(),
            time_period: context.time_period,
            recorded_date,
            market_region,
        }
    }
}
