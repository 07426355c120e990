//! Price-history fetches from the Yahoo Finance chart endpoint.

use chrono::DateTime;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::cumulative_price_change::TickerHistory;
use crate::series::{MetricsError, PriceBar, PriceSeries};
use crate::timeframe::{Interval, Period};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
// The endpoint rejects requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) stock-pulse/0.1";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("provider error {code}: {description}")]
    Upstream { code: String, description: String },

    #[error("no price data returned for {0}")]
    NoData(String),

    #[error("invalid series: {0}")]
    Series(#[from] MetricsError),
}

/// Source of price histories keyed by `(ticker, period, interval)`.
pub trait PriceProvider {
    fn fetch(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> impl Future<Output = Result<PriceSeries, ProviderError>> + Send;
}

// --- Response shape ---

#[derive(Deserialize, Debug)]
pub struct ChartResponse {
    chart: ChartBody,
}

#[derive(Deserialize, Debug)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug, Default)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Turns a chart payload into a validated series.
///
/// Rows with any missing OHLC value are dropped; a missing volume counts as zero.
pub fn parse_chart(symbol: &str, response: ChartResponse) -> Result<PriceSeries, ProviderError> {
    if let Some(err) = response.chart.error {
        return Err(ProviderError::Upstream {
            code: err.code,
            description: err.description,
        });
    }
    let result = response
        .chart
        .result
        .and_then(|mut r| (!r.is_empty()).then(|| r.swap_remove(0)))
        .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let field = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();
    let bars: Vec<PriceBar> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            Some(PriceBar {
                timestamp: DateTime::from_timestamp(ts, 0)?,
                open: field(&quote.open, i)?,
                high: field(&quote.high, i)?,
                low: field(&quote.low, i)?,
                close: field(&quote.close, i)?,
                volume: field(&quote.volume, i).unwrap_or(0.0),
            })
        })
        .collect();

    if bars.is_empty() {
        return Err(ProviderError::NoData(symbol.to_string()));
    }
    Ok(PriceSeries::new(symbol, bars)?)
}

#[derive(Clone)]
pub struct YahooChartClient {
    client: Client,
    base_url: String,
}

impl YahooChartClient {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(CHART_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(20)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl PriceProvider for YahooChartClient {
    async fn fetch(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> Result<PriceSeries, ProviderError> {
        let url = format!("{}/{}", self.base_url, symbol);
        let query = [("range", period.as_str()), ("interval", interval.as_str())];

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        // 404 still carries a chart error body worth surfacing
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(ProviderError::Status(status));
        }

        let body: ChartResponse = response.json().await?;
        let series = parse_chart(symbol, body)?;
        debug!(%symbol, bars = series.len(), "fetched price history");
        Ok(series)
    }
}

async fn fetch_one<P: PriceProvider>(
    provider: &P,
    symbol: &str,
    company_name: &str,
    period: Period,
    interval: Interval,
) -> (String, Result<TickerHistory, ProviderError>) {
    let outcome = provider
        .fetch(symbol, period, interval)
        .await
        .map(|series| TickerHistory {
            company_name: company_name.to_string(),
            market_cap: None,
            series,
        });
    (symbol.to_string(), outcome)
}

/// Fetches every watchlist entry concurrently, keeping failures in place.
pub async fn fetch_watchlist<P: PriceProvider>(
    provider: &P,
    watchlist: &BTreeMap<String, String>,
    period: Period,
    interval: Interval,
) -> Vec<(String, Result<TickerHistory, ProviderError>)> {
    let tasks: Vec<_> = watchlist
        .iter()
        .map(|(symbol, name)| fetch_one(provider, symbol, name, period, interval))
        .collect();
    let results = join_all(tasks).await;

    let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
    info!(fetched = ok, requested = watchlist.len(), %period, %interval, "watchlist fetch finished");
    results
}
