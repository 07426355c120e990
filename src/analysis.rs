//! The refresh pipeline shared by every front end.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::cumulative_price_change::build_snapshots;
use crate::history_store::SnapshotStore;
use crate::metrics::{ComparisonRow, MetricsConfig, TickerAnalysis, compare_histories};
use crate::price_history::{PriceProvider, fetch_watchlist};
use crate::ranking::{Ranking, top_and_bottom};
use crate::snapshot::{StoreContext, TickerSnapshot};
use crate::storage_utils::AppConfig;
use crate::timeframe::{Interval, Period};

/// Caller-owned dashboard state, threaded through each refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    pub last_refresh: Option<DateTime<Utc>>,
    pub refresh_count: u64,
    pub snapshots: Vec<TickerSnapshot>,
    pub ranking: Ranking,
    /// Watchlist entries left out of the latest ranking.
    pub skipped: Vec<String>,
    pub last_store_error: Option<String>,
}

/// Runs one fetch -> snapshot -> rank -> store pass.
///
/// Per-ticker failures shrink the ranking instead of failing the pass, and
/// a failing store only records a warning.
pub async fn refresh<P, S>(
    state: RefreshState,
    config: &AppConfig,
    provider: &P,
    store: Option<&S>,
) -> RefreshState
where
    P: PriceProvider,
    S: SnapshotStore,
{
    info!(tickers = config.watchlist.len(), period = %config.period, "refreshing");

    let fetched = fetch_watchlist(provider, &config.watchlist, config.period, config.interval).await;
    let snapshots = build_snapshots(fetched);
    let ranking = top_and_bottom(&snapshots, config.sort_key, config.top_n);

    let skipped = config
        .watchlist
        .keys()
        .filter(|symbol| !snapshots.iter().any(|s| &s.ticker == *symbol))
        .cloned()
        .collect();

    let last_store_error = match store {
        Some(store) => store_best_effort(store, &snapshots, config).await,
        None => None,
    };

    RefreshState {
        last_refresh: Some(Utc::now()),
        refresh_count: state.refresh_count + 1,
        snapshots,
        ranking,
        skipped,
        last_store_error,
    }
}

async fn store_best_effort<S: SnapshotStore>(
    store: &S,
    snapshots: &[TickerSnapshot],
    config: &AppConfig,
) -> Option<String> {
    if snapshots.is_empty() {
        return None;
    }
    let context = StoreContext {
        index_name: config.index_name.clone(),
        time_period: config.period,
    };
    match store.store(snapshots, &context).await {
        Ok(count) => {
            info!(count, index = %context.index_name, "stored snapshots");
            None
        }
        Err(e) => {
            warn!(error = %e, "failed to store snapshots");
            Some(e.to_string())
        }
    }
}

/// Fetches one ticker and computes its full indicator set.
pub async fn analyze_ticker<P: PriceProvider>(
    provider: &P,
    symbol: &str,
    period: Period,
    interval: Interval,
    metrics: &MetricsConfig,
) -> Result<TickerAnalysis> {
    let series = provider.fetch(symbol, period, interval).await?;
    let analysis = TickerAnalysis::compute(&series, metrics)?;
    Ok(analysis)
}

/// Fetches the watchlist and lines the tickers up for side-by-side comparison.
pub async fn compare_watchlist<P: PriceProvider>(
    config: &AppConfig,
    provider: &P,
) -> Vec<ComparisonRow> {
    let fetched = fetch_watchlist(provider, &config.watchlist, config.period, config.interval).await;
    let rows = compare_histories(fetched, &config.metrics);
    info!(compared = rows.len(), requested = config.watchlist.len(), "comparison ready");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history_store::JsonSnapshotStore;
    use crate::price_history::ProviderError;
    use crate::series::test_support::series_from_closes;
    use crate::series::PriceSeries;
    use crate::storage_utils::AsyncStorageManager;
    use std::collections::{BTreeMap, HashMap};

    struct FakeProvider {
        closes: HashMap<String, Vec<f64>>,
    }

    impl PriceProvider for FakeProvider {
        async fn fetch(
            &self,
            symbol: &str,
            _period: Period,
            _interval: Interval,
        ) -> Result<PriceSeries, ProviderError> {
            let closes = self
                .closes
                .get(symbol)
                .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;
            let series = series_from_closes(closes);
            Ok(PriceSeries::new(symbol, series.bars().to_vec())?)
        }
    }

    fn config(symbols: &[&str]) -> AppConfig {
        AppConfig {
            watchlist: symbols
                .iter()
                .map(|s| (s.to_string(), format!("{s} Ltd")))
                .collect::<BTreeMap<_, _>>(),
            top_n: 2,
            ..AppConfig::default()
        }
    }

    fn provider() -> FakeProvider {
        FakeProvider {
            closes: HashMap::from([
                ("A".to_string(), vec![100.0, 105.0]),
                ("B".to_string(), vec![100.0, 97.0]),
                ("C".to_string(), vec![100.0, 110.0]),
                ("Z".to_string(), vec![0.0, 1.0]),
            ]),
        }
    }

    #[tokio::test]
    async fn refresh_ranks_available_tickers() {
        let config = config(&["A", "B", "C", "MISSING", "Z"]);
        let state = refresh::<_, JsonSnapshotStore>(RefreshState::default(), &config, &provider(), None).await;

        let top: Vec<_> = state.ranking.top.iter().map(|s| s.ticker.as_str()).collect();
        let bottom: Vec<_> = state.ranking.bottom.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(top, vec!["C", "A"]);
        assert_eq!(bottom, vec!["B", "A"]);
        assert_eq!(state.skipped, vec!["MISSING".to_string(), "Z".to_string()]);
        assert_eq!(state.refresh_count, 1);
        assert!(state.last_refresh.is_some());
    }

    #[tokio::test]
    async fn refresh_persists_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(AsyncStorageManager::new(dir.path()).await.unwrap());
        let config = config(&["A", "B"]);

        let state = refresh(RefreshState::default(), &config, &provider(), Some(&store)).await;
        let state = refresh(state, &config, &provider(), Some(&store)).await;

        assert_eq!(state.refresh_count, 2);
        assert_eq!(state.last_store_error, None);
        assert_eq!(store.query_recent("A", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_does_not_block_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();
        // a directory where the history file should be makes every save fail
        std::fs::create_dir(storage.path_for("snapshot_history")).unwrap();
        let store = JsonSnapshotStore::new(storage);

        let state = refresh(RefreshState::default(), &config(&["A"]), &provider(), Some(&store)).await;
        assert_eq!(state.ranking.top.len(), 1);
        assert!(state.last_store_error.is_some());
    }

    #[tokio::test]
    async fn analyze_ticker_computes_metrics() {
        let analysis = analyze_ticker(
            &provider(),
            "A",
            Period::OneMonth,
            Interval::Daily,
            &MetricsConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(analysis.derived.len(), 2);
        assert!(analyze_ticker(&provider(), "NOPE", Period::OneMonth, Interval::Daily, &MetricsConfig::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn comparison_covers_fetched_tickers() {
        let rows = compare_watchlist(&config(&["A", "B", "MISSING"]), &provider()).await;
        let mut tickers: Vec<_> = rows.iter().map(|r| r.ticker.as_str()).collect();
        tickers.sort();
        assert_eq!(tickers, vec!["A", "B"]);
        let a = rows.iter().find(|r| r.ticker == "A").unwrap();
        assert!((a.final_performance().unwrap() - 105.0).abs() < 1e-9);
    }
}
