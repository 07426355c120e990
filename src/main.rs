use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stock_pulse::analysis::{self, RefreshState};
use stock_pulse::comfy_table::{
    render_analysis, render_comparison, render_frequency, render_performers, render_ranking,
    render_recent,
};
use stock_pulse::history_store::{ChangeSign, Direction, JsonSnapshotStore, SnapshotStore};
use stock_pulse::price_history::YahooChartClient;
use stock_pulse::ranking::SortKey;
use stock_pulse::storage_utils::{AppConfig, AsyncStorageManager};
use stock_pulse::timeframe::{Interval, Period};
use stock_pulse::tui;

const LOG_FILE: &str = "stock-pulse.log";

#[derive(Parser, Debug)]
#[command(name = "stock-pulse", version, about = "Watchlist movers, indicators and stored history")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Look-back range (overrides config)
    #[arg(long, global = true)]
    period: Option<Period>,

    /// Bar spacing (overrides config)
    #[arg(long, global = true)]
    interval: Option<Interval>,

    /// Rows in each of the top and bottom lists
    #[arg(long, global = true)]
    top_n: Option<usize>,

    #[arg(long, global = true)]
    sort_key: Option<SortKey>,

    /// Directory holding config.json and the snapshot history
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive dashboard (default)
    Tui,
    /// One refresh, printed as tables
    Rank,
    /// Indicator breakdown for one ticker
    Analyze {
        ticker: String,
        /// Most recent bars to show
        #[arg(long, default_value_t = 10)]
        rows: usize,
    },
    /// Best/worst performers from stored snapshots
    History {
        #[arg(long)]
        days: Option<i64>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Side-by-side performance, volatility and volume for the watchlist
    Compare,
    /// Reprint the ranking on every refresh tick
    Watch,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(period) = self.period {
            config.period = period;
        }
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if let Some(top_n) = self.top_n {
            config.top_n = top_n;
        }
        if let Some(sort_key) = self.sort_key {
            config.sort_key = sort_key;
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// The dashboard owns the terminal, so its logs go to a file.
fn init_file_logging(dir: &Path) -> Result<()> {
    let path = dir.join(LOG_FILE);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Command::Tui);

    let storage = match &cli.storage_dir {
        Some(dir) => AsyncStorageManager::new(dir.clone()).await?,
        None => AsyncStorageManager::new_relative("storage").await?,
    };

    if matches!(command, Command::Tui) {
        init_file_logging(&storage.base_dir)?;
    } else {
        init_stderr_logging();
    }

    let mut config = storage.load_or_init_config().await?;
    cli.apply_overrides(&mut config);

    let store = JsonSnapshotStore::new(AsyncStorageManager::new(storage.base_dir.clone()).await?);
    let provider = YahooChartClient::new()?;

    match &command {
        Command::Tui => {
            tui::run_tui(config, Arc::new(provider), Arc::new(store)).await?;
        }
        Command::Rank => {
            let state = analysis::refresh(RefreshState::default(), &config, &provider, Some(&store)).await;
            println!("{}", render_ranking(&state, config.sort_key));
        }
        Command::Analyze { ticker, rows } => {
            let result = analysis::analyze_ticker(
                &provider,
                ticker,
                config.period,
                config.interval,
                &config.metrics,
            )
            .await
            .with_context(|| format!("analyzing {ticker}"))?;
            println!("{}", render_analysis(ticker, &result, *rows));

            let recent = store.query_recent(ticker, *rows).await?;
            if !recent.is_empty() {
                println!("\nStored snapshots\n{}", render_recent(&recent));
            }
        }
        Command::History { days, limit } => {
            let days = days.unwrap_or(config.history_days);
            let best = store.query_performers_history(days, *limit, Direction::Best).await?;
            let worst = store.query_performers_history(days, *limit, Direction::Worst).await?;
            let gainers = store
                .query_aggregate_by_frequency(ChangeSign::Positive, days, *limit)
                .await?;
            let losers = store
                .query_aggregate_by_frequency(ChangeSign::Negative, days, *limit)
                .await?;

            println!("{}", render_performers(&format!("Best performers, last {days} days"), &best));
            println!("{}", render_performers(&format!("Worst performers, last {days} days"), &worst));
            println!("{}", render_frequency("Most often up", &gainers));
            println!("{}", render_frequency("Most often down", &losers));
        }
        Command::Compare => {
            let rows = analysis::compare_watchlist(&config, &provider).await;
            println!("{}", render_comparison(&rows));
        }
        Command::Watch => watch(&config, &provider, &store).await?,
    }

    Ok(())
}

async fn watch(config: &AppConfig, provider: &YahooChartClient, store: &JsonSnapshotStore) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.refresh_secs.max(1)));
    let mut state = RefreshState::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("watch stopped");
                return Ok(());
            }
        }
        state = analysis::refresh(state, config, provider, Some(store)).await;
        clearscreen::clear()?;
        println!("{}", render_ranking(&state, config.sort_key));
        println!("Refreshing every {}s, Ctrl+C to stop", config.refresh_secs);
    }
}
