//! Snapshot history: the persistence side channel behind the historical views.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

use crate::snapshot::{PersistedSnapshot, StoreContext, TickerSnapshot};
use crate::storage_utils::AsyncStorageManager;

const HISTORY_FILE: &str = "snapshot_history";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSign {
    Positive,
    Negative,
}

impl ChangeSign {
    fn matches(&self, percent_change: f64) -> bool {
        match self {
            ChangeSign::Positive => percent_change > 0.0,
            ChangeSign::Negative => percent_change < 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Best,
    Worst,
}

/// How often a ticker showed up with a given sign of change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyRow {
    pub ticker: String,
    pub appearances: usize,
    pub mean_percent_change: f64,
}

/// Per-ticker averages over the history window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformerHistoryRow {
    pub ticker: String,
    pub mean_percent_change: f64,
    pub last_price: f64,
    pub mean_volume: f64,
}

/// Operations the dashboard needs from a snapshot store.
pub trait SnapshotStore {
    /// Replaces every record for `(index_name, time_period)` with `snapshots`.
    fn store(
        &self,
        snapshots: &[TickerSnapshot],
        context: &StoreContext,
    ) -> impl Future<Output = anyhow::Result<usize>> + Send;

    /// Newest first.
    fn query_recent(
        &self,
        ticker: &str,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<PersistedSnapshot>>> + Send;

    fn query_aggregate_by_frequency(
        &self,
        sign: ChangeSign,
        since_days: i64,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<FrequencyRow>>> + Send;

    fn query_performers_history(
        &self,
        since_days: i64,
        limit: usize,
        direction: Direction,
    ) -> impl Future<Output = anyhow::Result<Vec<PerformerHistoryRow>>> + Send;
}

/// Store backed by a single JSON file in the storage directory.
pub struct JsonSnapshotStore {
    storage: AsyncStorageManager,
    // serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl JsonSnapshotStore {
    pub fn new(storage: AsyncStorageManager) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> anyhow::Result<Vec<PersistedSnapshot>> {
        if !self.storage.exists(HISTORY_FILE).await {
            return Ok(Vec::new());
        }
        self.storage.load(HISTORY_FILE).await
    }

    /// Replaces matching records using an explicit timestamp.
    pub async fn store_at(
        &self,
        snapshots: &[TickerSnapshot],
        context: &StoreContext,
        recorded_date: DateTime<Utc>,
    ) -> anyhow::Result<usize> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;

        let before = records.len();
        records.retain(|r| {
            !(r.index_name == context.index_name && r.time_period == context.time_period)
        });
        debug!(
            removed = before - records.len(),
            index = %context.index_name,
            period = %context.time_period,
            "replacing stored snapshots"
        );

        records.extend(
            snapshots
                .iter()
                .cloned()
                .map(|s| PersistedSnapshot::new(s, context, recorded_date)),
        );
        self.storage.save(HISTORY_FILE, &records).await?;
        Ok(snapshots.len())
    }
}

impl SnapshotStore for JsonSnapshotStore {
    async fn store(
        &self,
        snapshots: &[TickerSnapshot],
        context: &StoreContext,
    ) -> anyhow::Result<usize> {
        self.store_at(snapshots, context, Utc::now()).await
    }

    async fn query_recent(
        &self,
        ticker: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<PersistedSnapshot>> {
        let records = self.read_all().await?;
        Ok(recent_for_ticker(records, ticker, limit))
    }

    async fn query_aggregate_by_frequency(
        &self,
        sign: ChangeSign,
        since_days: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<FrequencyRow>> {
        let records = self.read_all().await?;
        let since = window_start(Utc::now(), since_days);
        Ok(aggregate_by_frequency(&records, sign, since, limit))
    }

    async fn query_performers_history(
        &self,
        since_days: i64,
        limit: usize,
        direction: Direction,
    ) -> anyhow::Result<Vec<PerformerHistoryRow>> {
        let records = self.read_all().await?;
        let since = window_start(Utc::now(), since_days);
        Ok(performers_history(&records, since, limit, direction))
    }
}

/// Start of a look-back of `since_days` ending at `now`.
///
/// Negative look-backs count as zero; spans past chrono's range reach back to
/// the earliest representable time.
pub fn window_start(now: DateTime<Utc>, since_days: i64) -> DateTime<Utc> {
    Duration::try_days(since_days.max(0))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn recent_for_ticker(
    records: Vec<PersistedSnapshot>,
    ticker: &str,
    limit: usize,
) -> Vec<PersistedSnapshot> {
    let mut matching: Vec<_> = records
        .into_iter()
        .filter(|r| r.snapshot.ticker == ticker)
        .collect();
    matching.sort_by(|a, b| b.recorded_date.cmp(&a.recorded_date));
    matching.truncate(limit);
    matching
}

pub fn aggregate_by_frequency(
    records: &[PersistedSnapshot],
    sign: ChangeSign,
    since: DateTime<Utc>,
    limit: usize,
) -> Vec<FrequencyRow> {
    let mut groups: HashMap<&str, (usize, f64)> = HashMap::new();
    for r in records
        .iter()
        .filter(|r| r.recorded_date >= since && sign.matches(r.snapshot.percent_change))
    {
        let entry = groups.entry(r.snapshot.ticker.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += r.snapshot.percent_change;
    }

    let mut rows: Vec<FrequencyRow> = groups
        .into_iter()
        .map(|(ticker, (count, sum))| FrequencyRow {
            ticker: ticker.to_string(),
            appearances: count,
            mean_percent_change: sum / count as f64,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.appearances
            .cmp(&a.appearances)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    rows.truncate(limit);
    rows
}

pub fn performers_history(
    records: &[PersistedSnapshot],
    since: DateTime<Utc>,
    limit: usize,
    direction: Direction,
) -> Vec<PerformerHistoryRow> {
    struct Acc<'a> {
        count: usize,
        pct_sum: f64,
        volume_sum: f64,
        latest: &'a PersistedSnapshot,
    }

    let mut groups: HashMap<&str, Acc> = HashMap::new();
    for r in records.iter().filter(|r| r.recorded_date >= since) {
        let acc = groups.entry(r.snapshot.ticker.as_str()).or_insert(Acc {
            count: 0,
            pct_sum: 0.0,
            volume_sum: 0.0,
            latest: r,
        });
        acc.count += 1;
        acc.pct_sum += r.snapshot.percent_change;
        acc.volume_sum += r.snapshot.avg_volume;
        if r.recorded_date >= acc.latest.recorded_date {
            acc.latest = r;
        }
    }

    let mut rows: Vec<PerformerHistoryRow> = groups
        .into_iter()
        .map(|(ticker, acc)| PerformerHistoryRow {
            ticker: ticker.to_string(),
            mean_percent_change: acc.pct_sum / acc.count as f64,
            last_price: acc.latest.snapshot.current_price,
            mean_volume: acc.volume_sum / acc.count as f64,
        })
        .collect();
    rows.sort_by(|a, b| {
        let ord = match direction {
            Direction::Best => b.mean_percent_change.total_cmp(&a.mean_percent_change),
            Direction::Worst => a.mean_percent_change.total_cmp(&b.mean_percent_change),
        };
        ord.then_with(|| a.ticker.cmp(&b.ticker))
    });
    rows.truncate(limit);
    rows
}
