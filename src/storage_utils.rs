use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::metrics::MetricsConfig;
use crate::ranking::{DEFAULT_TOP_N, SortKey};
use crate::timeframe::{Interval, Period};

// CONFIGURATION STRUCTS

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Label stored alongside every snapshot, e.g. "SENSEX".
    pub index_name: String,
    /// Symbol -> company name. Ordered so ranking ties are reproducible.
    pub watchlist: BTreeMap<String, String>,
    pub period: Period,
    pub interval: Interval,
    pub top_n: usize,
    pub sort_key: SortKey,
    /// Auto-refresh interval for the dashboard and watch mode.
    pub refresh_secs: u64,
    /// Look-back for the stored-history views.
    pub history_days: i64,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let watchlist = [
            ("RELIANCE.BO", "Reliance Industries"),
            ("TCS.BO", "Tata Consultancy Services"),
            ("INFY.BO", "Infosys"),
            ("HDFCBANK.BO", "HDFC Bank"),
            ("ICICIBANK.BO", "ICICI Bank"),
            ("HINDUNILVR.BO", "Hindustan Unilever"),
            ("BHARTIARTL.BO", "Bharti Airtel"),
            ("SBIN.BO", "State Bank of India"),
            ("KOTAKBANK.BO", "Kotak Mahindra Bank"),
            ("WIPRO.BO", "Wipro"),
            ("ASIANPAINT.BO", "Asian Paints"),
            ("BAJFINANCE.BO", "Bajaj Finance"),
            ("LT.BO", "Larsen & Toubro"),
            ("MARUTI.BO", "Maruti Suzuki"),
            ("NESTLEIND.BO", "Nestle India"),
            ("SUNPHARMA.BO", "Sun Pharma"),
            ("TITAN.BO", "Titan Company"),
            ("AXISBANK.BO", "Axis Bank"),
            ("BAJAJFINSV.BO", "Bajaj Finserv"),
            ("HCLTECH.BO", "HCL Technologies"),
        ]
        .into_iter()
        .map(|(symbol, name)| (symbol.to_string(), name.to_string()))
        .collect();

        Self {
            index_name: "SENSEX".to_string(),
            watchlist,
            period: Period::OneMonth,
            interval: Interval::Daily,
            top_n: DEFAULT_TOP_N,
            sort_key: SortKey::PercentChange,
            refresh_secs: 30,
            history_days: 7,
            metrics: MetricsConfig::default(),
        }
    }
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Storage directory next to the running executable.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new(base_dir).await
    }

    /// Storage rooted at an explicit directory, created if missing.
    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", filename))
    }

    pub async fn exists(&self, filename: &str) -> bool {
        fs::try_exists(self.path_for(filename)).await.unwrap_or(false)
    }

    /// Pretty JSON written to a temp file then renamed over the target.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let final_path = self.path_for(filename);
        let tmp_path = self.base_dir.join(format!("{}.json.tmp", filename));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        // serde_json validates UTF-8 itself
        let content = fs::read(self.path_for(filename)).await?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Loads `config.json`, writing the default one on first run.
    pub async fn load_or_init_config(&self) -> anyhow::Result<AppConfig> {
        if self.exists("config").await {
            return self.load("config").await;
        }
        let config = AppConfig::default();
        self.save("config", &config).await?;
        info!(path = %self.path_for("config").display(), "wrote default config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path().join("nested")).await.unwrap();

        storage.save("numbers", &vec![1, 2, 3]).await.unwrap();
        let back: Vec<i32> = storage.load("numbers").await.unwrap();

        assert_eq!(back, vec![1, 2, 3]);
        assert!(!storage.base_dir.join("numbers.json.tmp").exists());
    }

    #[tokio::test]
    async fn first_run_writes_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();

        let config = storage.load_or_init_config().await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(storage.exists("config").await);

        let reloaded = storage.load_or_init_config().await.unwrap();
        assert_eq!(reloaded.watchlist.len(), 20);
    }

    #[tokio::test]
    async fn missing_metrics_section_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();
        let mut raw = serde_json::to_value(AppConfig::default()).unwrap();
        raw.as_object_mut().unwrap().remove("metrics");
        storage.save("config", &raw).await.unwrap();

        let config: AppConfig = storage.load("config").await.unwrap();
        assert_eq!(config.metrics, MetricsConfig::default());
    }
}
