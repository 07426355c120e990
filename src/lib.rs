pub mod analysis;
pub mod comfy_table;
pub mod cumulative_price_change;
pub mod distribution;
pub mod history_store;
pub mod indicators;
pub mod metrics;
pub mod price_history;
pub mod ranking;
pub mod series;
pub mod snapshot;
pub mod storage_utils;
pub mod timeframe;
pub mod tui;
