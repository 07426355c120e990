//! Price bars and the validated series every metric is computed over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the metrics and ranking computations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricsError {
    #[error("price series is empty")]
    EmptySeries,

    /// Timestamps must be strictly increasing.
    #[error("timestamp at index {index} is not after the previous bar")]
    MalformedSeries { index: usize },

    #[error("division by zero while computing {0}")]
    DivisionByZero(&'static str),

    #[error("invalid window {window} for {indicator}")]
    InvalidWindow {
        indicator: &'static str,
        window: usize,
    },
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// One OHLCV observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Chronological, duplicate-free bars for one ticker. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Validates ordering before any indicator sees the data.
    pub fn new(symbol: impl Into<String>, bars: Vec<PriceBar>) -> MetricsResult<Self> {
        if bars.is_empty() {
            return Err(MetricsError::EmptySeries);
        }
        if let Some(pos) = bars
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(MetricsError::MalformedSeries { index: pos + 1 });
        }
        Ok(Self {
            symbol: symbol.into(),
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> &PriceBar {
        &self.bars[0]
    }

    pub fn last(&self) -> &PriceBar {
        &self.bars[self.bars.len() - 1]
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// Daily bars with flat OHLC around each close and a fixed volume.
    pub fn series_from_closes(closes: &[f64]) -> PriceSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 86_400, 0).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000.0,
            })
            .collect();
        PriceSeries::new("TEST", bars).unwrap()
    }

    pub fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(ts: i64, close: f64) -> PriceBar {
        PriceBar {
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn rejects_empty_series() {
        assert_eq!(
            PriceSeries::new("X", Vec::new()),
            Err(MetricsError::EmptySeries)
        );
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        let bars = vec![bar(1, 1.0), bar(2, 2.0), bar(2, 3.0)];
        assert_eq!(
            PriceSeries::new("X", bars),
            Err(MetricsError::MalformedSeries { index: 2 })
        );
    }

    #[test]
    fn rejects_out_of_order_timestamps() {
        let bars = vec![bar(5, 1.0), bar(3, 2.0)];
        assert_eq!(
            PriceSeries::new("X", bars),
            Err(MetricsError::MalformedSeries { index: 1 })
        );
    }

    #[test]
    fn accepts_single_bar() {
        let series = PriceSeries::new("X", vec![bar(1, 42.0)]).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.first(), series.last());
        assert_eq!(series.closes(), vec![42.0]);
    }
}
