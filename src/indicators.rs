//! Technical indicators over a [`PriceSeries`].
//!
//! Every function returns one entry per bar. Entries that need more
//! look-back than is available are `None`; that is a partial result, not
//! an error.

use serde::Serialize;
use ta::Next;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, SimpleMovingAverage,
};

use crate::series::{MetricsError, MetricsResult, PriceSeries};

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const DEFAULT_RSI_PERIOD: usize = 14;
pub const DEFAULT_BOLLINGER_WINDOW: usize = 20;
pub const DEFAULT_BOLLINGER_STD: f64 = 2.0;

fn check_window(indicator: &'static str, window: usize, min: usize) -> MetricsResult<()> {
    if window < min {
        return Err(MetricsError::InvalidWindow { indicator, window });
    }
    Ok(())
}

/// Applies `f` to every full window of `values`, leaving the warm-up prefix empty.
fn rolling<F>(values: &[f64], window: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                Some(f(&values[i + 1 - window..=i]))
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Arithmetic mean of the trailing `window` closes.
pub fn simple_moving_average(
    series: &PriceSeries,
    window: usize,
) -> MetricsResult<Vec<Option<f64>>> {
    check_window("sma", window, 1)?;
    let mut sma = SimpleMovingAverage::new(window)
        .map_err(|_| MetricsError::InvalidWindow { indicator: "sma", window })?;

    Ok(series
        .bars()
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            // `ta` averages over a partial window during warm-up; discard those.
            let value = sma.next(bar.close);
            (i + 1 >= window).then_some(value)
        })
        .collect())
}

/// EMA seeded at the first close with `k = 2 / (span + 1)`. Defined at every index.
pub fn exponential_moving_average(series: &PriceSeries, span: usize) -> MetricsResult<Vec<f64>> {
    check_window("ema", span, 1)?;
    let mut ema = ExponentialMovingAverage::new(span)
        .map_err(|_| MetricsError::InvalidWindow { indicator: "ema", window: span })?;
    Ok(series.bars().iter().map(|bar| ema.next(bar.close)).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD(12, 26, 9): EMA12 - EMA26, a 9-span EMA of that line, and their difference.
pub fn macd(series: &PriceSeries) -> MetricsResult<Vec<MacdPoint>> {
    let mut indicator = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
        .map_err(|_| MetricsError::InvalidWindow {
            indicator: "macd",
            window: MACD_SLOW,
        })?;

    Ok(series
        .bars()
        .iter()
        .map(|bar| {
            let out = indicator.next(bar.close);
            MacdPoint {
                macd: out.macd,
                signal: out.signal,
                histogram: out.histogram,
            }
        })
        .collect())
}

/// RSI with simple rolling means of gains and losses.
///
/// The first bar has no predecessor and contributes a zero gain and loss,
/// so the first value appears at index `period - 1`. A window without
/// losses yields exactly 100.
pub fn rsi(series: &PriceSeries, period: usize) -> MetricsResult<Vec<Option<f64>>> {
    check_window("rsi", period, 1)?;
    let closes = series.closes();

    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    gains.push(0.0);
    losses.push(0.0);
    for pair in closes.windows(2) {
        let delta = pair[1] - pair[0];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    let avg_gain = rolling(&gains, period, mean);
    let avg_loss = rolling(&losses, period, mean);

    Ok(avg_gain
        .into_iter()
        .zip(avg_loss)
        .map(|(gain, loss)| match (gain, loss) {
            (Some(_), Some(loss)) if loss == 0.0 => Some(100.0),
            (Some(gain), Some(loss)) => Some(100.0 - 100.0 / (1.0 + gain / loss)),
            _ => None,
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BollingerPoint {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerPoint {
    /// Band width relative to the middle band.
    pub fn bandwidth(&self) -> Option<f64> {
        (self.middle != 0.0).then(|| (self.upper - self.lower) / self.middle)
    }
}

/// Bollinger Bands around an SMA using the sample standard deviation of closes.
pub fn bollinger_bands(
    series: &PriceSeries,
    window: usize,
    num_std: f64,
) -> MetricsResult<Vec<Option<BollingerPoint>>> {
    // Sample std needs at least two observations.
    check_window("bollinger", window, 2)?;
    let closes = series.closes();

    Ok((0..closes.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &closes[i + 1 - window..=i];
            let middle = mean(slice);
            let width = num_std * sample_std(slice);
            Some(BollingerPoint {
                upper: middle + width,
                middle,
                lower: middle - width,
            })
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrossDirection {
    /// Short average moved above the long one.
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Crossover {
    pub index: usize,
    pub direction: CrossDirection,
}

/// Points where `short - long` changes sign between consecutive defined indices.
pub fn ma_crossovers(short: &[Option<f64>], long: &[Option<f64>]) -> Vec<Crossover> {
    let mut crossings = Vec::new();
    let mut prev_above: Option<bool> = None;

    for (index, (s, l)) in short.iter().zip(long).enumerate() {
        let (Some(s), Some(l)) = (s, l) else {
            continue;
        };
        let above = s > l;
        if prev_above.is_some_and(|was_above| was_above != above) {
            crossings.push(Crossover {
                index,
                direction: if above {
                    CrossDirection::Bullish
                } else {
                    CrossDirection::Bearish
                },
            });
        }
        prev_above = Some(above);
    }
    crossings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RsiZone {
    Overbought,
    Bullish,
    Neutral,
    Bearish,
    Oversold,
}

impl RsiZone {
    pub fn classify(rsi: f64) -> Self {
        if rsi >= 70.0 {
            RsiZone::Overbought
        } else if rsi <= 30.0 {
            RsiZone::Oversold
        } else if rsi < 45.0 {
            RsiZone::Bearish
        } else if rsi < 55.0 {
            RsiZone::Neutral
        } else {
            RsiZone::Bullish
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RsiZone::Overbought => "Overbought",
            RsiZone::Bullish => "Bullish",
            RsiZone::Neutral => "Neutral",
            RsiZone::Bearish => "Bearish",
            RsiZone::Oversold => "Oversold",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::{assert_close, series_from_closes};

    #[test]
    fn sma_is_undefined_during_warm_up() {
        let closes: Vec<f64> = (10..=20).map(f64::from).collect();
        let series = series_from_closes(&closes);
        let sma = simple_moving_average(&series, 5).unwrap();

        assert!(sma[..4].iter().all(Option::is_none));
        assert_eq!(sma[3], None);
        assert_close(sma[10].unwrap(), 18.0);
        for i in 4..closes.len() {
            let expected = closes[i - 4..=i].iter().sum::<f64>() / 5.0;
            assert_close(sma[i].unwrap(), expected);
        }
    }

    #[test]
    fn sma_rejects_zero_window() {
        let series = series_from_closes(&[1.0, 2.0]);
        assert!(matches!(
            simple_moving_average(&series, 0),
            Err(MetricsError::InvalidWindow { window: 0, .. })
        ));
    }

    #[test]
    fn ema_seeds_at_first_close() {
        let series = series_from_closes(&[10.0, 20.0, 30.0]);
        let ema = exponential_moving_average(&series, 3).unwrap();

        assert_eq!(ema.len(), 3);
        assert_close(ema[0], 10.0);
        // k = 0.5
        assert_close(ema[1], 15.0);
        assert_close(ema[2], 22.5);
    }

    #[test]
    fn macd_is_fast_minus_slow_ema() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let series = series_from_closes(&closes);
        let fast = exponential_moving_average(&series, MACD_FAST).unwrap();
        let slow = exponential_moving_average(&series, MACD_SLOW).unwrap();
        let points = macd(&series).unwrap();

        assert_close(points[0].macd, 0.0);
        for (i, point) in points.iter().enumerate() {
            assert!((point.macd - (fast[i] - slow[i])).abs() < 1e-9);
            assert!((point.histogram - (point.macd - point.signal)).abs() < 1e-9);
        }
    }

    #[test]
    fn rsi_is_100_for_gains_only() {
        let closes: Vec<f64> = (1..=20).map(f64::from).collect();
        let series = series_from_closes(&closes);
        let values = rsi(&series, DEFAULT_RSI_PERIOD).unwrap();

        assert!(values[..13].iter().all(Option::is_none));
        assert_eq!(values[13], Some(100.0));
        assert_eq!(values[19], Some(100.0));
    }

    #[test]
    fn rsi_stays_within_bounds() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 50.0 + (i as f64 * 1.3).sin() * 8.0 + (i as f64 * 0.2).cos() * 3.0)
            .collect();
        let series = series_from_closes(&closes);
        let values = rsi(&series, DEFAULT_RSI_PERIOD).unwrap();

        for value in values.into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value), "rsi out of range: {value}");
        }
    }

    #[test]
    fn rsi_matches_hand_computed_value() {
        // gains: 0, 2, 0, 1 ; losses: 0, 0, 1, 0
        let series = series_from_closes(&[10.0, 12.0, 11.0, 12.0]);
        let values = rsi(&series, 4).unwrap();
        // avg gain 0.75, avg loss 0.25, rs 3
        assert_close(values[3].unwrap(), 75.0);
    }

    #[test]
    fn bollinger_bands_bracket_the_middle() {
        let closes: Vec<f64> = (0..45).map(|i| 20.0 + (i as f64 * 0.9).sin() * 2.0).collect();
        let series = series_from_closes(&closes);
        let bands = bollinger_bands(&series, DEFAULT_BOLLINGER_WINDOW, DEFAULT_BOLLINGER_STD).unwrap();

        assert!(bands[..19].iter().all(Option::is_none));
        for point in bands.iter().flatten() {
            assert!(point.lower <= point.middle && point.middle <= point.upper);
        }
    }

    #[test]
    fn bollinger_uses_sample_std() {
        let series = series_from_closes(&[1.0, 2.0, 3.0]);
        let bands = bollinger_bands(&series, 3, 2.0).unwrap();
        let point = bands[2].unwrap();
        // sample std of 1,2,3 is 1
        assert_close(point.middle, 2.0);
        assert_close(point.upper, 4.0);
        assert_close(point.lower, 0.0);
        assert_close(point.bandwidth().unwrap(), 2.0);
    }

    #[test]
    fn crossovers_flag_sign_changes() {
        let short = [None, Some(1.0), Some(3.0), Some(4.0), Some(1.0)];
        let long = [None, Some(2.0), Some(2.0), Some(2.0), Some(2.0)];
        let crossings = ma_crossovers(&short, &long);

        assert_eq!(
            crossings,
            vec![
                Crossover { index: 2, direction: CrossDirection::Bullish },
                Crossover { index: 4, direction: CrossDirection::Bearish },
            ]
        );
    }

    #[test]
    fn rsi_zone_boundaries() {
        assert_eq!(RsiZone::classify(70.0), RsiZone::Overbought);
        assert_eq!(RsiZone::classify(30.0), RsiZone::Oversold);
        assert_eq!(RsiZone::classify(44.9), RsiZone::Bearish);
        assert_eq!(RsiZone::classify(45.0), RsiZone::Neutral);
        assert_eq!(RsiZone::classify(55.0), RsiZone::Bullish);
    }
}
