use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Look-back window requested from the market-data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Period {
    #[serde(rename = "1d")]
    #[value(name = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    #[value(name = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    #[value(name = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    #[value(name = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    #[value(name = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    #[value(name = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    #[value(name = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    #[value(name = "5y")]
    FiveYears,
    #[serde(rename = "ytd")]
    #[value(name = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    #[value(name = "max")]
    Max,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
            Period::YearToDate => "ytd",
            Period::Max => "max",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bar width within a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Interval {
    #[serde(rename = "1d")]
    #[value(name = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    #[value(name = "1wk")]
    Weekly,
    #[serde(rename = "1mo")]
    #[value(name = "1mo")]
    Monthly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_names_match_provider_parameters() {
        let period: Period = serde_json::from_str("\"ytd\"").unwrap();
        assert_eq!(period, Period::YearToDate);
        assert_eq!(serde_json::to_string(&Interval::Weekly).unwrap(), "\"1wk\"");
        assert_eq!(Period::ThreeMonths.to_string(), "3mo");
    }
}
