use crate::CoreError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A tradable asset that matched a live market search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMatch {
    pub ticker: String,
    pub name: Option<String>,
    pub exchange: String,
}

/// The payload of a live market search.
///
/// Upstream failures are reported in `error` next to an empty result list
/// instead of failing the request, so callers must check it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSearchResponse {
    pub results: Vec<AssetMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssetSearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { results: Vec::new(), error: Some(error.into()) }
    }
}

/// A single OHLCV price bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Every minute bar of one trading day for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinutePrices {
    pub symbol: String,
    pub date: NaiveDate,
    pub total_samples: usize,
    pub data: Vec<Bar>,
}

/// Bar aggregation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeframe {
    Minute,
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl Timeframe {
    /// The value expected by the brokerage `timeframe` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Minute => "1Min",
            Timeframe::Hour => "1Hour",
            Timeframe::Day => "1Day",
            Timeframe::Week => "1Week",
            Timeframe::Month => "1Month",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1min" | "minute" | "min" => Ok(Timeframe::Minute),
            "1hour" | "hour" => Ok(Timeframe::Hour),
            "1day" | "day" => Ok(Timeframe::Day),
            "1week" | "week" => Ok(Timeframe::Week),
            "1month" | "month" => Ok(Timeframe::Month),
            other => Err(CoreError::InvalidInput("timeframe".to_string(), other.to_string())),
        }
    }
}
