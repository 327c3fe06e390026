use serde::{Deserialize, Serialize};

/// A row of the local `tickers` cache table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub id: i64,
    pub ticker: String,
    pub company_name: Option<String>,
    pub exchange: Option<String>,
}

/// A ticker that has not been stored yet. This is the shape produced by the
/// market data listing and consumed by the bulk insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicker {
    pub ticker: String,
    pub company_name: Option<String>,
    pub exchange: Option<String>,
}

impl NewTicker {
    pub fn new(ticker: impl Into<String>, company_name: Option<&str>, exchange: Option<&str>) -> Self {
        Self {
            ticker: ticker.into(),
            company_name: company_name.map(str::to_string),
            exchange: exchange.map(str::to_string),
        }
    }
}
