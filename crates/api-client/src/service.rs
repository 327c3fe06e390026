use crate::error::ApiError;
use crate::{AssetResponse, MarketDataClient};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use core_types::{AssetMatch, AssetSearchResponse, Bar, MinutePrices, NewTicker, Timeframe};
use std::sync::Arc;

/// Number of matches returned by a live search when no limit is given.
pub const DEFAULT_MARKET_SEARCH_LIMIT: usize = 10;

// Window used for historical bars when the caller does not give a start date.
const DEFAULT_HISTORY_DAYS: i64 = 30;

/// The market data gateway used by the rest of the application.
///
/// It is built once at startup and shared; the wrapped client holds the
/// connection pool and credentials.
#[derive(Clone)]
pub struct MarketDataService {
    client: Arc<dyn MarketDataClient>,
}

impl MarketDataService {
    pub fn new(client: Arc<dyn MarketDataClient>) -> Self {
        Self { client }
    }

    /// Lists every asset in the universe as a ticker ready for the local cache.
    pub async fn list_all_tickers(&self) -> Result<Vec<NewTicker>, ApiError> {
        let assets = self.client.get_all_assets().await?;
        Ok(assets.iter().map(AssetResponse::to_new_ticker).collect())
    }

    /// Live search over the full asset universe, fetched fresh on every call.
    ///
    /// Both sides are upper-cased, so matching is case-insensitive. Upstream
    /// failures are reported in the `error` field of an empty response rather
    /// than returned as an `Err`.
    pub async fn search(&self, query: &str, limit: usize) -> AssetSearchResponse {
        let query = query.trim().to_uppercase();
        if query.is_empty() {
            return AssetSearchResponse::empty();
        }

        match self.client.get_all_assets().await {
            Ok(assets) => AssetSearchResponse {
                results: filter_assets(&assets, &query, limit),
                error: None,
            },
            Err(e) => {
                tracing::error!(error = %e, query = %query, "Error fetching assets from Alpaca.");
                AssetSearchResponse::failed(e.to_string())
            }
        }
    }

    /// Bars for `symbol`. Without a range this covers the last 30 days.
    pub async fn historical_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, ApiError> {
        let end = end.unwrap_or_else(Utc::now);
        let start = start.unwrap_or_else(|| end - Duration::days(DEFAULT_HISTORY_DAYS));
        self.client
            .get_stock_bars(&normalize_symbol(symbol)?, timeframe, start, end)
            .await
    }

    /// Every minute bar of `date` (UTC) for `symbol`.
    pub async fn minute_prices_for_day(&self, symbol: &str, date: NaiveDate) -> Result<MinutePrices, ApiError> {
        let symbol = normalize_symbol(symbol)?;
        let start = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ApiError::InvalidData(format!("invalid date {date}")))?
            .and_utc();
        let end = date
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| ApiError::InvalidData(format!("invalid date {date}")))?
            .and_utc();

        let data = self.client.get_stock_bars(&symbol, Timeframe::Minute, start, end).await?;
        Ok(MinutePrices {
            symbol,
            date,
            total_samples: data.len(),
            data,
        })
    }
}

/// Keeps assets whose upper-cased symbol or name contains `query`, in
/// universe order, stopping after `limit` matches. `query` must already be
/// upper-case.
pub fn filter_assets(assets: &[AssetResponse], query: &str, limit: usize) -> Vec<AssetMatch> {
    assets
        .iter()
        .filter(|asset| {
            asset.symbol.to_uppercase().contains(query)
                || asset
                    .name
                    .as_deref()
                    .is_some_and(|name| name.to_uppercase().contains(query))
        })
        .take(limit)
        .map(AssetResponse::to_match)
        .collect()
}

/// Upper-cases `symbol` and checks it is safe to use as a URL path segment:
/// an ASCII letter or digit followed by letters, digits and dots (`BRK.B`).
fn normalize_symbol(symbol: &str) -> Result<String, ApiError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(ApiError::InvalidData("symbol must not be empty".to_string()));
    }
    let starts_alphanumeric = symbol.starts_with(|c: char| c.is_ascii_alphanumeric());
    if !starts_alphanumeric || !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        return Err(ApiError::InvalidData(format!("invalid symbol '{symbol}'")));
    }
    Ok(symbol)
}
