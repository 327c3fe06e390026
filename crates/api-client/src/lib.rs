use crate::error::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use configuration::AlpacaConfig;
use core_types::{Bar, Timeframe};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub mod error;
pub mod responses;
pub mod service;
// --- Public API ---
pub use responses::{ApiErrorResponse, AssetResponse, BarsResponse};
pub use service::{DEFAULT_MARKET_SEARCH_LIMIT, MarketDataService};

// Largest page the bars endpoint will return.
const BARS_PAGE_LIMIT: &str = "10000";

/// The generic, abstract interface for a brokerage market-data API client.
/// This trait is the contract the gateway uses, allowing the underlying
/// implementation (live or stub) to be swapped out.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Fetches the entire asset universe. There is no server-side filter.
    async fn get_all_assets(&self) -> Result<Vec<AssetResponse>, ApiError>;

    /// Fetches every bar for `symbol` in `[start, end]`, following pagination.
    async fn get_stock_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ApiError>;
}

/// A concrete implementation of the `MarketDataClient` for Alpaca.
#[derive(Clone)]
pub struct AlpacaClient {
    client: reqwest::Client,
    trading_base_url: String,
    data_base_url: String,
}

impl AlpacaClient {
    pub fn new(config: &AlpacaConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", header_value(&config.api_key)?);
        headers.insert("APCA-API-SECRET-KEY", header_value(&config.secret_key)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            trading_base_url: config.trading_base_url.trim_end_matches('/').to_string(),
            data_base_url: config.data_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()))
        } else {
            // Alpaca usually answers with `{"code": ..., "message": ...}`, but
            // gateways in front of it may not.
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|body| body.message)
                .unwrap_or(text);
            Err(ApiError::AlpacaError { status: status.as_u16(), message })
        }
    }
}

fn header_value(secret: &str) -> Result<HeaderValue, ApiError> {
    let mut value = HeaderValue::from_str(secret)
        .map_err(|_| ApiError::Configuration("API credentials contain invalid characters".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

#[async_trait]
impl MarketDataClient for AlpacaClient {
    async fn get_all_assets(&self) -> Result<Vec<AssetResponse>, ApiError> {
        let url = format!("{}/v2/assets", self.trading_base_url);
        let assets: Vec<AssetResponse> = self.get_json(&url, &[]).await?;
        tracing::debug!(count = assets.len(), "Fetched the Alpaca asset universe.");
        Ok(assets)
    }

    async fn get_stock_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ApiError> {
        if start > end {
            return Err(ApiError::InvalidData(format!("start {start} is after end {end}")));
        }

        let url = format!("{}/v2/stocks/{}/bars", self.data_base_url, symbol);
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeframe", timeframe.as_str().to_string()),
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("limit", BARS_PAGE_LIMIT.to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("page_token", token));
            }

            let page: BarsResponse = self.get_json(&url, &query).await?;
            bars.extend(page.bars.unwrap_or_default().into_iter().map(Bar::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(bars)
    }
}
