use chrono::{DateTime, Utc};
use core_types::{AssetMatch, Bar, NewTicker};
use rust_decimal::Decimal;
use serde::Deserialize;

/// A single entry of `GET /v2/assets`. There are more fields, but these are
/// the ones we use.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetResponse {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub exchange: String,
}

impl AssetResponse {
    pub fn to_new_ticker(&self) -> NewTicker {
        NewTicker {
            ticker: self.symbol.clone(),
            company_name: self.name.clone().filter(|name| !name.is_empty()),
            exchange: Some(self.exchange.clone()),
        }
    }

    pub fn to_match(&self) -> AssetMatch {
        AssetMatch {
            ticker: self.symbol.clone(),
            name: self.name.clone(),
            exchange: self.exchange.clone(),
        }
    }
}

/// The response of `GET /v2/stocks/{symbol}/bars`.
#[derive(Debug, Clone, Deserialize)]
pub struct BarsResponse {
    // Alpaca sends `null` instead of an empty list when there are no bars.
    #[serde(default)]
    pub bars: Option<Vec<RawBar>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

// Intermediate struct for deserializing bars from the Alpaca API
#[derive(Debug, Clone, Deserialize)]
pub struct RawBar {
    pub t: DateTime<Utc>,
    pub o: Decimal,
    pub h: Decimal,
    pub l: Decimal,
    pub c: Decimal,
    pub v: u64,
}

impl From<RawBar> for Bar {
    fn from(raw: RawBar) -> Self {
        Bar {
            timestamp: raw.t,
            open: raw.o,
            high: raw.h,
            low: raw.l,
            close: raw.c,
            volume: raw.v,
        }
    }
}

/// Represents an error response from the Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn asset_listing_deserializes() {
        let body = r#"[
            {"id":"b0b6dd9d-8b9b-48a9-ba46-b9d54906e415","class":"us_equity","exchange":"NASDAQ",
             "symbol":"AAPL","name":"Apple Inc. Common Stock","status":"active","tradable":true,
             "marginable":true,"shortable":true,"easy_to_borrow":true,"fractionable":true},
            {"id":"x","class":"us_equity","exchange":"OTC","symbol":"ZZZZF","name":"",
             "status":"inactive","tradable":false}
        ]"#;
        let assets: Vec<AssetResponse> = serde_json::from_str(body).unwrap();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].to_new_ticker(), NewTicker::new("AAPL", Some("Apple Inc. Common Stock"), Some("NASDAQ")));
        assert_eq!(assets[1].to_new_ticker().company_name, None);
    }

    #[test]
    fn bars_deserialize_including_null_pages() {
        let body = r#"{"bars":[{"t":"2024-01-02T05:00:00Z","o":187.15,"h":188.44,"l":183.885,
            "c":185.64,"v":82488674,"n":1009074,"vw":185.9465}],
            "symbol":"AAPL","next_page_token":"QUFQTHxEfDIwMjQ="}"#;
        let page: BarsResponse = serde_json::from_str(body).unwrap();
        let bars: Vec<Bar> = page.bars.unwrap().into_iter().map(Bar::from).collect();
        assert_eq!(bars[0].close, dec!(185.64));
        assert_eq!(bars[0].volume, 82_488_674);
        assert_eq!(page.next_page_token.as_deref(), Some("QUFQTHxEfDIwMjQ="));

        let empty: BarsResponse =
            serde_json::from_str(r#"{"bars":null,"symbol":"AAPL","next_page_token":null}"#).unwrap();
        assert!(empty.bars.is_none());
    }
}
