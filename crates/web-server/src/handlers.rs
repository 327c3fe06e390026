use crate::{AppState, error::AppError};
use axum::{
    Json,
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chat_client::ChatOptions;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{AssetSearchResponse, Bar, ChatCompletion, ChatMessage, MinutePrices, Timeframe, UsageInfo};
use database::DEFAULT_SEARCH_LIMIT;
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

// Live market search returns fewer matches than the local cache by default.
const DEFAULT_MARKET_ROUTE_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ChatRequest {
    fn options(&self) -> ChatOptions {
        ChatOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl ConversationRequest {
    fn options(&self) -> ChatOptions {
        ChatOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub usage: Option<UsageInfo>,
    pub model: String,
}

impl From<ChatCompletion> for ChatResponse {
    fn from(completion: ChatCompletion) -> Self {
        Self {
            response: completion.response,
            usage: completion.usage,
            model: completion.model,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MarketSearchParams {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CompanyBarsParams {
    pub symbol: String,
    pub timeframe: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CompanyBarsResponse {
    pub symbol: String,
    pub timeframe: String,
    pub count: usize,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Deserialize)]
pub struct MinutePricesParams {
    pub symbol: String,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct TickerSearchParams {
    #[serde(default)]
    pub query: String,
    pub limit: Option<u32>,
}

/// A cached ticker as returned by `/tickers/search`.
#[derive(Debug, Serialize)]
pub struct TickerSummary {
    pub ticker: String,
    pub company_name: Option<String>,
    pub exchange: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TickerSearchResponse {
    pub results: Vec<TickerSummary>,
}

/// # GET /
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Tickerdesk: Gemini chat and market data API" }))
}

/// # GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "tickerdesk" }))
}

/// # POST /gemini/test
/// Echoes the message back without calling the model. Useful for checking
/// connectivity and the rate limiter. The requested model is echoed as sent;
/// without one, the configured default is reported.
pub async fn gemini_test(State(state): State<Arc<AppState>>, Json(request): Json<ChatRequest>) -> Json<ChatResponse> {
    Json(ChatResponse {
        response: format!("Echo: {}", request.message),
        usage: None,
        model: request.model.unwrap_or_else(|| state.chat.default_model().to_string()),
    })
}

/// # POST /gemini/simple
pub async fn gemini_simple(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let completion = state.chat.simple_chat(&request.message, &request.options()).await?;
    Ok(Json(completion.into()))
}

/// # POST /gemini/conversation
pub async fn gemini_conversation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConversationRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let completion = state
        .chat
        .create_chat_completion(&request.messages, &request.options())
        .await?;
    Ok(Json(completion.into()))
}

/// # POST /gemini/stream
/// Server-sent events: one `{"content": fragment}` frame per fragment, then a
/// final `[DONE]` frame. Provider failures arrive as an `"Error: ..."` fragment.
pub async fn gemini_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConversationRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let fragments = state
        .chat
        .streaming_chat_completion(&request.messages, &request.options())
        .await?;

    let frames = stream::unfold(fragments, |mut fragments| async move {
        let fragment = fragments.recv().await?;
        let frame = Event::default().data(json!({ "content": fragment }).to_string());
        Some((Ok::<_, Infallible>(frame), fragments))
    })
    .chain(stream::once(async { Ok::<_, Infallible>(Event::default().data("[DONE]")) }));

    Ok(Sse::new(frames).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive")))
}

/// # GET /alpaca/fetch_markets
pub async fn fetch_markets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MarketSearchParams>,
) -> Json<AssetSearchResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_MARKET_ROUTE_LIMIT);
    Json(state.market.search(&params.query, limit).await)
}

/// # GET /alpaca/fetch_company_bars
pub async fn fetch_company_bars(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompanyBarsParams>,
) -> Result<Json<CompanyBarsResponse>, AppError> {
    let timeframe = match params.timeframe.as_deref() {
        Some(raw) => raw
            .parse::<Timeframe>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
        None => Timeframe::default(),
    };

    let bars = state
        .market
        .historical_bars(&params.symbol, timeframe, params.start, params.end)
        .await?;

    Ok(Json(CompanyBarsResponse {
        symbol: params.symbol.trim().to_uppercase(),
        timeframe: timeframe.to_string(),
        count: bars.len(),
        bars,
    }))
}

/// # GET /alpaca/minute_prices
pub async fn minute_prices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MinutePricesParams>,
) -> Result<Json<MinutePrices>, AppError> {
    let prices = state.market.minute_prices_for_day(&params.symbol, params.date).await?;
    Ok(Json(prices))
}

/// # GET /tickers/search
/// Searches the local ticker cache. The query is trimmed and upper-cased.
pub async fn search_tickers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TickerSearchParams>,
) -> Result<Json<TickerSearchResponse>, AppError> {
    let query = params.query.trim().to_uppercase();
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

    let results = state
        .tickers
        .search(&query, limit)
        .await?
        .into_iter()
        .map(|record| TickerSummary {
            ticker: record.ticker,
            company_name: record.company_name,
            exchange: record.exchange,
        })
        .collect();

    Ok(Json(TickerSearchResponse { results }))
}
