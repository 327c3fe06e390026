use api_client::{AlpacaClient, MarketDataService};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{MethodRouter, get, post},
};
use chat_client::ChatService;
use configuration::{Config, RateLimitConfig};
use database::{SeedOutcome, TickerRepository};
use crate::rate_limit::RateLimiters;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;
pub mod rate_limit;

/// The shared application state that all handlers can access.
///
/// Every gateway is built once at startup; handlers only borrow them.
pub struct AppState {
    pub chat: ChatService,
    pub market: MarketDataService,
    pub tickers: TickerRepository,
}

/// Builds the application router. Each limited route gets its own per-IP
/// budget.
///
/// The limiter needs the peer address, so the router must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_router(state: Arc<AppState>, limits: &RateLimitConfig, body_limit_bytes: usize) -> Router {
    build_router_with_limiters(state, limits, body_limit_bytes).0
}

/// Like [`build_router`], but also returns the route limiters so their idle
/// client entries can be pruned.
pub fn build_router_with_limiters(
    state: Arc<AppState>,
    limits: &RateLimitConfig,
    body_limit_bytes: usize,
) -> (Router, RateLimiters) {
    let mut limiters = RateLimiters::default();
    let mut limited = |route: MethodRouter<Arc<AppState>>, per_minute: u32| {
        route.route_layer(middleware::from_fn_with_state(
            limiters.per_minute(per_minute),
            rate_limit::limit_by_ip,
        ))
    };

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // --- Gemini ---
        .route("/gemini/test", limited(post(handlers::gemini_test), limits.simple_chat_per_minute))
        .route("/gemini/simple", limited(post(handlers::gemini_simple), limits.simple_chat_per_minute))
        .route(
            "/gemini/conversation",
            limited(post(handlers::gemini_conversation), limits.conversation_per_minute),
        )
        .route("/gemini/stream", limited(post(handlers::gemini_stream), limits.stream_per_minute))
        // --- Alpaca ---
        .route(
            "/alpaca/fetch_markets",
            limited(get(handlers::fetch_markets), limits.market_data_per_minute),
        )
        .route(
            "/alpaca/fetch_company_bars",
            limited(get(handlers::fetch_company_bars), limits.market_data_per_minute),
        )
        .route(
            "/alpaca/minute_prices",
            limited(get(handlers::minute_prices), limits.market_data_per_minute),
        )
        // --- Local cache ---
        .route("/tickers/search", get(handlers::search_tickers))
        .with_state(state)
        .layer(cors)
        // This middleware will automatically log information about every incoming request.
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit_bytes));

    (router, limiters)
}

/// Opens the ticker cache and seeds it from the market listing when empty.
///
/// A failed seed is logged and otherwise ignored: the server still starts,
/// and the next start tries again.
pub async fn prepare_ticker_cache(tickers: &TickerRepository, market: &MarketDataService) -> Result<(), database::DbError> {
    tickers.initialize().await?;

    match tickers.seed_if_empty(|| market.list_all_tickers()).await {
        Ok(SeedOutcome::Populated(rows)) => tracing::info!(rows, "Ticker cache populated."),
        Ok(SeedOutcome::AlreadyPopulated(_)) => {}
        Err(e) => tracing::error!(error = %e, "Failed to populate the ticker cache. Local search will be empty."),
    }
    Ok(())
}

/// The main function to configure and run the web server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    // Tracing is initialized by the binary before this is called.
    config.validate()?;

    let pool = database::connect(&config.database.path, config.database.max_idle_connections).await?;
    let tickers = TickerRepository::new(pool);
    let market = MarketDataService::new(Arc::new(AlpacaClient::new(&config.alpaca)?));
    prepare_ticker_cache(&tickers, &market).await?;

    let chat = ChatService::gemini(&config.gemini)?;
    tracing::info!(model = %chat.default_model(), "Chat gateway ready.");

    let state = Arc::new(AppState { chat, market, tickers });
    let (app, limiters) = build_router_with_limiters(state, &config.rate_limits, config.server.body_limit_bytes);
    limiters.spawn_pruning(rate_limit::PRUNE_INTERVAL);

    let addr = config.server.socket_addr()?;
    tracing::info!("Web server started and listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
