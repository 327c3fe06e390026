use anyhow::Context;
use api_client::{AlpacaClient, DEFAULT_MARKET_SEARCH_LIMIT, MarketDataService};
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::Config;
use core_types::{AssetMatch, TickerRecord};
use database::{DEFAULT_SEARCH_LIMIT, SeedOutcome, TickerRepository};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The main entry point for the Tickerdesk application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load API keys from .env if present; the environment may already carry them.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => configuration::load_config_from(path)?,
        None => configuration::load_config()?,
    };
    let _log_guard = configuration::init_tracing(&config.logging)?;

    match cli.command {
        Commands::Serve => web_server::run_server(config).await,
        Commands::Populate => handle_populate(&config).await,
        Commands::Search(args) => handle_search(args, &config).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Gemini chat and stock market data over HTTP, with a local ticker cache.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file. Defaults to `config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve,
    /// Fill the local ticker cache from the market listing if it is empty.
    Populate,
    /// Search tickers in the local cache, or live with `--live`.
    Search(SearchArgs),
}

#[derive(Parser)]
struct SearchArgs {
    /// Text to look for in the ticker symbol or company name.
    query: String,

    /// Maximum number of results.
    #[arg(long)]
    limit: Option<u32>,

    /// Search the live asset universe instead of the local cache.
    #[arg(long)]
    live: bool,

    /// Print the results as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ==============================================================================
// Command Logic
// ==============================================================================

fn market_service(config: &Config) -> anyhow::Result<MarketDataService> {
    let client = AlpacaClient::new(&config.alpaca).context("Failed to build the Alpaca client")?;
    Ok(MarketDataService::new(Arc::new(client)))
}

async fn open_cache(config: &Config) -> anyhow::Result<TickerRepository> {
    let pool = database::connect(&config.database.path, config.database.max_idle_connections)
        .await
        .with_context(|| format!("Failed to open {}", config.database.path.display()))?;
    let tickers = TickerRepository::new(pool);
    tickers.initialize().await?;
    tracing::debug!(path = %config.database.path.display(), "Opened the ticker cache.");
    Ok(tickers)
}

fn spinner(message: &'static str) -> anyhow::Result<ProgressBar> {
    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(100));
    Ok(progress)
}

/// Seeds the cache exactly like server startup does, but fails loudly.
async fn handle_populate(config: &Config) -> anyhow::Result<()> {
    let tickers = open_cache(config).await?;
    let market = market_service(config)?;

    let progress = spinner("Downloading the asset universe...")?;
    let outcome = tickers.seed_if_empty(|| market.list_all_tickers()).await;
    progress.finish_and_clear();

    match outcome? {
        SeedOutcome::Populated(rows) => println!("Populated the ticker cache with {rows} tickers."),
        SeedOutcome::AlreadyPopulated(rows) => {
            println!("The ticker cache already holds {rows} tickers; nothing to do.")
        }
    }
    Ok(())
}

async fn handle_search(args: SearchArgs, config: &Config) -> anyhow::Result<()> {
    if args.live {
        let limit = args
            .limit
            .map(|limit| limit as usize)
            .unwrap_or(DEFAULT_MARKET_SEARCH_LIMIT);
        let market = market_service(config)?;

        let progress = spinner("Searching the live asset universe...")?;
        let response = market.search(&args.query, limit).await;
        progress.finish_and_clear();

        if let Some(error) = &response.error {
            anyhow::bail!("Live search failed: {error}");
        }
        if args.json {
            println!("{}", serde_json::to_string_pretty(&response.results)?);
        } else {
            print_live_matches(&response.results);
        }
        return Ok(());
    }

    let tickers = open_cache(config).await?;
    let query = args.query.trim().to_uppercase();
    let results = tickers
        .search(&query, args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_cached_tickers(&results);
    }
    Ok(())
}

fn print_cached_tickers(results: &[TickerRecord]) {
    if results.is_empty() {
        println!("No tickers found. Has the cache been populated?");
        return;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Ticker", "Company", "Exchange"]);
    for record in results {
        table.add_row(vec![
            record.ticker.as_str(),
            record.company_name.as_deref().unwrap_or("-"),
            record.exchange.as_deref().unwrap_or("-"),
        ]);
    }
    println!("{table}");
}

fn print_live_matches(results: &[AssetMatch]) {
    if results.is_empty() {
        println!("No matching assets.");
        return;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Ticker", "Name", "Exchange"]);
    for asset in results {
        table.add_row(vec![
            asset.ticker.as_str(),
            asset.name.as_deref().unwrap_or("-"),
            asset.exchange.as_str(),
        ]);
    }
    println!("{table}");
}
