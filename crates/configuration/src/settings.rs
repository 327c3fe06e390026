use crate::error::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an empty `config.toml` (or none at all) is
/// valid as long as the API keys arrive through the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gemini: GeminiConfig,
    pub alpaca: AlpacaConfig,
    pub rate_limits: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Where the HTTP server listens.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body in bytes.
    pub body_limit_bytes: usize,
}

/// The local ticker cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite file. Parent directories are created on first connect.
    pub path: PathBuf,
    /// How many idle connections the pool keeps around.
    pub max_idle_connections: usize,
}

/// The generative-language provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used when a request does not name a `gemini*` model.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// The brokerage market-data provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlpacaConfig {
    pub api_key: String,
    pub secret_key: String,
    /// Base URL of the trading API (asset listing).
    pub trading_base_url: String,
    /// Base URL of the market data API (bars).
    pub data_base_url: String,
    pub timeout_secs: u64,
}

/// Per-client request ceilings for the rate-limited routes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub simple_chat_per_minute: u32,
    pub conversation_per_minute: u32,
    pub stream_per_minute: u32,
    pub market_data_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive. `RUST_LOG` takes precedence when set.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

// --- Default Implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/tickers.db"),
            max_idle_connections: 5,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            max_tokens: 150,
            timeout_secs: 60,
        }
    }
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            trading_base_url: "https://paper-api.alpaca.markets".to_string(),
            data_base_url: "https://data.alpaca.markets".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            simple_chat_per_minute: 3,
            conversation_per_minute: 10,
            stream_per_minute: 10,
            market_data_per_minute: 20,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "tickerdesk.log".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("invalid server address {}:{}: {e}", self.host, self.port)))
    }
}

impl Config {
    /// Checks the settings the HTTP server cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gemini.api_key.trim().is_empty() {
            return Err(ConfigError::ValidationError("gemini.api_key must be set".to_string()));
        }
        if self.alpaca.api_key.trim().is_empty() || self.alpaca.secret_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "alpaca.api_key and alpaca.secret_key must be set".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.gemini.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "gemini.temperature must be between 0 and 2, got {}",
                self.gemini.temperature
            )));
        }
        if self.gemini.max_tokens == 0 {
            return Err(ConfigError::ValidationError("gemini.max_tokens must be positive".to_string()));
        }
        if self.database.max_idle_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_idle_connections must be positive".to_string(),
            ));
        }
        let limits = &self.rate_limits;
        if [
            limits.simple_chat_per_minute,
            limits.conversation_per_minute,
            limits.stream_per_minute,
            limits.market_data_per_minute,
        ]
        .contains(&0)
        {
            return Err(ConfigError::ValidationError("rate limits must be positive".to_string()));
        }
        self.server.socket_addr()?;
        Ok(())
    }
}
