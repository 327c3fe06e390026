use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    AlpacaConfig, Config, DatabaseConfig, GeminiConfig, LoggingConfig, RateLimitConfig, ServerConfig,
};

/// Prefix of the environment variables that override file settings,
/// e.g. `TICKERDESK__GEMINI__API_KEY`.
pub const ENV_PREFIX: &str = "TICKERDESK";

/// Loads the application configuration from `config.toml` and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

/// Loads the configuration from the given file (if it exists) layered under
/// `TICKERDESK__*` environment variables.
///
/// Missing keys fall back to the defaults in [`settings`]. The result is not
/// validated; call [`Config::validate`] before serving.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.path, Path::new("data/tickers.db"));
        assert_eq!(config.gemini.max_tokens, 150);
        assert_eq!(config.rate_limits.simple_chat_per_minute, 3);
        assert_eq!(config.rate_limits.market_data_per_minute, 20);
        assert!(config.validate().is_err(), "keys are required to serve");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[gemini]
api_key = "g-key"
model = "gemini-2.0-flash"

[alpaca]
api_key = "a-key"
secret_key = "a-secret"

[rate_limits]
stream_per_minute = 4
"#
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.rate_limits.stream_per_minute, 4);
        assert_eq!(config.rate_limits.conversation_per_minute, 10);
        config.validate().unwrap();
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let mut config = Config::default();
        config.gemini.api_key = "g".into();
        config.alpaca.api_key = "a".into();
        config.alpaca.secret_key = "s".into();
        config.validate().unwrap();

        config.rate_limits.market_data_per_minute = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }
}
