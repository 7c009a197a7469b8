use std::net::SocketAddr;

use tracing::Level;

/// Max characters kept from an uploaded file, to keep prompt size reasonable.
pub const MAX_CONTENT_CHARS: usize = 8000;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub murf_api_key: Option<String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:8000".
    /// *   `OPEN_ROUTER_API_KEY`: Your OpenRouter credential. Optional at startup;
    ///     generation requests fail with a configuration error if it is missing.
    /// *   `OPENROUTER_MODEL`: (Optional) The model used for story generation. Defaults to "openai/gpt-4o-mini".
    /// *   `MURF_API_KEY`: (Optional) Credential for the Murf voice relay.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openrouter_api_key = std::env::var("OPEN_ROUTER_API_KEY").ok();
        let openrouter_model = std::env::var("OPENROUTER_MODEL")
            .unwrap_or_else(|_| "openai/gpt-4o-mini".to_string());
        let murf_api_key = std::env::var("MURF_API_KEY").ok();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openrouter_api_key,
            openrouter_model,
            murf_api_key,
            log_level,
        })
    }
}
