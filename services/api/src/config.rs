//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub generation_model: String,
    pub whatsapp_api_base: String,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_phone_number_id: Option<String>,
    pub email_api_base: String,
    pub email_api_key: Option<String>,
    pub email_sender: String,
    /// Timeout applied to outbound provider calls, in seconds.
    pub provider_timeout_secs: u64,
    /// How often the dispatcher drains due jobs, in seconds.
    pub dispatch_interval_secs: u64,
    /// UTC hour at which the daily scheduler run fires.
    pub scheduler_hour_utc: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let whatsapp_access_token = std::env::var("WHATSAPP_ACCESS_TOKEN").ok();
        let whatsapp_phone_number_id = std::env::var("WHATSAPP_PHONE_NUMBER_ID").ok();
        let email_api_key = std::env::var("EMAIL_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let generation_model =
            std::env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let whatsapp_api_base = std::env::var("WHATSAPP_API_BASE")
            .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".to_string());
        let email_api_base = std::env::var("EMAIL_API_BASE")
            .unwrap_or_else(|_| "https://api.resend.com".to_string());
        let email_sender = std::env::var("EMAIL_SENDER")
            .unwrap_or_else(|_| "words@vocab-delivery.example".to_string());

        let provider_timeout_secs = parse_var("PROVIDER_TIMEOUT_SECS", 15u64)?;
        let dispatch_interval_secs = parse_var("DISPATCH_INTERVAL_SECS", 30u64)?;
        let scheduler_hour_utc = parse_var("SCHEDULER_HOUR_UTC", 2u32)?;
        if scheduler_hour_utc > 23 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_HOUR_UTC".to_string(),
                format!("'{}' is not an hour of day", scheduler_hour_utc),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            generation_model,
            whatsapp_api_base,
            whatsapp_access_token,
            whatsapp_phone_number_id,
            email_api_base,
            email_api_key,
            email_sender,
            provider_timeout_secs,
            dispatch_interval_secs,
            scheduler_hour_utc,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}
