//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for the HTTP mail relay used to deliver feedback emails.
#[derive(Clone, Debug)]
pub struct MailConfig {
    pub relay_url: String,
    pub relay_token: Option<String>,
    pub from_email: String,
    pub feedback_email: String,
    pub timeout: Duration,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub media_root: PathBuf,
    pub media_url: String,
    pub cors_allowed_origin: Option<String>,
    pub max_upload_bytes: usize,
    pub anon_rate_limit_per_minute: u32,
    pub feedback_rate_limit_per_hour: u32,
    /// Use the first `X-Forwarded-For` hop as the client address. Only safe
    /// behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    /// `None` disables feedback notifications.
    pub mail: Option<MailConfig>,
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
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", 5)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Media and HTTP Settings ---
        let media_root = std::env::var("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./media"));
        let media_url = std::env::var("MEDIA_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| "/media".to_string());
        let cors_allowed_origin = std::env::var("CORS_ALLOWED_ORIGIN").ok();
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?;

        // --- Load Throttling Settings ---
        let anon_rate_limit_per_minute = parse_var("ANON_RATE_LIMIT_PER_MINUTE", 100)?;
        let feedback_rate_limit_per_hour = parse_var("FEEDBACK_RATE_LIMIT_PER_HOUR", 10)?;
        let trust_forwarded_for = parse_var("TRUST_FORWARDED_FOR", false)?;

        // --- Load Mail Settings (optional) ---
        let mail = match std::env::var("MAIL_RELAY_URL").ok() {
            Some(relay_url) => Some(MailConfig {
                relay_url,
                relay_token: std::env::var("MAIL_RELAY_TOKEN").ok(),
                from_email: std::env::var("DEFAULT_FROM_EMAIL")
                    .map_err(|_| ConfigError::MissingVar("DEFAULT_FROM_EMAIL".to_string()))?,
                feedback_email: std::env::var("FEEDBACK_EMAIL")
                    .map_err(|_| ConfigError::MissingVar("FEEDBACK_EMAIL".to_string()))?,
                timeout: Duration::from_secs(parse_var("MAIL_TIMEOUT_SECS", 10)?),
            }),
            None => None,
        };

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            media_root,
            media_url,
            cors_allowed_origin,
            max_upload_bytes,
            anon_rate_limit_per_minute,
            feedback_rate_limit_per_hour,
            trust_forwarded_for,
            mail,
        })
    }
}

/// Reads a typed variable, falling back to `default` when it is unset.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
