use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub commit_retry_attempts: u32,
    pub commit_retry_backoff_ms: u64,
    pub bidding_window_minutes: u32,
    pub expiry_sweep_interval_secs: u64,
    pub currency: String,
    pub payment_gateway_url: String,
    pub payment_secret_key: String,
    pub bills_api_url: String,
    pub bills_api_key: String,
    pub bills_public_key: String,
    pub http_client_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other}, expected compact or json")),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_or_default("LOG_FORMAT", LogFormat::Compact)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            commit_retry_attempts: parse_or_default("COMMIT_RETRY_ATTEMPTS", 3)?,
            commit_retry_backoff_ms: parse_or_default("COMMIT_RETRY_BACKOFF_MS", 100)?,
            bidding_window_minutes: parse_or_default("BIDDING_WINDOW_MINUTES", 30)?,
            expiry_sweep_interval_secs: parse_or_default("EXPIRY_SWEEP_INTERVAL_SECS", 60)?,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "NGN".to_string()),
            payment_gateway_url: env::var("PAYMENT_GATEWAY_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            payment_secret_key: env::var("PAYMENT_SECRET_KEY").unwrap_or_default(),
            bills_api_url: env::var("BILLS_API_URL")
                .unwrap_or_else(|_| "https://api-service.vtpass.com/api".to_string()),
            bills_api_key: env::var("BILLS_API_KEY").unwrap_or_default(),
            bills_public_key: env::var("BILLS_PUBLIC_KEY").unwrap_or_default(),
            http_client_timeout_secs: parse_or_default("HTTP_CLIENT_TIMEOUT_SECS", 30)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
