use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub api_port: u16,
    pub environment: String,
    pub hyperliquid_api_url: String,
    pub hyperliquid_private_key: Option<String>,
    /// Seconds to wait after clearing a symbol before placing the new entry.
    /// The exchange applies position closes asynchronously.
    pub settle_after_clear_secs: u64,
    /// Milliseconds to wait between closing positions and sweeping orders.
    pub settle_close_to_cancel_ms: u64,
    /// Milliseconds between limit-entry retry attempts.
    pub limit_retry_delay_ms: u64,
    pub balance_cache_secs: u64,
    pub balance_cache_rate_limited_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "testnet".into());
        let default_api_url = if environment == "testnet" {
            "https://api.hyperliquid-testnet.xyz"
        } else {
            "https://api.hyperliquid.xyz"
        };
        let key_var = if environment == "testnet" {
            "HYPERLIQUID_TESTNET_KEY"
        } else {
            "HYPERLIQUID_MAINNET_KEY"
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/signalbridge".into()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".into())
                .parse()
                .context("API_PORT must be u16")?,
            hyperliquid_api_url: std::env::var("HYPERLIQUID_API_URL")
                .unwrap_or_else(|_| default_api_url.into()),
            hyperliquid_private_key: std::env::var(key_var).ok(),
            environment,
            settle_after_clear_secs: env_u64("SETTLE_AFTER_CLEAR_SECS", 3),
            settle_close_to_cancel_ms: env_u64("SETTLE_CLOSE_TO_CANCEL_MS", 1500),
            limit_retry_delay_ms: env_u64("LIMIT_RETRY_DELAY_MS", 500),
            balance_cache_secs: env_u64("BALANCE_CACHE_SECS", 300),
            balance_cache_rate_limited_secs: env_u64("BALANCE_CACHE_RATE_LIMITED_SECS", 900),
        })
    }
}

fn env_u64(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
