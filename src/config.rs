//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::validation::{StopPricePolicy, ValidationPolicy};

/// Which Binance environment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// Sandbox with non-real funds.
    #[default]
    Testnet,
    /// Real funds.
    Mainnet,
}

impl Network {
    /// Pick the network from the `--mainnet` flag.
    pub fn from_mainnet_flag(mainnet: bool) -> Self {
        if mainnet {
            Network::Mainnet
        } else {
            Network::Testnet
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }
}

/// API key pair for one network.
#[derive(Clone)]
pub struct Credentials {
    /// API key, sent in `X-MBX-APIKEY`.
    pub api_key: String,
    /// API secret, used only for HMAC signing.
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Credentials ===
    /// Testnet API key (also the mainnet fallback).
    #[serde(default)]
    pub binance_api_key: Option<String>,

    /// Testnet API secret (also the mainnet fallback).
    #[serde(default)]
    pub binance_api_secret: Option<String>,

    /// Mainnet API key.
    #[serde(default)]
    pub binance_mainnet_api_key: Option<String>,

    /// Mainnet API secret.
    #[serde(default)]
    pub binance_mainnet_api_secret: Option<String>,

    // === Endpoints ===
    /// USDT-M futures testnet base URL.
    #[serde(default = "default_testnet_url")]
    pub binance_testnet_url: String,

    /// USDT-M futures mainnet base URL.
    #[serde(default = "default_mainnet_url")]
    pub binance_mainnet_url: String,

    /// Signed request validity window in milliseconds.
    #[serde(default = "default_recv_window")]
    pub binance_recv_window: u64,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Audit & retry ===
    /// Append-only audit log file.
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: PathBuf,

    /// Retries per call after a network failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry backoff in milliseconds, doubled per retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    // === Validation policy ===
    /// Smallest accepted order quantity.
    #[serde(default = "default_min_quantity")]
    pub min_quantity: Decimal,

    /// Decimal places for computed quantities (TWAP slices).
    #[serde(default = "default_quantity_precision")]
    pub quantity_precision: u32,

    /// Decimal places for computed prices (grid levels, TWAP limit slices).
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,

    /// Required relation between stop price and limit price.
    #[serde(default)]
    pub stop_price_policy: StopPricePolicy,

    // === Logging ===
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_testnet_url() -> String {
    "https://testnet.binancefuture.com".to_string()
}

fn default_mainnet_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("bot.log")
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_min_quantity() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_quantity_precision() -> u32 {
    3
}

fn default_price_precision() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binance_api_key: None,
            binance_api_secret: None,
            binance_mainnet_api_key: None,
            binance_mainnet_api_secret: None,
            binance_testnet_url: default_testnet_url(),
            binance_mainnet_url: default_mainnet_url(),
            binance_recv_window: default_recv_window(),
            http_timeout_ms: default_http_timeout_ms(),
            audit_log_path: default_audit_log_path(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            min_quantity: default_min_quantity(),
            quantity_precision: default_quantity_precision(),
            price_precision: default_price_precision(),
            stop_price_policy: StopPricePolicy::default(),
            rust_log: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_quantity <= Decimal::ZERO {
            return Err(ConfigError::Invalid("MIN_QUANTITY must be positive".to_string()));
        }
        if self.quantity_precision > 18 || self.price_precision > 18 {
            return Err(ConfigError::Invalid(
                "QUANTITY_PRECISION and PRICE_PRECISION must be at most 18".to_string(),
            ));
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid("HTTP_TIMEOUT_MS must be positive".to_string()));
        }
        for url in [&self.binance_testnet_url, &self.binance_mainnet_url] {
            url::Url::parse(url)
                .map_err(|e| ConfigError::Invalid(format!("bad base URL {url}: {e}")))?;
        }
        Ok(())
    }

    /// Base URL for the selected network.
    pub fn base_url(&self, network: Network) -> &str {
        match network {
            Network::Testnet => &self.binance_testnet_url,
            Network::Mainnet => &self.binance_mainnet_url,
        }
    }

    /// Credential set for the selected network.
    ///
    /// Mainnet prefers `BINANCE_MAINNET_API_*` and falls back to `BINANCE_API_*`.
    pub fn credentials(&self, network: Network) -> Result<Credentials, ConfigError> {
        let (key, secret, key_var, secret_var) = match network {
            Network::Testnet => (
                self.binance_api_key.as_deref(),
                self.binance_api_secret.as_deref(),
                "BINANCE_API_KEY",
                "BINANCE_API_SECRET",
            ),
            Network::Mainnet => (
                non_empty(self.binance_mainnet_api_key.as_deref())
                    .or(self.binance_api_key.as_deref()),
                non_empty(self.binance_mainnet_api_secret.as_deref())
                    .or(self.binance_api_secret.as_deref()),
                "BINANCE_MAINNET_API_KEY",
                "BINANCE_MAINNET_API_SECRET",
            ),
        };

        let api_key = non_empty(key).ok_or(ConfigError::MissingCredential(key_var))?;
        let api_secret = non_empty(secret).ok_or(ConfigError::MissingCredential(secret_var))?;

        Ok(Credentials {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    /// Validator policy derived from this configuration.
    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            min_quantity: self.min_quantity,
            quantity_precision: self.quantity_precision,
            price_precision: self.price_precision,
            stop_price_policy: self.stop_price_policy,
        }
    }

    /// HTTP timeout as a duration.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Base retry backoff as a duration.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
