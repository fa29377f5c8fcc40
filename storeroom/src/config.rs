//! Configuration management for the Storeroom application.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application server configuration
    pub server: ServerConfig,
    /// Daraja (M-Pesa) gateway configuration
    pub daraja: DarajaConfig,
    /// Payment reconciliation configuration
    pub payments: PaymentsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Daraja gateway configuration
///
/// Credentials come from the Safaricom developer portal; the sandbox base
/// URL is the default so a fresh checkout never talks to production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DarajaConfig {
    /// OAuth consumer key
    pub consumer_key: String,
    /// OAuth consumer secret
    pub consumer_secret: String,
    /// Business short code (paybill/till number)
    pub short_code: String,
    /// STK password passkey
    pub passkey: String,
    /// Public URL the gateway delivers callbacks to
    pub callback_url: String,
    /// API base URL (sandbox or production)
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Bounded retries for transient failures
    pub max_retries: usize,
}

/// Payment reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    /// How long an attempt may sit pending before the sweep expires it, in seconds
    pub wait_window_secs: u64,
    /// How often the expiry sweep runs, in seconds
    pub sweep_interval_secs: u64,
    /// How long callback identifiers are remembered for deduplication, in seconds
    ///
    /// Must cover at least the gateway's callback-retry window.
    pub dedup_retention_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            },
            daraja: DarajaConfig {
                consumer_key: env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
                consumer_secret: env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
                short_code: env::var("MPESA_SHORTCODE").unwrap_or_default(),
                passkey: env::var("MPESA_PASSKEY").unwrap_or_default(),
                callback_url: env::var("MPESA_CALLBACK_URL")
                    .unwrap_or_else(|_| "https://yourdomain.example/api/payments/callback".to_string()),
                base_url: env::var("MPESA_BASE_URL")
                    .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".to_string()),
                timeout_secs: env::var("MPESA_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
                max_retries: env::var("MPESA_MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
            },
            payments: PaymentsConfig {
                wait_window_secs: env::var("PAYMENT_WAIT_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(180),
                sweep_interval_secs: env::var("PAYMENT_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
                dedup_retention_secs: env::var("CALLBACK_DEDUP_RETENTION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(86_400),
            },
        }
    }
}
