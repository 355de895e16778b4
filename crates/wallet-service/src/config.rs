//! Configuration management for the wallet service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::verifier::DEFAULT_MIN_CONFIRMATIONS;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,

    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Confirmations required before a deposit is credited
    pub min_confirmations: u32,

    /// Whether to use the in-process mock explorer and fixed prices
    pub mock_mode: bool,

    /// Block explorer base URL
    pub explorer_url: String,

    /// Historical price API base URL
    pub pricing_url: String,

    /// Timeout for explorer and pricing requests, in seconds
    pub explorer_timeout_secs: u64,

    /// USD price used for every coin in mock mode
    pub mock_usd_price: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            redis_url: var("REDIS_URL", "redis://localhost:6379"),

            api_host: var("API_HOST", "0.0.0.0"),

            api_port: var("API_PORT", "8084")
                .parse()
                .context("Invalid API_PORT")?,

            min_confirmations: var("MIN_CONFIRMATIONS", &DEFAULT_MIN_CONFIRMATIONS.to_string())
                .parse()
                .context("Invalid MIN_CONFIRMATIONS")?,

            mock_mode: var("MOCK_MODE", "true")
                .parse()
                .context("Invalid MOCK_MODE (expected true/false)")?,

            explorer_url: var("EXPLORER_URL", "https://api.blockcypher.com/v1"),

            pricing_url: var("PRICING_URL", "https://api.coingecko.com/api/v3"),

            explorer_timeout_secs: var("EXPLORER_TIMEOUT_SECS", "10")
                .parse()
                .context("Invalid EXPLORER_TIMEOUT_SECS")?,

            mock_usd_price: var("MOCK_USD_PRICE", "50000")
                .parse()
                .context("Invalid MOCK_USD_PRICE")?,
        };

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.min_confirmations == 0 {
            anyhow::bail!("MIN_CONFIRMATIONS must be at least 1");
        }

        if self.explorer_timeout_secs == 0 {
            anyhow::bail!("EXPLORER_TIMEOUT_SECS must be greater than 0");
        }

        if !self.mock_mode {
            if self.explorer_url.trim().is_empty() {
                anyhow::bail!("EXPLORER_URL is required when MOCK_MODE=false");
            }
            if self.pricing_url.trim().is_empty() {
                anyhow::bail!("PRICING_URL is required when MOCK_MODE=false");
            }
        } else if !(self.mock_usd_price.is_finite() && self.mock_usd_price > 0.0) {
            anyhow::bail!("MOCK_USD_PRICE must be a positive number");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn explorer_timeout(&self) -> Duration {
        Duration::from_secs(self.explorer_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = load(&[]).expect("Failed to load config");

        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.api_host, "0.0.0.0");
        assert_eq!(config.api_port, 8084);
        assert_eq!(config.min_confirmations, 2);
        assert!(config.mock_mode);
        assert_eq!(config.explorer_timeout(), Duration::from_secs(10));
        assert_eq!(config.mock_usd_price, 50_000.0);
    }

    #[test]
    fn test_api_address() {
        let config = load(&[("API_HOST", "127.0.0.1"), ("API_PORT", "9000")]).unwrap();
        assert_eq!(config.api_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_rejects_zero_confirmations() {
        assert!(load(&[("MIN_CONFIRMATIONS", "0")]).is_err());
        assert!(load(&[("MIN_CONFIRMATIONS", "many")]).is_err());
        assert_eq!(
            load(&[("MIN_CONFIRMATIONS", "6")]).unwrap().min_confirmations,
            6
        );
    }

    #[test]
    fn test_live_mode_requires_explorer() {
        assert!(load(&[("MOCK_MODE", "false"), ("EXPLORER_URL", "")]).is_err());
        assert!(load(&[("MOCK_MODE", "false")]).is_ok());
        assert!(load(&[("MOCK_MODE", "yes")]).is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        assert!(load(&[("EXPLORER_TIMEOUT_SECS", "0")]).is_err());
    }
}
