//! Historical USD prices for deposit valuation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use trueservices_common::{Cryptocurrency, Error, Result};

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD price of one coin at `at`
    async fn usd_price(&self, crypto: Cryptocurrency, at: DateTime<Utc>) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    market_data: Option<MarketData>,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    current_price: HashMap<String, f64>,
}

/// Client for a CoinGecko-style history endpoint
///
/// `GET {base_url}/coins/{id}/history?date=dd-mm-yyyy`
pub struct HttpPriceOracle {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPriceOracle {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Pricing(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn history_url(&self, crypto: Cryptocurrency, at: DateTime<Utc>) -> String {
        format!(
            "{}/coins/{}/history?date={}&localization=false",
            self.base_url,
            crypto.pricing_id(),
            at.format("%d-%m-%Y")
        )
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn usd_price(&self, crypto: Cryptocurrency, at: DateTime<Utc>) -> Result<f64> {
        let url = self.history_url(crypto, at);

        debug!("Fetching price: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Pricing(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Pricing(format!(
                "Pricing API returned {}",
                response.status()
            )));
        }

        let history: HistoryResponse = response
            .json()
            .await
            .map_err(|e| Error::Pricing(format!("Failed to parse pricing response: {}", e)))?;

        history
            .market_data
            .and_then(|m| m.current_price.get("usd").copied())
            .ok_or_else(|| {
                Error::Pricing(format!(
                    "No USD price for {} on {}",
                    crypto,
                    at.date_naive()
                ))
            })
    }
}

/// Oracle returning configured prices, for mock mode and tests
pub struct FixedPriceOracle {
    prices: HashMap<Cryptocurrency, f64>,
}

impl FixedPriceOracle {
    /// Same price for every supported coin
    pub fn uniform(usd_price: f64) -> Self {
        Self {
            prices: Cryptocurrency::ALL.iter().map(|c| (*c, usd_price)).collect(),
        }
    }

    pub fn with_price(mut self, crypto: Cryptocurrency, usd_price: f64) -> Self {
        self.prices.insert(crypto, usd_price);
        self
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn usd_price(&self, crypto: Cryptocurrency, _at: DateTime<Utc>) -> Result<f64> {
        self.prices
            .get(&crypto)
            .copied()
            .ok_or_else(|| Error::Pricing(format!("No price configured for {}", crypto)))
    }
}
