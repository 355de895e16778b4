//! Block explorer client
//!
//! Looks up deposit transactions on chain: confirmation depth, confirmation
//! time and the outputs with their recipient addresses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use trueservices_common::{Cryptocurrency, Error, Result, TransactionHash};

/// One output of an on-chain transaction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainOutput {
    /// Value in the coin's smallest unit
    pub value: u64,

    /// Recipient addresses (empty for non-standard scripts)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub addresses: Vec<String>,
}

/// A transaction as reported by the explorer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainTransaction {
    pub hash: String,

    /// Blocks mined on top of the including block, 0 while in the mempool
    #[serde(default)]
    pub confirmations: u32,

    /// Time of the including block
    #[serde(default, rename = "confirmed")]
    pub confirmed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub outputs: Vec<ChainOutput>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[async_trait]
pub trait ChainExplorer: Send + Sync {
    /// Fetch a transaction. `Ok(None)` when the chain does not know the hash.
    async fn get_transaction(
        &self,
        crypto: Cryptocurrency,
        hash: &TransactionHash,
    ) -> Result<Option<ChainTransaction>>;
}

/// Client for a Blockcypher-style REST explorer
///
/// `GET {base_url}/{coin}/main/txs/{hash}`
pub struct HttpExplorer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpExplorer {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Explorer(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn transaction_url(&self, crypto: Cryptocurrency, hash: &TransactionHash) -> String {
        format!(
            "{}/{}/main/txs/{}",
            self.base_url,
            crypto.explorer_slug(),
            hash
        )
    }
}

#[async_trait]
impl ChainExplorer for HttpExplorer {
    async fn get_transaction(
        &self,
        crypto: Cryptocurrency,
        hash: &TransactionHash,
    ) -> Result<Option<ChainTransaction>> {
        let url = self.transaction_url(crypto, hash);

        debug!("Fetching transaction from explorer: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Explorer(format!("Request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(Error::Explorer(format!(
                "Explorer returned {}",
                response.status()
            )));
        }

        let transaction: ChainTransaction = response
            .json()
            .await
            .map_err(|e| Error::Explorer(format!("Failed to parse explorer response: {}", e)))?;

        debug!(
            "Explorer: {} has {} confirmations and {} outputs",
            hash,
            transaction.confirmations,
            transaction.outputs.len()
        );

        Ok(Some(transaction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    const HASH: &str = "00000000000000000000000000000000000000000000000000000000000000aa";

    async fn tx_handler(
        Path((coin, hash)): Path<(String, String)>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        if coin == "dash" {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "backend unavailable" })),
            );
        }
        if coin != "btc" || hash != HASH {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })));
        }
        (
            StatusCode::OK,
            Json(json!({
                "hash": HASH,
                "confirmations": 3,
                "confirmed": "2024-05-01T12:00:00Z",
                "outputs": [
                    { "value": 100000, "addresses": ["bc1qdeposit"] },
                    { "value": 5000, "addresses": null }
                ]
            })),
        )
    }

    async fn spawn_stub() -> String {
        let app = Router::new().route("/{coin}/main/txs/{hash}", get(tx_handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_parse_explorer_payload() {
        let tx: ChainTransaction = serde_json::from_value(json!({
            "hash": HASH,
            "confirmations": 0,
            "outputs": [{ "value": 42, "addresses": ["a", "b"] }]
        }))
        .unwrap();

        assert_eq!(tx.confirmations, 0);
        assert!(tx.confirmed_at.is_none());
        assert_eq!(tx.outputs[0].addresses, vec!["a", "b"]);
    }

    #[test]
    fn test_transaction_url() {
        let explorer =
            HttpExplorer::new("https://api.example.com/v1/".to_string(), Duration::from_secs(1))
                .unwrap();
        let hash = TransactionHash::parse(HASH).unwrap();
        assert_eq!(
            explorer.transaction_url(Cryptocurrency::Ltc, &hash),
            format!("https://api.example.com/v1/ltc/main/txs/{}", HASH)
        );
    }

    #[tokio::test]
    async fn test_fetch_from_stub() {
        let base_url = spawn_stub().await;
        let explorer = HttpExplorer::new(base_url, Duration::from_secs(5)).unwrap();
        let hash = TransactionHash::parse(HASH).unwrap();

        let tx = explorer
            .get_transaction(Cryptocurrency::Btc, &hash)
            .await
            .unwrap()
            .expect("transaction should exist");
        assert_eq!(tx.confirmations, 3);
        assert!(tx.confirmed_at.is_some());
        assert_eq!(tx.outputs.len(), 2);
        assert!(tx.outputs[1].addresses.is_empty());

        let missing = explorer
            .get_transaction(Cryptocurrency::Doge, &hash)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_upstream_failure() {
        let base_url = spawn_stub().await;
        let explorer = HttpExplorer::new(base_url, Duration::from_secs(5)).unwrap();
        let hash = TransactionHash::parse(HASH).unwrap();

        let err = explorer
            .get_transaction(Cryptocurrency::Dash, &hash)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Explorer(_)));
        assert_eq!(err.code(), "VERIFICATION_FAILED");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("500"));
    }
}
