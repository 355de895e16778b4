//! Mock block explorer for development and testing
//!
//! Holds transactions in memory. Confirmations are advanced by hand to
//! simulate blocks being mined.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use trueservices_common::{Cryptocurrency, Result, TransactionHash};

use crate::explorer::{ChainExplorer, ChainOutput, ChainTransaction};

#[derive(Default)]
pub struct MockExplorer {
    transactions: RwLock<HashMap<(Cryptocurrency, TransactionHash), ChainTransaction>>,
}

impl MockExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast a transaction paying `outputs` (address, base units)
    pub async fn broadcast(
        &self,
        crypto: Cryptocurrency,
        hash: &TransactionHash,
        outputs: Vec<(String, u64)>,
        confirmations: u32,
    ) {
        let transaction = ChainTransaction {
            hash: hash.to_string(),
            confirmations,
            confirmed_at: (confirmations > 0).then(Utc::now),
            outputs: outputs
                .into_iter()
                .map(|(address, value)| ChainOutput {
                    value,
                    addresses: vec![address],
                })
                .collect(),
        };

        debug!(
            "Mock explorer: broadcast {} {} with {} confirmations",
            crypto, hash, confirmations
        );

        self.transactions
            .write()
            .await
            .insert((crypto, hash.clone()), transaction);
    }

    /// Set the confirmation count of a known transaction. Returns `false` if unknown.
    pub async fn set_confirmations(
        &self,
        crypto: Cryptocurrency,
        hash: &TransactionHash,
        confirmations: u32,
    ) -> bool {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&(crypto, hash.clone())) {
            Some(tx) => {
                if tx.confirmed_at.is_none() && confirmations > 0 {
                    tx.confirmed_at = Some(Utc::now());
                }
                tx.confirmations = confirmations;
                debug!("Mock explorer: {} now has {} confirmations", hash, confirmations);
                true
            }
            None => false,
        }
    }

    /// Mine one block on top of every known transaction
    pub async fn mine_block(&self) {
        let mut transactions = self.transactions.write().await;
        for tx in transactions.values_mut() {
            tx.confirmations = tx.confirmations.saturating_add(1);
            if tx.confirmed_at.is_none() {
                tx.confirmed_at = Some(Utc::now());
            }
        }
    }
}

#[async_trait]
impl ChainExplorer for MockExplorer {
    async fn get_transaction(
        &self,
        crypto: Cryptocurrency,
        hash: &TransactionHash,
    ) -> Result<Option<ChainTransaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .get(&(crypto, hash.clone()))
            .cloned())
    }
}
