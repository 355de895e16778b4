//! Blockchain verification of deposits
//!
//! Decides whether an on-chain transaction pays one of our deposit
//! addresses deeply enough to be credited, and what it is worth in USD.
//! The USD value is always derived from the chain and the price oracle.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use trueservices_common::{Cryptocurrency, TransactionHash, Usd};

use crate::explorer::ChainExplorer;
use crate::pricing::PriceOracle;

/// Default minimum confirmations before a deposit is credited
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 2;

/// Why a deposit cannot be credited (yet)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("Transaction not found on chain")]
    NotFoundOnChain,

    #[error("Transaction has {current} confirmations, need at least {required}")]
    Unconfirmed { current: u32, required: u32 },

    #[error("Transaction does not pay an active deposit address")]
    InvalidRecipient,

    #[error("Transaction carries no value to the deposit address")]
    ZeroValue,

    #[error("Verification failed: {0}")]
    Upstream(String),
}

impl Rejection {
    /// Whether the transaction can never be credited
    pub fn is_terminal(&self) -> bool {
        matches!(self, Rejection::InvalidRecipient | Rejection::ZeroValue)
    }
}

/// A deposit that passed verification
#[derive(Debug, Clone, PartialEq)]
pub struct Acceptance {
    pub confirmations: u32,

    /// Base units paid to the accepted recipients
    pub received_units: u64,

    pub usd_price: f64,

    /// Authoritative USD value to credit
    pub amount: Usd,
}

#[derive(Clone)]
pub struct Verifier {
    explorer: Arc<dyn ChainExplorer>,
    prices: Arc<dyn PriceOracle>,
    min_confirmations: u32,
}

impl Verifier {
    pub fn new(
        explorer: Arc<dyn ChainExplorer>,
        prices: Arc<dyn PriceOracle>,
        min_confirmations: u32,
    ) -> Self {
        Self {
            explorer,
            prices,
            min_confirmations,
        }
    }

    pub fn min_confirmations(&self) -> u32 {
        self.min_confirmations
    }

    /// Verify that `hash` pays at least one of `recipients` with enough confirmations
    ///
    /// The recipient check runs before the depth check, so a payment to a
    /// foreign address is rejected however deep it is.
    pub async fn verify(
        &self,
        crypto: Cryptocurrency,
        hash: &TransactionHash,
        recipients: &HashSet<String>,
    ) -> Result<Acceptance, Rejection> {
        let transaction = self
            .explorer
            .get_transaction(crypto, hash)
            .await
            .map_err(|e| Rejection::Upstream(e.to_string()))?
            .ok_or(Rejection::NotFoundOnChain)?;

        let matched: Vec<_> = transaction
            .outputs
            .iter()
            .filter(|o| o.addresses.iter().any(|a| recipients.contains(a)))
            .collect();

        if matched.is_empty() {
            warn!("{} {} pays none of the accepted deposit addresses", crypto, hash);
            return Err(Rejection::InvalidRecipient);
        }

        if transaction.confirmations < self.min_confirmations {
            debug!(
                "{} {} has {} of {} confirmations",
                crypto, hash, transaction.confirmations, self.min_confirmations
            );
            return Err(Rejection::Unconfirmed {
                current: transaction.confirmations,
                required: self.min_confirmations,
            });
        }

        let received_units = matched
            .iter()
            .try_fold(0u64, |sum, o| sum.checked_add(o.value))
            .ok_or_else(|| Rejection::Upstream("Output values overflow".to_string()))?;

        if received_units == 0 {
            return Err(Rejection::ZeroValue);
        }

        let priced_at = transaction.confirmed_at.unwrap_or_else(Utc::now);
        let usd_price = self
            .prices
            .usd_price(crypto, priced_at)
            .await
            .map_err(|e| Rejection::Upstream(e.to_string()))?;

        let amount = Usd::from_coin_units(received_units, crypto.decimals(), usd_price)
            .map_err(|e| Rejection::Upstream(e.to_string()))?;

        if !amount.is_positive() {
            return Err(Rejection::ZeroValue);
        }

        debug!(
            "{} {} verified: {} units at {} USD = {}",
            crypto, hash, received_units, usd_price, amount
        );

        Ok(Acceptance {
            confirmations: transaction.confirmations,
            received_units,
            usd_price,
            amount,
        })
    }
}
