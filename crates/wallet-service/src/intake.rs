//! Transaction intake
//!
//! Validates a user-submitted deposit and records it as `submitted`.
//! Hash uniqueness comes from the store's atomic insert, not a pre-read.

use serde::Deserialize;
use tracing::{info, warn};
use trueservices_common::{Cryptocurrency, Error, Result, TransactionHash, Usd};

use crate::models::{NewTransaction, Transaction, TransactionStatus};
use crate::storage::{InsertOutcome, Store};

/// Body of `POST /transactions`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransactionRequest {
    pub user_id: Option<u64>,
    pub cryptocurrency: Option<String>,
    pub amount: Option<Usd>,
    pub transaction_hash: Option<String>,
    pub status: Option<String>,
}

/// Validated intake input
#[derive(Debug, Clone)]
pub struct ValidSubmission {
    pub user_id: u64,
    pub cryptocurrency: Cryptocurrency,
    pub transaction_hash: TransactionHash,
    pub claimed_amount: Usd,
}

impl SubmitTransactionRequest {
    /// Check presence and shape of every field, in taxonomy order:
    /// missing fields, amount, cryptocurrency, hash, status
    pub fn validate(self) -> Result<ValidSubmission> {
        let mut missing = Vec::new();
        if self.user_id.is_none() {
            missing.push("userId");
        }
        if blank(&self.cryptocurrency) {
            missing.push("cryptocurrency");
        }
        if self.amount.is_none() {
            missing.push("amount");
        }
        if blank(&self.transaction_hash) {
            missing.push("transactionHash");
        }
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let claimed_amount = self.amount.unwrap_or_default();
        if !claimed_amount.is_positive() {
            return Err(Error::InvalidAmount(
                "Amount must be greater than zero".to_string(),
            ));
        }

        let cryptocurrency: Cryptocurrency =
            self.cryptocurrency.as_deref().unwrap_or_default().parse()?;
        let transaction_hash =
            TransactionHash::parse(self.transaction_hash.as_deref().unwrap_or_default())?;

        if let Some(status) = self.status.as_deref() {
            if status.parse::<TransactionStatus>()? != TransactionStatus::Submitted {
                return Err(Error::Validation(format!(
                    "New transactions must be submitted as pending, got '{}'",
                    status
                )));
            }
        }

        Ok(ValidSubmission {
            user_id: self.user_id.unwrap_or_default(),
            cryptocurrency,
            transaction_hash,
            claimed_amount,
        })
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Record a validated submission
pub async fn submit(store: &dyn Store, submission: ValidSubmission) -> Result<Transaction> {
    let new = NewTransaction {
        user_id: submission.user_id,
        cryptocurrency: submission.cryptocurrency,
        transaction_hash: submission.transaction_hash.clone(),
        claimed_amount: Some(submission.claimed_amount),
    };

    match store.insert_transaction(&new).await? {
        InsertOutcome::Inserted(transaction) => {
            info!(
                "Transaction {} submitted: user={}, {} {}, claimed {}",
                transaction.id,
                transaction.user_id,
                transaction.cryptocurrency,
                transaction.transaction_hash,
                submission.claimed_amount
            );
            Ok(transaction)
        }
        InsertOutcome::Duplicate(existing) => {
            warn!(
                "Duplicate submission of {} (already transaction {})",
                submission.transaction_hash, existing
            );
            Err(Error::DuplicateTransaction(
                submission.transaction_hash.to_string(),
            ))
        }
        InsertOutcome::UnknownUser => Err(Error::UserNotFound(submission.user_id)),
    }
}
