//! Ledger updates for verified deposits
//!
//! Drives a stored transaction through its state machine
//! (submitted → confirming → verified | rejected) and credits the user's
//! balance exactly once through the store's atomic credit.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use trueservices_common::{Cryptocurrency, Error, TransactionHash, Usd};

use crate::models::{NewTransaction, Transaction, TransactionStatus};
use crate::storage::{CreditOutcome, InsertOutcome, Store};
use crate::verifier::{Acceptance, Rejection, Verifier};

/// A completed credit
#[derive(Debug, Clone)]
pub struct Credit {
    pub transaction: Transaction,
    pub credited: Usd,
    pub new_balance: Usd,
}

/// Why verification did not credit the balance
#[derive(Debug)]
pub enum VerifyError {
    /// The chain does not (yet) support crediting this deposit
    Rejected(Rejection),
    /// Lookup, conflict or storage failure
    Failed(Error),
}

impl From<Error> for VerifyError {
    fn from(e: Error) -> Self {
        VerifyError::Failed(e)
    }
}

/// Input of the auto-verification route, already validated
#[derive(Debug, Clone)]
pub struct AutoVerify {
    pub user_id: u64,
    pub cryptocurrency: Cryptocurrency,
    pub transaction_hash: TransactionHash,
    pub target_address: String,
}

/// Which recipients a chain check accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecipientScope {
    /// Every active deposit address for the coin; a mismatch is final
    AllActive,
    /// Only the caller's target; a mismatch says nothing about other addresses
    Target,
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    verifier: Verifier,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, verifier: Verifier) -> Self {
        Self { store, verifier }
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Verify a stored transaction against every active deposit address for its coin
    pub async fn verify_transaction(&self, id: u64) -> Result<Credit, VerifyError> {
        let transaction = self
            .store
            .get_transaction(id)
            .await?
            .ok_or(Error::TransactionNotFound(id))?;

        match transaction.status {
            TransactionStatus::Verified => return Err(Error::AlreadyVerified(id).into()),
            TransactionStatus::Rejected => return Err(Error::TransactionRejected(id).into()),
            _ => {}
        }

        let recipients: HashSet<String> = self
            .store
            .active_deposit_addresses(transaction.cryptocurrency)
            .await?
            .into_iter()
            .collect();

        let acceptance = self
            .check_chain(&transaction, &recipients, RecipientScope::AllActive)
            .await?;
        self.credit(transaction, acceptance).await
    }

    /// Verify a payment to one named deposit address, recording it if it is new
    ///
    /// Nothing is persisted until the chain accepts the payment. A hash that
    /// an earlier call already recorded for the same user is reused so
    /// clients can poll. A mismatch against the target never rejects a
    /// stored row, since the row may still pay another active address.
    pub async fn verify_auto(&self, request: AutoVerify) -> Result<Credit, VerifyError> {
        if self.store.get_user(request.user_id).await?.is_none() {
            return Err(Error::UserNotFound(request.user_id).into());
        }

        let existing = self
            .store
            .find_transaction_by_hash(&request.transaction_hash)
            .await?;
        if let Some(tx) = &existing {
            Self::ensure_reusable(tx, &request)?;
        }

        let target = self
            .store
            .get_deposit_address(&request.target_address)
            .await?;
        let target_ok = target
            .map(|a| a.is_active && a.cryptocurrency == request.cryptocurrency)
            .unwrap_or(false);
        if !target_ok {
            warn!(
                "{} is not an active {} deposit address",
                request.target_address, request.cryptocurrency
            );
            return Err(VerifyError::Rejected(Rejection::InvalidRecipient));
        }

        let recipients: HashSet<String> = [request.target_address.clone()].into_iter().collect();

        if let Some(tx) = existing {
            let acceptance = self
                .check_chain(&tx, &recipients, RecipientScope::Target)
                .await?;
            return self.credit(tx, acceptance).await;
        }

        let acceptance = self
            .verifier
            .verify(request.cryptocurrency, &request.transaction_hash, &recipients)
            .await
            .map_err(VerifyError::Rejected)?;
        let tx = self.record(&request).await?;
        self.credit(tx, acceptance).await
    }

    fn ensure_reusable(tx: &Transaction, request: &AutoVerify) -> Result<(), Error> {
        if tx.user_id != request.user_id || tx.status == TransactionStatus::Verified {
            return Err(Error::DuplicateTransaction(
                request.transaction_hash.to_string(),
            ));
        }
        if tx.status == TransactionStatus::Rejected {
            return Err(Error::TransactionRejected(tx.id));
        }
        if tx.cryptocurrency != request.cryptocurrency {
            return Err(Error::Validation(format!(
                "Transaction {} was recorded as {}, not {}",
                request.transaction_hash, tx.cryptocurrency, request.cryptocurrency
            )));
        }
        Ok(())
    }

    async fn record(&self, request: &AutoVerify) -> Result<Transaction, Error> {
        let new = NewTransaction {
            user_id: request.user_id,
            cryptocurrency: request.cryptocurrency,
            transaction_hash: request.transaction_hash.clone(),
            claimed_amount: None,
        };

        match self.store.insert_transaction(&new).await? {
            InsertOutcome::Inserted(tx) => Ok(tx),
            InsertOutcome::UnknownUser => Err(Error::UserNotFound(request.user_id)),
            InsertOutcome::Duplicate(id) => {
                // Lost a race with another request for the same hash
                let tx = self
                    .store
                    .get_transaction(id)
                    .await?
                    .ok_or(Error::TransactionNotFound(id))?;
                Self::ensure_reusable(&tx, request)?;
                Ok(tx)
            }
        }
    }

    /// Run the verifier and persist non-crediting state changes
    async fn check_chain(
        &self,
        transaction: &Transaction,
        recipients: &HashSet<String>,
        scope: RecipientScope,
    ) -> Result<Acceptance, VerifyError> {
        let result = self
            .verifier
            .verify(
                transaction.cryptocurrency,
                &transaction.transaction_hash,
                recipients,
            )
            .await;

        match result {
            Ok(acceptance) => Ok(acceptance),
            Err(rejection) => {
                match &rejection {
                    Rejection::Unconfirmed { current, .. } => {
                        self.store.mark_confirming(transaction.id, *current).await?;
                    }
                    r if r.is_terminal() && scope == RecipientScope::AllActive => {
                        self.store
                            .reject_transaction(transaction.id, &r.to_string())
                            .await?;
                        warn!("Transaction {} rejected: {}", transaction.id, r);
                    }
                    _ => {}
                }
                Err(VerifyError::Rejected(rejection))
            }
        }
    }

    async fn credit(
        &self,
        transaction: Transaction,
        acceptance: Acceptance,
    ) -> Result<Credit, VerifyError> {
        if let Some(claimed) = transaction.claimed_amount {
            if claimed != acceptance.amount {
                warn!(
                    "Transaction {}: claimed {} but chain value is {}, crediting chain value",
                    transaction.id, claimed, acceptance.amount
                );
            }
        }

        let outcome = self
            .store
            .credit_transaction(
                transaction.id,
                transaction.user_id,
                acceptance.amount,
                acceptance.confirmations,
            )
            .await?;

        let new_balance = match outcome {
            CreditOutcome::Credited { new_balance } => new_balance,
            CreditOutcome::AlreadyVerified => {
                return Err(Error::AlreadyVerified(transaction.id).into())
            }
            CreditOutcome::Rejected => {
                return Err(Error::TransactionRejected(transaction.id).into())
            }
            CreditOutcome::UnknownTransaction => {
                return Err(Error::TransactionNotFound(transaction.id).into())
            }
            CreditOutcome::UnknownUser => {
                return Err(Error::UserNotFound(transaction.user_id).into())
            }
        };

        info!(
            "Credited {} to user {} for transaction {} ({} confirmations), balance now {}",
            acceptance.amount,
            transaction.user_id,
            transaction.id,
            acceptance.confirmations,
            new_balance
        );

        let transaction = self
            .store
            .get_transaction(transaction.id)
            .await?
            .ok_or(Error::TransactionNotFound(transaction.id))?;

        Ok(Credit {
            transaction,
            credited: acceptance.amount,
            new_balance,
        })
    }
}
