//! Persistence for users, deposits and orders
//!
//! Every multi-step mutation is a single atomic operation on the backend:
//! hash uniqueness, crediting, debiting and refunds never run as separate
//! read-then-write steps.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use async_trait::async_trait;
use trueservices_common::{Cryptocurrency, Result, TransactionHash, Usd};

use crate::models::{
    DeliveryStatus, DepositAddress, NewOrder, NewTransaction, Order, Stats, Transaction, User,
};

/// Result of recording a new transaction
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(Transaction),
    /// The hash is already recorded under this transaction id
    Duplicate(u64),
    UnknownUser,
}

/// Result of crediting a transaction to its user's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited { new_balance: Usd },
    AlreadyVerified,
    Rejected,
    UnknownTransaction,
    UnknownUser,
}

/// Result of placing an order against a balance
#[derive(Debug)]
pub enum OrderOutcome {
    Placed { order: Order, new_balance: Usd },
    InsufficientFunds { balance: Usd },
    UnknownUser,
}

/// Result of refunding an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { new_balance: Usd },
    NotPaid,
    UnknownOrder,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Verify the backend is reachable
    async fn health_check(&self) -> Result<()>;

    /// Create a user. Returns `None` if the email is already registered.
    async fn create_user(&self, email: &str, display_name: &str) -> Result<Option<User>>;

    async fn get_user(&self, id: u64) -> Result<Option<User>>;

    /// Register a deposit address. Returns `false` if it already exists.
    async fn add_deposit_address(&self, address: &DepositAddress) -> Result<bool>;

    async fn get_deposit_address(&self, address: &str) -> Result<Option<DepositAddress>>;

    async fn list_deposit_addresses(&self) -> Result<Vec<DepositAddress>>;

    /// Returns `false` if the address is unknown
    async fn set_deposit_address_active(&self, address: &str, active: bool) -> Result<bool>;

    /// Active addresses for one coin
    async fn active_deposit_addresses(&self, crypto: Cryptocurrency) -> Result<Vec<String>> {
        Ok(self
            .list_deposit_addresses()
            .await?
            .into_iter()
            .filter(|a| a.is_active && a.cryptocurrency == crypto)
            .map(|a| a.address)
            .collect())
    }

    /// Record a transaction as `submitted`, atomically claiming its hash
    async fn insert_transaction(&self, new: &NewTransaction) -> Result<InsertOutcome>;

    async fn get_transaction(&self, id: u64) -> Result<Option<Transaction>>;

    async fn find_transaction_by_hash(&self, hash: &TransactionHash) -> Result<Option<Transaction>>;

    async fn list_user_transactions(&self, user_id: u64) -> Result<Vec<Transaction>>;

    /// Move a non-terminal transaction to `confirming`.
    /// Returns `false` if it is terminal or unknown.
    async fn mark_confirming(&self, id: u64, confirmations: u32) -> Result<bool>;

    /// Move a non-terminal transaction to `rejected`. Returns `false` if it is terminal or unknown.
    async fn reject_transaction(&self, id: u64, reason: &str) -> Result<bool>;

    /// Mark the transaction verified and add `amount` to its user's balance, as one step
    async fn credit_transaction(
        &self,
        id: u64,
        user_id: u64,
        amount: Usd,
        confirmations: u32,
    ) -> Result<CreditOutcome>;

    /// Debit the balance and record the order, as one step
    async fn place_order(&self, new: &NewOrder) -> Result<OrderOutcome>;

    async fn get_order(&self, id: u64) -> Result<Option<Order>>;

    async fn list_user_orders(&self, user_id: u64) -> Result<Vec<Order>>;

    /// Mark a paid order refunded and credit its amount back, as one step
    async fn refund_order(&self, id: u64, user_id: u64) -> Result<RefundOutcome>;

    /// Compare-and-set the delivery status. Returns `false` if `expected` no longer holds.
    async fn set_delivery_status(
        &self,
        id: u64,
        expected: DeliveryStatus,
        next: DeliveryStatus,
    ) -> Result<bool>;

    async fn stats(&self) -> Result<Stats>;
}
