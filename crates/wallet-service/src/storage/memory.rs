//! In-process store for development and tests
//!
//! A single lock guards all state, so every trait operation is atomic.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use trueservices_common::{Result, TransactionHash, Usd};

use super::{CreditOutcome, InsertOutcome, OrderOutcome, RefundOutcome, Store};
use crate::models::{
    DeliveryStatus, DepositAddress, NewOrder, NewTransaction, Order, PaymentStatus, Stats,
    Transaction, TransactionStatus, User,
};

#[derive(Default)]
struct Inner {
    next_user_id: u64,
    users: BTreeMap<u64, User>,
    emails: HashMap<String, u64>,
    addresses: BTreeMap<String, DepositAddress>,
    next_transaction_id: u64,
    transactions: BTreeMap<u64, Transaction>,
    hashes: HashMap<TransactionHash, u64>,
    next_order_id: u64,
    orders: BTreeMap<u64, Order>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn create_user(&self, email: &str, display_name: &str) -> Result<Option<User>> {
        let mut inner = self.inner.lock().await;
        let email_key = email.to_lowercase();

        if inner.emails.contains_key(&email_key) {
            return Ok(None);
        }

        inner.next_user_id += 1;
        let user = User {
            id: inner.next_user_id,
            email: email.to_string(),
            display_name: display_name.to_string(),
            balance: Usd::ZERO,
            loyalty_points: 0,
            created_at: Utc::now(),
        };

        inner.emails.insert(email_key, user.id);
        inner.users.insert(user.id, user.clone());
        Ok(Some(user))
    }

    async fn get_user(&self, id: u64) -> Result<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn add_deposit_address(&self, address: &DepositAddress) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.addresses.contains_key(&address.address) {
            return Ok(false);
        }
        inner
            .addresses
            .insert(address.address.clone(), address.clone());
        Ok(true)
    }

    async fn get_deposit_address(&self, address: &str) -> Result<Option<DepositAddress>> {
        Ok(self.inner.lock().await.addresses.get(address).cloned())
    }

    async fn list_deposit_addresses(&self) -> Result<Vec<DepositAddress>> {
        Ok(self.inner.lock().await.addresses.values().cloned().collect())
    }

    async fn set_deposit_address_active(&self, address: &str, active: bool) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.addresses.get_mut(address) {
            Some(entry) => {
                entry.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_transaction(&self, new: &NewTransaction) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().await;

        if !inner.users.contains_key(&new.user_id) {
            return Ok(InsertOutcome::UnknownUser);
        }
        if let Some(existing) = inner.hashes.get(&new.transaction_hash) {
            return Ok(InsertOutcome::Duplicate(*existing));
        }

        inner.next_transaction_id += 1;
        let id = inner.next_transaction_id;
        let transaction = new.clone().into_transaction(id, Utc::now());

        inner.hashes.insert(new.transaction_hash.clone(), id);
        inner.transactions.insert(id, transaction.clone());
        Ok(InsertOutcome::Inserted(transaction))
    }

    async fn get_transaction(&self, id: u64) -> Result<Option<Transaction>> {
        Ok(self.inner.lock().await.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_hash(
        &self,
        hash: &TransactionHash,
    ) -> Result<Option<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .hashes
            .get(hash)
            .and_then(|id| inner.transactions.get(id))
            .cloned())
    }

    async fn list_user_transactions(&self, user_id: u64) -> Result<Vec<Transaction>> {
        Ok(self
            .inner
            .lock()
            .await
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_confirming(&self, id: u64, confirmations: u32) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.transactions.get_mut(&id) {
            Some(tx) if !tx.status.is_terminal() => {
                tx.status = TransactionStatus::Confirming;
                tx.confirmations = confirmations;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reject_transaction(&self, id: u64, reason: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.transactions.get_mut(&id) {
            Some(tx) if !tx.status.is_terminal() => {
                tx.status = TransactionStatus::Rejected;
                tx.rejection_reason = Some(reason.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn credit_transaction(
        &self,
        id: u64,
        user_id: u64,
        amount: Usd,
        confirmations: u32,
    ) -> Result<CreditOutcome> {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;

        let Some(tx) = inner.transactions.get_mut(&id) else {
            return Ok(CreditOutcome::UnknownTransaction);
        };
        match tx.status {
            TransactionStatus::Verified => return Ok(CreditOutcome::AlreadyVerified),
            TransactionStatus::Rejected => return Ok(CreditOutcome::Rejected),
            _ => {}
        }
        let Some(user) = inner.users.get_mut(&user_id) else {
            return Ok(CreditOutcome::UnknownUser);
        };

        tx.status = TransactionStatus::Verified;
        tx.amount = Some(amount);
        tx.confirmations = confirmations;
        tx.verified_at = Some(Utc::now());
        user.balance = Usd::from_cents(user.balance.cents() + amount.cents());

        Ok(CreditOutcome::Credited {
            new_balance: user.balance,
        })
    }

    async fn place_order(&self, new: &NewOrder) -> Result<OrderOutcome> {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;

        let Some(user) = inner.users.get_mut(&new.user_id) else {
            return Ok(OrderOutcome::UnknownUser);
        };
        if user.balance < new.amount {
            return Ok(OrderOutcome::InsufficientFunds {
                balance: user.balance,
            });
        }

        inner.next_order_id += 1;
        let order = new.clone().into_order(inner.next_order_id, Utc::now());

        user.balance = Usd::from_cents(user.balance.cents() - order.amount.cents());
        user.loyalty_points += order.loyalty_points;
        let new_balance = user.balance;

        inner.orders.insert(order.id, order.clone());
        Ok(OrderOutcome::Placed { order, new_balance })
    }

    async fn get_order(&self, id: u64) -> Result<Option<Order>> {
        Ok(self.inner.lock().await.orders.get(&id).cloned())
    }

    async fn list_user_orders(&self, user_id: u64) -> Result<Vec<Order>> {
        Ok(self
            .inner
            .lock()
            .await
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn refund_order(&self, id: u64, user_id: u64) -> Result<RefundOutcome> {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;

        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(RefundOutcome::UnknownOrder);
        };
        if order.payment_status != PaymentStatus::Paid {
            return Ok(RefundOutcome::NotPaid);
        }
        let Some(user) = inner.users.get_mut(&user_id) else {
            return Ok(RefundOutcome::UnknownOrder);
        };

        order.payment_status = PaymentStatus::Refunded;
        order.updated_at = Utc::now();
        user.balance = Usd::from_cents(user.balance.cents() + order.amount.cents());
        user.loyalty_points -= order.loyalty_points;

        Ok(RefundOutcome::Refunded {
            new_balance: user.balance,
        })
    }

    async fn set_delivery_status(
        &self,
        id: u64,
        expected: DeliveryStatus,
        next: DeliveryStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&id) {
            Some(order) if order.delivery_status == expected => {
                order.delivery_status = next;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stats(&self) -> Result<Stats> {
        let inner = self.inner.lock().await;
        let mut stats = Stats {
            total_users: inner.users.len(),
            total_orders: inner.orders.len(),
            ..Stats::default()
        };
        for tx in inner.transactions.values() {
            stats.record_transaction(tx.status, tx.amount);
        }
        Ok(stats)
    }
}
