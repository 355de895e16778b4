//! Data models for the wallet service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use trueservices_common::{Cryptocurrency, Error, TransactionHash, Usd};

/// A storefront user and their wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub email: String,
    pub display_name: String,

    /// Spendable USD credit
    pub balance: Usd,

    pub loyalty_points: i64,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a deposit transaction
///
/// `Verified` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded, not yet checked on chain
    Submitted,
    /// Seen on chain but below the confirmation threshold
    Confirming,
    /// Credited to the user's balance
    Verified,
    /// Paid the wrong recipient or carried no value
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Submitted => "submitted",
            TransactionStatus::Confirming => "confirming",
            TransactionStatus::Verified => "verified",
            TransactionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Verified | TransactionStatus::Rejected
        )
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "pending" is what storefront clients send on intake
            "submitted" | "pending" => Ok(TransactionStatus::Submitted),
            "confirming" => Ok(TransactionStatus::Confirming),
            "verified" => Ok(TransactionStatus::Verified),
            "rejected" => Ok(TransactionStatus::Rejected),
            other => Err(Error::Validation(format!(
                "Unknown transaction status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deposit transaction submitted by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: u64,
    pub user_id: u64,
    pub cryptocurrency: Cryptocurrency,
    pub transaction_hash: TransactionHash,

    /// USD value the submitter asserted, informational only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_amount: Option<Usd>,

    /// USD value credited, set on verification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Usd>,

    pub status: TransactionStatus,

    /// Confirmations observed at the last check
    pub confirmations: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

/// Fields for a transaction about to be recorded
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: u64,
    pub cryptocurrency: Cryptocurrency,
    pub transaction_hash: TransactionHash,
    pub claimed_amount: Option<Usd>,
}

impl NewTransaction {
    /// Materialise the stored row under `id`
    pub fn into_transaction(self, id: u64, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            user_id: self.user_id,
            cryptocurrency: self.cryptocurrency,
            transaction_hash: self.transaction_hash,
            claimed_amount: self.claimed_amount,
            amount: None,
            status: TransactionStatus::Submitted,
            confirmations: 0,
            rejection_reason: None,
            created_at,
            verified_at: None,
        }
    }
}

/// An operator-controlled address users send deposits to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositAddress {
    pub address: String,
    pub cryptocurrency: Cryptocurrency,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl DepositAddress {
    pub fn new(address: String, cryptocurrency: Cryptocurrency, label: Option<String>) -> Self {
        Self {
            address,
            cryptocurrency,
            label,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// What an order buys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Gift-card-style digital product
    Product,
    /// Proxy-ordered food delivery
    Service,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Product => "product",
            ItemKind::Service => "service",
        }
    }
}

impl FromStr for ItemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(ItemKind::Product),
            "service" => Ok(ItemKind::Service),
            other => Err(Error::Validation(format!("Unknown item kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!((self, next), (PaymentStatus::Paid, PaymentStatus::Refunded))
    }
}

impl FromStr for PaymentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(Error::Validation(format!(
                "Unknown payment status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }

    /// pending → processing → delivered, cancellation from any open state
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Delivered)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

impl FromStr for DeliveryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "processing" => Ok(DeliveryStatus::Processing),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "cancelled" => Ok(DeliveryStatus::Cancelled),
            other => Err(Error::Validation(format!(
                "Unknown delivery status: {}",
                other
            ))),
        }
    }
}

/// A purchase paid from the wallet balance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    pub user_id: u64,
    pub item_kind: ItemKind,
    pub item_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub amount: Usd,
    pub payment_status: PaymentStatus,
    pub delivery_status: DeliveryStatus,

    /// Points granted to the user for this order
    pub loyalty_points: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for an order about to be placed
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: u64,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub description: Option<String>,
    pub amount: Usd,
}

impl NewOrder {
    /// One loyalty point per whole dollar spent
    pub fn loyalty_points(&self) -> i64 {
        self.amount.whole_dollars()
    }

    pub fn into_order(self, id: u64, created_at: DateTime<Utc>) -> Order {
        let loyalty_points = self.loyalty_points();
        Order {
            id,
            user_id: self.user_id,
            item_kind: self.item_kind,
            item_id: self.item_id,
            description: self.description,
            amount: self.amount,
            payment_status: PaymentStatus::Paid,
            delivery_status: DeliveryStatus::Pending,
            loyalty_points,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Aggregate figures for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_users: usize,
    pub total_transactions: usize,
    pub submitted_transactions: usize,
    pub confirming_transactions: usize,
    pub verified_transactions: usize,
    pub rejected_transactions: usize,
    pub total_credited: Usd,
    pub total_orders: usize,
}

impl Stats {
    /// Count a transaction towards the per-status totals
    pub fn record_transaction(&mut self, status: TransactionStatus, amount: Option<Usd>) {
        self.total_transactions += 1;
        match status {
            TransactionStatus::Submitted => self.submitted_transactions += 1,
            TransactionStatus::Confirming => self.confirming_transactions += 1,
            TransactionStatus::Rejected => self.rejected_transactions += 1,
            TransactionStatus::Verified => {
                self.verified_transactions += 1;
                if let Some(total) = amount.and_then(|a| self.total_credited.checked_add(a)) {
                    self.total_credited = total;
                }
            }
        }
    }
}
