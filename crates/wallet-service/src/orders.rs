//! Orders paid from the wallet balance
//!
//! Placing an order debits the balance in one store step. Staff then move
//! the order through its payment and delivery state machines.

use serde::Deserialize;
use tracing::{info, warn};
use trueservices_common::{Error, Result, Usd};

use crate::models::{DeliveryStatus, ItemKind, NewOrder, Order, PaymentStatus};
use crate::storage::{OrderOutcome, RefundOutcome, Store};

/// Body of `POST /orders`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: Option<u64>,
    pub item_kind: Option<String>,
    pub item_id: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Usd>,
}

impl CreateOrderRequest {
    pub fn validate(self) -> Result<NewOrder> {
        let (Some(user_id), Some(item_kind), Some(item_id), Some(amount)) =
            (self.user_id, self.item_kind, self.item_id, self.amount)
        else {
            return Err(Error::Validation(
                "Missing required fields: userId, itemKind, itemId, amount".to_string(),
            ));
        };

        let item_id = item_id.trim().to_string();
        if item_id.is_empty() {
            return Err(Error::Validation("itemId must not be empty".to_string()));
        }

        if !amount.is_positive() {
            return Err(Error::InvalidAmount(
                "Amount must be greater than zero".to_string(),
            ));
        }

        Ok(NewOrder {
            user_id,
            item_kind: item_kind.parse::<ItemKind>()?,
            item_id,
            description: self.description.filter(|d| !d.trim().is_empty()),
            amount,
        })
    }
}

/// Body of the status PATCH routes
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

/// Debit the user's balance and record the order
pub async fn place(store: &dyn Store, new: NewOrder) -> Result<(Order, Usd)> {
    let user_id = new.user_id;
    let required = new.amount;

    match store.place_order(&new).await? {
        OrderOutcome::Placed { order, new_balance } => {
            info!(
                "Order {} placed: user={}, {} {}, {}, +{} points",
                order.id,
                order.user_id,
                order.item_kind.as_str(),
                order.item_id,
                order.amount,
                order.loyalty_points
            );
            Ok((order, new_balance))
        }
        OrderOutcome::InsufficientFunds { balance } => {
            warn!(
                "User {} cannot afford {} (balance {})",
                user_id, required, balance
            );
            Err(Error::InsufficientFunds { balance, required })
        }
        OrderOutcome::UnknownUser => Err(Error::UserNotFound(user_id)),
    }
}

async fn load(store: &dyn Store, id: u64) -> Result<Order> {
    store.get_order(id).await?.ok_or(Error::OrderNotFound(id))
}

/// Apply a staff payment-status change. Refunds credit the balance back once.
pub async fn update_payment_status(
    store: &dyn Store,
    id: u64,
    next: PaymentStatus,
) -> Result<Order> {
    let order = load(store, id).await?;

    let invalid = |from: PaymentStatus| Error::InvalidTransition {
        field: "payment status",
        from: from.as_str().to_string(),
        to: next.as_str().to_string(),
    };

    if !order.payment_status.can_transition_to(next) {
        return Err(invalid(order.payment_status));
    }

    match store.refund_order(id, order.user_id).await? {
        RefundOutcome::Refunded { new_balance } => {
            info!(
                "Order {} refunded: {} back to user {}, balance now {}",
                id, order.amount, order.user_id, new_balance
            );
        }
        // A concurrent refund got there first
        RefundOutcome::NotPaid => return Err(invalid(PaymentStatus::Refunded)),
        RefundOutcome::UnknownOrder => return Err(Error::OrderNotFound(id)),
    }

    load(store, id).await
}

/// Apply a staff delivery-status change
pub async fn update_delivery_status(
    store: &dyn Store,
    id: u64,
    next: DeliveryStatus,
) -> Result<Order> {
    let order = load(store, id).await?;
    let current = order.delivery_status;

    if current.can_transition_to(next) && store.set_delivery_status(id, current, next).await? {
        info!("Order {} delivery: {} -> {}", id, current.as_str(), next.as_str());
        return load(store, id).await;
    }

    // Either an illegal move or the status changed underneath us
    let from = load(store, id).await?.delivery_status;
    Err(Error::InvalidTransition {
        field: "delivery status",
        from: from.as_str().to_string(),
        to: next.as_str().to_string(),
    })
}
