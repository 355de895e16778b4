//! Redis storage
//!
//! Data model:
//! - user:{id} → Hash (email, display_name, balance_cents, loyalty_points, created_at)
//! - user:email:{email} → user id (uniqueness index)
//! - users:all → Set of user ids
//! - deposit_address:{address} → Hash, deposit_addresses:all → Set of addresses
//! - transaction:{id} → Hash with transaction fields
//! - transaction_hash:{hash} → transaction id (uniqueness index)
//! - user:{id}:transactions → Sorted set (score = id)
//! - transactions:all → Set of transaction ids
//! - order:{id} → Hash, user:{id}:orders → Sorted set, orders:all → Set
//!
//! Multi-key mutations run as Lua scripts, which Redis executes atomically.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use std::collections::HashMap;
use tracing::{debug, info};
use trueservices_common::{Cryptocurrency, Error, Result, TransactionHash, Usd};

use super::{CreditOutcome, InsertOutcome, OrderOutcome, RefundOutcome, Store};
use crate::models::{
    DeliveryStatus, DepositAddress, NewOrder, NewTransaction, Order, Stats, Transaction,
    TransactionStatus, User,
};

/// KEYS: email index, user hash, users:all
/// ARGV: id, email, display_name, created_at
const CREATE_USER: &str = r#"
if redis.call('SETNX', KEYS[1], ARGV[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[2],
  'id', ARGV[1], 'email', ARGV[2], 'display_name', ARGV[3],
  'balance_cents', 0, 'loyalty_points', 0, 'created_at', ARGV[4])
redis.call('SADD', KEYS[3], ARGV[1])
return 1
"#;

/// KEYS: deposit_addresses:all, address hash
/// ARGV: address, cryptocurrency, label, is_active, created_at
const ADD_DEPOSIT_ADDRESS: &str = r#"
if redis.call('SADD', KEYS[1], ARGV[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[2],
  'address', ARGV[1], 'cryptocurrency', ARGV[2], 'label', ARGV[3],
  'is_active', ARGV[4], 'created_at', ARGV[5])
return 1
"#;

/// KEYS: address hash
/// ARGV: is_active
const SET_ADDRESS_ACTIVE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], 'is_active', ARGV[1])
return 1
"#;

/// KEYS: hash index, transaction hash, user hash, user transactions, transactions:all
/// ARGV: id, user_id, cryptocurrency, tx hash, claimed cents, created_at
///
/// Returns 0 when inserted, -1 for an unknown user, or the id already holding the hash.
const INSERT_TRANSACTION: &str = r#"
if redis.call('EXISTS', KEYS[3]) == 0 then
  return -1
end
if redis.call('SETNX', KEYS[1], ARGV[1]) == 0 then
  return tonumber(redis.call('GET', KEYS[1]))
end
redis.call('HSET', KEYS[2],
  'id', ARGV[1], 'user_id', ARGV[2], 'cryptocurrency', ARGV[3],
  'transaction_hash', ARGV[4], 'claimed_amount_cents', ARGV[5],
  'amount_cents', '', 'status', 'submitted', 'confirmations', 0,
  'rejection_reason', '', 'created_at', ARGV[6], 'verified_at', '')
redis.call('ZADD', KEYS[4], ARGV[1], ARGV[1])
redis.call('SADD', KEYS[5], ARGV[1])
return 0
"#;

/// KEYS: transaction hash
/// ARGV: status, field, value
const ADVANCE_OPEN_TRANSACTION: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if status ~= 'submitted' and status ~= 'confirming' then
  return 0
end
redis.call('HSET', KEYS[1], 'status', ARGV[1], ARGV[2], ARGV[3])
return 1
"#;

/// KEYS: transaction hash, user hash
/// ARGV: amount cents, confirmations, verified_at
const CREDIT_TRANSACTION: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
  return {-1, 0}
end
if status == 'verified' then
  return {-2, 0}
end
if status == 'rejected' then
  return {-3, 0}
end
if redis.call('EXISTS', KEYS[2]) == 0 then
  return {-4, 0}
end
redis.call('HSET', KEYS[1],
  'status', 'verified', 'amount_cents', ARGV[1],
  'confirmations', ARGV[2], 'verified_at', ARGV[3])
local balance = redis.call('HINCRBY', KEYS[2], 'balance_cents', ARGV[1])
return {1, balance}
"#;

/// KEYS: user hash, order hash, user orders, orders:all
/// ARGV: id, user_id, item_kind, item_id, description, amount cents, points, now
const PLACE_ORDER: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return {-1, 0}
end
local balance = tonumber(redis.call('HGET', KEYS[1], 'balance_cents') or '0')
local amount = tonumber(ARGV[6])
if balance < amount then
  return {-2, balance}
end
balance = redis.call('HINCRBY', KEYS[1], 'balance_cents', -amount)
redis.call('HINCRBY', KEYS[1], 'loyalty_points', ARGV[7])
redis.call('HSET', KEYS[2],
  'id', ARGV[1], 'user_id', ARGV[2], 'item_kind', ARGV[3], 'item_id', ARGV[4],
  'description', ARGV[5], 'amount_cents', ARGV[6], 'payment_status', 'paid',
  'delivery_status', 'pending', 'loyalty_points', ARGV[7],
  'created_at', ARGV[8], 'updated_at', ARGV[8])
redis.call('ZADD', KEYS[3], ARGV[1], ARGV[1])
redis.call('SADD', KEYS[4], ARGV[1])
return {1, balance}
"#;

/// KEYS: order hash, user hash
/// ARGV: now
const REFUND_ORDER: &str = r#"
local status = redis.call('HGET', KEYS[1], 'payment_status')
if not status then
  return {-1, 0}
end
if status ~= 'paid' then
  return {-2, 0}
end
local amount = tonumber(redis.call('HGET', KEYS[1], 'amount_cents'))
local points = tonumber(redis.call('HGET', KEYS[1], 'loyalty_points') or '0')
redis.call('HSET', KEYS[1], 'payment_status', 'refunded', 'updated_at', ARGV[1])
local balance = redis.call('HINCRBY', KEYS[2], 'balance_cents', amount)
redis.call('HINCRBY', KEYS[2], 'loyalty_points', -points)
return {1, balance}
"#;

/// KEYS: order hash
/// ARGV: expected, next, now
const SET_DELIVERY_STATUS: &str = r#"
if redis.call('HGET', KEYS[1], 'delivery_status') ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'delivery_status', ARGV[2], 'updated_at', ARGV[3])
return 1
"#;

fn redis_err(e: redis::RedisError) -> Error {
    Error::Redis(e.to_string())
}

fn user_key(id: u64) -> String {
    format!("user:{}", id)
}

fn transaction_key(id: u64) -> String {
    format!("transaction:{}", id)
}

fn order_key(id: u64) -> String {
    format!("order:{}", id)
}

fn address_key(address: &str) -> String {
    format!("deposit_address:{}", address)
}

/// Redis-backed store
pub struct RedisStore {
    conn: ConnectionManager,
    create_user: Script,
    add_deposit_address: Script,
    set_address_active: Script,
    insert_transaction: Script,
    advance_open_transaction: Script,
    credit_transaction: Script,
    place_order: Script,
    refund_order: Script,
    set_delivery_status: Script,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Successfully connected to Redis");

        Ok(Self {
            conn,
            create_user: Script::new(CREATE_USER),
            add_deposit_address: Script::new(ADD_DEPOSIT_ADDRESS),
            set_address_active: Script::new(SET_ADDRESS_ACTIVE),
            insert_transaction: Script::new(INSERT_TRANSACTION),
            advance_open_transaction: Script::new(ADVANCE_OPEN_TRANSACTION),
            credit_transaction: Script::new(CREDIT_TRANSACTION),
            place_order: Script::new(PLACE_ORDER),
            refund_order: Script::new(REFUND_ORDER),
            set_delivery_status: Script::new(SET_DELIVERY_STATUS),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn next_id(&self, counter: &str) -> Result<u64> {
        self.conn().incr(counter, 1u64).await.map_err(redis_err)
    }

    async fn fields(&self, key: &str) -> Result<Option<HashMap<String, String>>> {
        let map: HashMap<String, String> = self.conn().hgetall(key).await.map_err(redis_err)?;
        Ok(if map.is_empty() { None } else { Some(map) })
    }

    async fn transactions_by_ids(&self, ids: Vec<u64>) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(tx) = self.get_transaction(id).await? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }
}

fn field<'a>(map: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    map.get(name).map(String::as_str).filter(|s| !s.is_empty())
}

fn parse_field<T: std::str::FromStr>(map: &HashMap<String, String>, name: &str) -> Result<T> {
    field(map, name)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Redis(format!("Missing or invalid field '{}'", name)))
}

fn parse_time(map: &HashMap<String, String>, name: &str) -> Option<DateTime<Utc>> {
    field(map, name)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_cents(map: &HashMap<String, String>, name: &str) -> Option<Usd> {
    field(map, name)
        .and_then(|s| s.parse().ok())
        .map(Usd::from_cents)
}

fn parse_user(map: &HashMap<String, String>) -> Result<User> {
    Ok(User {
        id: parse_field(map, "id")?,
        email: field(map, "email").unwrap_or_default().to_string(),
        display_name: field(map, "display_name").unwrap_or_default().to_string(),
        balance: parse_cents(map, "balance_cents").unwrap_or(Usd::ZERO),
        loyalty_points: field(map, "loyalty_points")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        created_at: parse_time(map, "created_at").unwrap_or_else(Utc::now),
    })
}

fn parse_transaction(map: &HashMap<String, String>) -> Result<Transaction> {
    let hash: String = parse_field(map, "transaction_hash")?;
    Ok(Transaction {
        id: parse_field(map, "id")?,
        user_id: parse_field(map, "user_id")?,
        cryptocurrency: parse_field::<Cryptocurrency>(map, "cryptocurrency")?,
        transaction_hash: TransactionHash::parse(&hash)?,
        claimed_amount: parse_cents(map, "claimed_amount_cents"),
        amount: parse_cents(map, "amount_cents"),
        status: parse_field(map, "status")?,
        confirmations: field(map, "confirmations")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        rejection_reason: field(map, "rejection_reason").map(str::to_string),
        created_at: parse_time(map, "created_at").unwrap_or_else(Utc::now),
        verified_at: parse_time(map, "verified_at"),
    })
}

fn parse_address(map: &HashMap<String, String>) -> Result<DepositAddress> {
    Ok(DepositAddress {
        address: parse_field(map, "address")?,
        cryptocurrency: parse_field(map, "cryptocurrency")?,
        label: field(map, "label").map(str::to_string),
        is_active: field(map, "is_active") == Some("true"),
        created_at: parse_time(map, "created_at").unwrap_or_else(Utc::now),
    })
}

fn parse_order(map: &HashMap<String, String>) -> Result<Order> {
    Ok(Order {
        id: parse_field(map, "id")?,
        user_id: parse_field(map, "user_id")?,
        item_kind: parse_field(map, "item_kind")?,
        item_id: field(map, "item_id").unwrap_or_default().to_string(),
        description: field(map, "description").map(str::to_string),
        amount: parse_cents(map, "amount_cents").unwrap_or(Usd::ZERO),
        payment_status: parse_field(map, "payment_status")?,
        delivery_status: parse_field(map, "delivery_status")?,
        loyalty_points: field(map, "loyalty_points")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        created_at: parse_time(map, "created_at").unwrap_or_else(Utc::now),
        updated_at: parse_time(map, "updated_at").unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl Store for RedisStore {
    async fn health_check(&self) -> Result<()> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.conn())
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn create_user(&self, email: &str, display_name: &str) -> Result<Option<User>> {
        let id = self.next_id("users:next_id").await?;
        let created_at = Utc::now();

        let created: i64 = self
            .create_user
            .key(format!("user:email:{}", email.to_lowercase()))
            .key(user_key(id))
            .key("users:all")
            .arg(id)
            .arg(email)
            .arg(display_name)
            .arg(created_at.to_rfc3339())
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;

        if created == 0 {
            debug!("Email {} already registered", email);
            return Ok(None);
        }

        info!("Created user {}", id);
        Ok(Some(User {
            id,
            email: email.to_string(),
            display_name: display_name.to_string(),
            balance: Usd::ZERO,
            loyalty_points: 0,
            created_at,
        }))
    }

    async fn get_user(&self, id: u64) -> Result<Option<User>> {
        self.fields(&user_key(id))
            .await?
            .map(|map| parse_user(&map))
            .transpose()
    }

    async fn add_deposit_address(&self, address: &DepositAddress) -> Result<bool> {
        let added: i64 = self
            .add_deposit_address
            .key("deposit_addresses:all")
            .key(address_key(&address.address))
            .arg(&address.address)
            .arg(address.cryptocurrency.code())
            .arg(address.label.as_deref().unwrap_or(""))
            .arg(if address.is_active { "true" } else { "false" })
            .arg(address.created_at.to_rfc3339())
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;

        if added == 0 {
            debug!("Deposit address {} already registered", address.address);
            return Ok(false);
        }

        info!(
            "Registered {} deposit address {}",
            address.cryptocurrency, address.address
        );
        Ok(true)
    }

    async fn get_deposit_address(&self, address: &str) -> Result<Option<DepositAddress>> {
        self.fields(&address_key(address))
            .await?
            .map(|map| parse_address(&map))
            .transpose()
    }

    async fn list_deposit_addresses(&self) -> Result<Vec<DepositAddress>> {
        let addresses: Vec<String> = self
            .conn()
            .smembers("deposit_addresses:all")
            .await
            .map_err(redis_err)?;

        let mut result = Vec::with_capacity(addresses.len());
        for address in addresses {
            if let Some(entry) = self.get_deposit_address(&address).await? {
                result.push(entry);
            }
        }
        result.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(result)
    }

    async fn set_deposit_address_active(&self, address: &str, active: bool) -> Result<bool> {
        let updated: i64 = self
            .set_address_active
            .key(address_key(address))
            .arg(if active { "true" } else { "false" })
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;
        Ok(updated == 1)
    }

    async fn insert_transaction(&self, new: &NewTransaction) -> Result<InsertOutcome> {
        let id = self.next_id("transactions:next_id").await?;
        let created_at = Utc::now();
        let claimed = new
            .claimed_amount
            .map(|a| a.cents().to_string())
            .unwrap_or_default();

        let result: i64 = self
            .insert_transaction
            .key(format!("transaction_hash:{}", new.transaction_hash))
            .key(transaction_key(id))
            .key(user_key(new.user_id))
            .key(format!("user:{}:transactions", new.user_id))
            .key("transactions:all")
            .arg(id)
            .arg(new.user_id)
            .arg(new.cryptocurrency.code())
            .arg(new.transaction_hash.as_str())
            .arg(claimed)
            .arg(created_at.to_rfc3339())
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;

        Ok(match result {
            0 => InsertOutcome::Inserted(new.clone().into_transaction(id, created_at)),
            -1 => InsertOutcome::UnknownUser,
            existing => InsertOutcome::Duplicate(existing as u64),
        })
    }

    async fn get_transaction(&self, id: u64) -> Result<Option<Transaction>> {
        self.fields(&transaction_key(id))
            .await?
            .map(|map| parse_transaction(&map))
            .transpose()
    }

    async fn find_transaction_by_hash(
        &self,
        hash: &TransactionHash,
    ) -> Result<Option<Transaction>> {
        let id: Option<u64> = self
            .conn()
            .get(format!("transaction_hash:{}", hash))
            .await
            .map_err(redis_err)?;

        match id {
            Some(id) => self.get_transaction(id).await,
            None => Ok(None),
        }
    }

    async fn list_user_transactions(&self, user_id: u64) -> Result<Vec<Transaction>> {
        let ids: Vec<u64> = self
            .conn()
            .zrange(format!("user:{}:transactions", user_id), 0, -1)
            .await
            .map_err(redis_err)?;
        self.transactions_by_ids(ids).await
    }

    async fn mark_confirming(&self, id: u64, confirmations: u32) -> Result<bool> {
        let updated: i64 = self
            .advance_open_transaction
            .key(transaction_key(id))
            .arg(TransactionStatus::Confirming.as_str())
            .arg("confirmations")
            .arg(confirmations)
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;
        Ok(updated == 1)
    }

    async fn reject_transaction(&self, id: u64, reason: &str) -> Result<bool> {
        let updated: i64 = self
            .advance_open_transaction
            .key(transaction_key(id))
            .arg(TransactionStatus::Rejected.as_str())
            .arg("rejection_reason")
            .arg(reason)
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;
        Ok(updated == 1)
    }

    async fn credit_transaction(
        &self,
        id: u64,
        user_id: u64,
        amount: Usd,
        confirmations: u32,
    ) -> Result<CreditOutcome> {
        let (code, balance): (i64, i64) = self
            .credit_transaction
            .key(transaction_key(id))
            .key(user_key(user_id))
            .arg(amount.cents())
            .arg(confirmations)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;

        Ok(match code {
            1 => CreditOutcome::Credited {
                new_balance: Usd::from_cents(balance),
            },
            -2 => CreditOutcome::AlreadyVerified,
            -3 => CreditOutcome::Rejected,
            -4 => CreditOutcome::UnknownUser,
            _ => CreditOutcome::UnknownTransaction,
        })
    }

    async fn place_order(&self, new: &NewOrder) -> Result<OrderOutcome> {
        let id = self.next_id("orders:next_id").await?;
        let now = Utc::now();
        let points = new.loyalty_points();

        let (code, balance): (i64, i64) = self
            .place_order
            .key(user_key(new.user_id))
            .key(order_key(id))
            .key(format!("user:{}:orders", new.user_id))
            .key("orders:all")
            .arg(id)
            .arg(new.user_id)
            .arg(new.item_kind.as_str())
            .arg(&new.item_id)
            .arg(new.description.as_deref().unwrap_or(""))
            .arg(new.amount.cents())
            .arg(points)
            .arg(now.to_rfc3339())
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;

        Ok(match code {
            1 => OrderOutcome::Placed {
                order: new.clone().into_order(id, now),
                new_balance: Usd::from_cents(balance),
            },
            -2 => OrderOutcome::InsufficientFunds {
                balance: Usd::from_cents(balance),
            },
            _ => OrderOutcome::UnknownUser,
        })
    }

    async fn get_order(&self, id: u64) -> Result<Option<Order>> {
        self.fields(&order_key(id))
            .await?
            .map(|map| parse_order(&map))
            .transpose()
    }

    async fn list_user_orders(&self, user_id: u64) -> Result<Vec<Order>> {
        let ids: Vec<u64> = self
            .conn()
            .zrange(format!("user:{}:orders", user_id), 0, -1)
            .await
            .map_err(redis_err)?;

        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = self.get_order(id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn refund_order(&self, id: u64, user_id: u64) -> Result<RefundOutcome> {
        let (code, balance): (i64, i64) = self
            .refund_order
            .key(order_key(id))
            .key(user_key(user_id))
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;

        Ok(match code {
            1 => RefundOutcome::Refunded {
                new_balance: Usd::from_cents(balance),
            },
            -2 => RefundOutcome::NotPaid,
            _ => RefundOutcome::UnknownOrder,
        })
    }

    async fn set_delivery_status(
        &self,
        id: u64,
        expected: DeliveryStatus,
        next: DeliveryStatus,
    ) -> Result<bool> {
        let updated: i64 = self
            .set_delivery_status
            .key(order_key(id))
            .arg(expected.as_str())
            .arg(next.as_str())
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut self.conn())
            .await
            .map_err(redis_err)?;
        Ok(updated == 1)
    }

    async fn stats(&self) -> Result<Stats> {
        let mut conn = self.conn();
        let total_users: usize = conn.scard("users:all").await.map_err(redis_err)?;
        let total_orders: usize = conn.scard("orders:all").await.map_err(redis_err)?;
        let ids: Vec<u64> = conn.smembers("transactions:all").await.map_err(redis_err)?;

        let mut stats = Stats {
            total_users,
            total_orders,
            ..Stats::default()
        };
        for tx in self.transactions_by_ids(ids).await? {
            stats.record_transaction(tx.status, tx.amount);
        }
        Ok(stats)
    }
}
