//! Integration tests for the Wallet Service API
//!
//! Drives the router with the in-memory store, the mock explorer and a
//! fixed price of 50,000 USD per coin. Some tests swap in collaborators
//! that always fail.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`
use trueservices_common::{Cryptocurrency, Error, TransactionHash};
use wallet_service::{
    create_router,
    explorer::{ChainExplorer, ChainTransaction},
    mock_explorer::MockExplorer,
    pricing::{FixedPriceOracle, PriceOracle},
    AppState, MemoryStore, Verifier,
};

const BTC_DEPOSIT: &str = "bc1qtrueservicesdeposit";

/// 0.001 BTC, worth 50.00 USD at the test price
const FIFTY_DOLLARS_SATS: u64 = 100_000;

/// An explorer that cannot be reached
struct UnreachableExplorer;

#[async_trait]
impl ChainExplorer for UnreachableExplorer {
    async fn get_transaction(
        &self,
        _crypto: Cryptocurrency,
        _hash: &TransactionHash,
    ) -> trueservices_common::Result<Option<ChainTransaction>> {
        Err(Error::Explorer("connection refused".to_string()))
    }
}

/// A price feed that refuses every request
struct UnavailablePrices;

#[async_trait]
impl PriceOracle for UnavailablePrices {
    async fn usd_price(
        &self,
        _crypto: Cryptocurrency,
        _at: DateTime<Utc>,
    ) -> trueservices_common::Result<f64> {
        Err(Error::Pricing("rate limited".to_string()))
    }
}

struct TestApp {
    app: Router,
    explorer: Arc<MockExplorer>,
}

impl TestApp {
    fn new() -> Self {
        Self::build(None, Arc::new(FixedPriceOracle::uniform(50_000.0)))
    }

    /// Chain lookups go to `chain` when given, otherwise to the mock explorer
    fn build(chain: Option<Arc<dyn ChainExplorer>>, prices: Arc<dyn PriceOracle>) -> Self {
        let explorer = Arc::new(MockExplorer::new());
        let lookups: Arc<dyn ChainExplorer> = match chain {
            Some(chain) => chain,
            None => explorer.clone(),
        };
        let verifier = Verifier::new(lookups, prices, 2);
        let state = AppState::new(
            Arc::new(MemoryStore::new()),
            verifier,
            Some(explorer.clone()),
        );

        Self {
            app: create_router(state),
            explorer,
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().uri(uri).method(method);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(body)).await
    }

    async fn create_user(&self, email: &str) -> u64 {
        let (status, json) = self
            .post("/users", json!({ "email": email, "displayName": "Test User" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        json["id"].as_u64().unwrap()
    }

    async fn register_address(&self, address: &str, crypto: &str) {
        let (status, _) = self
            .post(
                "/deposit-addresses",
                json!({ "address": address, "cryptocurrency": crypto }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn submit(&self, user_id: u64, hash: &str, amount: f64) -> u64 {
        let (status, json) = self
            .post(
                "/transactions",
                json!({
                    "userId": user_id,
                    "cryptocurrency": "BTC",
                    "amount": amount,
                    "transactionHash": hash
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
        assert_eq!(json["status"], "submitted");
        json["id"].as_u64().unwrap()
    }

    async fn broadcast(&self, hash: &str, address: &str, sats: u64, confirmations: u32) {
        self.explorer
            .broadcast(
                Cryptocurrency::Btc,
                &TransactionHash::parse(hash).unwrap(),
                vec![(address.to_string(), sats)],
                confirmations,
            )
            .await;
    }

    async fn set_confirmations(&self, hash: &str, confirmations: u32) {
        assert!(
            self.explorer
                .set_confirmations(
                    Cryptocurrency::Btc,
                    &TransactionHash::parse(hash).unwrap(),
                    confirmations,
                )
                .await
        );
    }

    async fn balance(&self, user_id: u64) -> f64 {
        let (status, json) = self.get(&format!("/users/{}", user_id)).await;
        assert_eq!(status, StatusCode::OK);
        json["balance"].as_f64().unwrap()
    }

    async fn verify(&self, transaction_id: u64) -> (StatusCode, Value) {
        self.post(
            "/transactions/verify",
            json!({ "transactionId": transaction_id }),
        )
        .await
    }

    async fn status_of(&self, transaction_id: u64) -> Value {
        let (status, json) = self.get(&format!("/transactions/{}", transaction_id)).await;
        assert_eq!(status, StatusCode::OK);
        json["status"].clone()
    }
}

fn hash(prefix: &str) -> String {
    format!("{}{}", prefix, "0".repeat(64 - prefix.len()))
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, json) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "wallet-service");
}

#[tokio::test]
async fn test_deposit_lifecycle() {
    let app = TestApp::new();
    let user_id = app.create_user("alice@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let tx_hash = "abc123";
    let tx_id = app.submit(user_id, tx_hash, 50.0).await;
    app.broadcast(tx_hash, BTC_DEPOSIT, FIFTY_DOLLARS_SATS, 0).await;

    // In the mempool: no credit
    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "TX_UNCONFIRMED");
    assert_eq!(json["details"]["current"], 0);
    assert_eq!(json["details"]["required"], 2);
    assert_eq!(app.balance(user_id).await, 0.0);

    let (_, json) = app.get(&format!("/transactions/{}", tx_id)).await;
    assert_eq!(json["status"], "confirming");

    app.explorer.mine_block().await;
    app.explorer.mine_block().await;

    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["creditedAmount"], 50.0);
    assert_eq!(json["newBalance"], 50.0);
    assert_eq!(json["transaction"]["status"], "verified");
    assert_eq!(json["transaction"]["amount"], 50.0);

    // Third call: refused, balance unchanged
    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "ALREADY_VERIFIED");
    assert_eq!(app.balance(user_id).await, 50.0);
}

#[tokio::test]
async fn test_chain_amount_is_credited() {
    let app = TestApp::new();
    let user_id = app.create_user("bob@example.com").await;
    app.register_address(BTC_DEPOSIT, "btc").await;

    // Claims 500 but only pays 50
    let tx_hash = hash("b0b");
    let tx_id = app.submit(user_id, &tx_hash, 500.0).await;
    app.broadcast(&tx_hash, BTC_DEPOSIT, FIFTY_DOLLARS_SATS, 3).await;

    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["creditedAmount"], 50.0);
    assert_eq!(json["transaction"]["claimedAmount"], 500.0);
    assert_eq!(app.balance(user_id).await, 50.0);
}

#[tokio::test]
async fn test_duplicate_hash_spellings_collide() {
    let app = TestApp::new();
    let user_id = app.create_user("carol@example.com").await;

    let tx_hash = hash("abcdef");
    app.submit(user_id, &tx_hash, 10.0).await;

    let (status, json) = app
        .post(
            "/transactions",
            json!({
                "userId": user_id,
                "cryptocurrency": "BTC",
                "amount": 10.0,
                "transactionHash": format!("0x{}", tx_hash.to_uppercase())
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "DUPLICATE_TRANSACTION");
}

#[tokio::test]
async fn test_intake_validation() {
    let app = TestApp::new();
    let user_id = app.create_user("dave@example.com").await;

    let (status, json) = app.post("/transactions", json!({ "userId": user_id })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let base = json!({
        "userId": user_id,
        "cryptocurrency": "BTC",
        "amount": 10.0,
        "transactionHash": hash("d")
    });

    let mut negative = base.clone();
    negative["amount"] = json!(-1.0);
    let (_, json) = app.post("/transactions", negative).await;
    assert_eq!(json["code"], "INVALID_AMOUNT");

    let mut decimal_text = base.clone();
    decimal_text["amount"] = json!("12.50");
    decimal_text["transactionHash"] = json!("0xD00D");
    let (status, json) = app.post("/transactions", decimal_text).await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    assert_eq!(json["claimedAmount"], 12.5);
    assert_eq!(json["transactionHash"], "d00d");

    let mut empty_hash = base.clone();
    empty_hash["transactionHash"] = json!("0x");
    let (status, json) = app.post("/transactions", empty_hash).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let mut monero = base.clone();
    monero["cryptocurrency"] = json!("XMR");
    let (_, json) = app.post("/transactions", monero).await;
    assert_eq!(json["code"], "UNSUPPORTED_CRYPTO");

    let mut self_verified = base.clone();
    self_verified["status"] = json!("verified");
    let (status, json) = app.post("/transactions", self_verified).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let mut stranger = base.clone();
    stranger["userId"] = json!(4242);
    let (status, json) = app.post("/transactions", stranger).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "USER_NOT_FOUND");

    let (status, json) = app.send("POST", "/transactions", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_wrong_recipient_is_rejected() {
    let app = TestApp::new();
    let user_id = app.create_user("erin@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let tx_hash = hash("e");
    let tx_id = app.submit(user_id, &tx_hash, 50.0).await;
    app.broadcast(&tx_hash, "bc1qsomeoneelse", FIFTY_DOLLARS_SATS, 100)
        .await;

    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_RECIPIENT");

    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "TRANSACTION_REJECTED");

    let (_, json) = app.get(&format!("/transactions/{}", tx_id)).await;
    assert_eq!(json["status"], "rejected");
    assert_eq!(app.balance(user_id).await, 0.0);
}

#[tokio::test]
async fn test_deactivated_address_no_longer_accepted() {
    let app = TestApp::new();
    let user_id = app.create_user("fay@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let (status, json) = app
        .post(
            &format!("/deposit-addresses/{}/deactivate", BTC_DEPOSIT),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isActive"], false);

    let (_, json) = app.get("/deposit-addresses?active=true").await;
    assert_eq!(json["total"], 0);

    let tx_hash = hash("f");
    let tx_id = app.submit(user_id, &tx_hash, 50.0).await;
    app.broadcast(&tx_hash, BTC_DEPOSIT, FIFTY_DOLLARS_SATS, 6).await;

    let (_, json) = app.verify(tx_id).await;
    assert_eq!(json["code"], "INVALID_RECIPIENT");
}

#[tokio::test]
async fn test_transaction_not_on_chain() {
    let app = TestApp::new();
    let user_id = app.create_user("gus@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let tx_id = app.submit(user_id, &hash("9"), 50.0).await;

    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "TX_NOT_FOUND_ON_CHAIN");

    let (status, json) = app.verify(9999).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "TRANSACTION_NOT_FOUND");
}

#[tokio::test]
async fn test_verify_auto_codes() {
    let app = TestApp::new();
    let user_id = app.create_user("hana@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let tx_hash = hash("a0");
    let request = |crypto: &str, target: &str| {
        json!({
            "transactionHash": tx_hash,
            "cryptocurrency": crypto,
            "userId": user_id,
            "targetAddress": target
        })
    };

    let (status, json) = app
        .post("/transactions/verify-auto", request("XMR", BTC_DEPOSIT))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "UNSUPPORTED_CRYPTO");

    let (_, json) = app
        .post("/transactions/verify-auto", request("BTC", BTC_DEPOSIT))
        .await;
    assert_eq!(json["code"], "TX_NOT_FOUND");

    app.broadcast(&tx_hash, BTC_DEPOSIT, 2 * FIFTY_DOLLARS_SATS, 0)
        .await;
    let (_, json) = app
        .post("/transactions/verify-auto", request("BTC", BTC_DEPOSIT))
        .await;
    assert_eq!(json["code"], "UNCONFIRMED");

    app.set_confirmations(&tx_hash, 1).await;
    let (status, json) = app
        .post("/transactions/verify-auto", request("BTC", BTC_DEPOSIT))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INSUFFICIENT_CONFIRMATIONS");
    assert_eq!(json["details"]["current"], 1);
    assert_eq!(json["details"]["required"], 2);

    let (_, json) = app
        .post("/transactions/verify-auto", request("BTC", "bc1qunregistered"))
        .await;
    assert_eq!(json["code"], "INVALID_RECIPIENT");

    app.set_confirmations(&tx_hash, 2).await;
    let (status, json) = app
        .post("/transactions/verify-auto", request("BTC", BTC_DEPOSIT))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["creditedAmount"], 100.0);
    assert_eq!(json["newBalance"], 100.0);

    let (status, json) = app
        .post("/transactions/verify-auto", request("BTC", BTC_DEPOSIT))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "DUPLICATE_TRANSACTION");
    assert_eq!(app.balance(user_id).await, 100.0);

    let (_, json) = app.get(&format!("/users/{}/transactions", user_id)).await;
    assert_eq!(json["total"], 1);
}

#[tokio::test]
async fn test_verify_auto_wrong_target_keeps_deposit_creditable() {
    let app = TestApp::new();
    let user_id = app.create_user("hugo@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;
    app.register_address("bc1qseconddeposit", "BTC").await;

    let tx_hash = hash("a1");
    let tx_id = app.submit(user_id, &tx_hash, 50.0).await;
    app.broadcast(&tx_hash, BTC_DEPOSIT, FIFTY_DOLLARS_SATS, 6).await;

    let request = |crypto: &str, target: &str| {
        json!({
            "transactionHash": tx_hash,
            "cryptocurrency": crypto,
            "userId": user_id,
            "targetAddress": target
        })
    };

    let (status, json) = app
        .post(
            "/transactions/verify-auto",
            request("BTC", "bc1qseconddeposit"),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_RECIPIENT");
    assert_eq!(app.status_of(tx_id).await, "submitted");

    let (status, json) = app
        .post("/transactions/verify-auto", request("LTC", BTC_DEPOSIT))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(app.status_of(tx_id).await, "submitted");

    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["creditedAmount"], 50.0);
    assert_eq!(app.balance(user_id).await, 50.0);
}

#[tokio::test]
async fn test_explorer_outage_changes_nothing() {
    let app = TestApp::build(
        Some(Arc::new(UnreachableExplorer)),
        Arc::new(FixedPriceOracle::uniform(50_000.0)),
    );
    let user_id = app.create_user("nia@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let tx_id = app.submit(user_id, &hash("0ff"), 50.0).await;

    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "VERIFICATION_FAILED");
    assert_eq!(app.status_of(tx_id).await, "submitted");

    let (status, json) = app
        .post(
            "/transactions/verify-auto",
            json!({
                "transactionHash": hash("0ff1"),
                "cryptocurrency": "BTC",
                "userId": user_id,
                "targetAddress": BTC_DEPOSIT
            }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "VERIFICATION_FAILED");

    let (_, json) = app.get(&format!("/users/{}/transactions", user_id)).await;
    assert_eq!(json["total"], 1);
    assert_eq!(app.balance(user_id).await, 0.0);
}

#[tokio::test]
async fn test_pricing_outage_changes_nothing() {
    let app = TestApp::build(None, Arc::new(UnavailablePrices));
    let user_id = app.create_user("omar@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let tx_hash = hash("9a");
    let tx_id = app.submit(user_id, &tx_hash, 50.0).await;
    app.broadcast(&tx_hash, BTC_DEPOSIT, FIFTY_DOLLARS_SATS, 6).await;

    let (status, json) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "VERIFICATION_FAILED");
    assert_eq!(app.status_of(tx_id).await, "submitted");
    assert_eq!(app.balance(user_id).await, 0.0);

    let (status, json) = app
        .post(
            "/transactions/verify-auto",
            json!({
                "transactionHash": tx_hash,
                "cryptocurrency": "BTC",
                "userId": user_id,
                "targetAddress": BTC_DEPOSIT
            }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "VERIFICATION_FAILED");
    assert_eq!(app.status_of(tx_id).await, "submitted");
    assert_eq!(app.balance(user_id).await, 0.0);
}

#[tokio::test]
async fn test_concurrent_verify_credits_once() {
    let app = TestApp::new();
    let user_id = app.create_user("ivan@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let tx_hash = hash("c0c0");
    let tx_id = app.submit(user_id, &tx_hash, 50.0).await;
    app.broadcast(&tx_hash, BTC_DEPOSIT, FIFTY_DOLLARS_SATS, 6).await;

    let (first, second, third) = tokio::join!(
        app.verify(tx_id),
        app.verify(tx_id),
        app.verify(tx_id)
    );

    let successes = [&first, &second, &third]
        .iter()
        .filter(|(status, _)| *status == StatusCode::OK)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(app.balance(user_id).await, 50.0);
}

#[tokio::test]
async fn test_credits_for_one_user_accumulate() {
    let app = TestApp::new();
    let user_id = app.create_user("jo@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let mut ids = Vec::new();
    for prefix in ["1", "2", "3"] {
        let tx_hash = hash(prefix);
        ids.push(app.submit(user_id, &tx_hash, 50.0).await);
        app.broadcast(&tx_hash, BTC_DEPOSIT, FIFTY_DOLLARS_SATS, 2).await;
    }

    let (a, b, c) = tokio::join!(app.verify(ids[0]), app.verify(ids[1]), app.verify(ids[2]));
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert_eq!(c.0, StatusCode::OK);
    assert_eq!(app.balance(user_id).await, 150.0);

    let (_, stats) = app.get("/stats").await;
    assert_eq!(stats["totalUsers"], 1);
    assert_eq!(stats["verifiedTransactions"], 3);
    assert_eq!(stats["totalCredited"], 150.0);
}

#[tokio::test]
async fn test_order_flow() {
    let app = TestApp::new();
    let user_id = app.create_user("kim@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let order = json!({
        "userId": user_id,
        "itemKind": "product",
        "itemId": "gift-card-25",
        "amount": 25.5
    });

    let (status, json) = app.post("/orders", order.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INSUFFICIENT_FUNDS");

    let tx_hash = hash("0d");
    let tx_id = app.submit(user_id, &tx_hash, 50.0).await;
    app.broadcast(&tx_hash, BTC_DEPOSIT, FIFTY_DOLLARS_SATS, 2).await;
    assert_eq!(app.verify(tx_id).await.0, StatusCode::OK);

    let (status, json) = app.post("/orders", order).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["newBalance"], 24.5);
    assert_eq!(json["order"]["paymentStatus"], "paid");
    assert_eq!(json["order"]["deliveryStatus"], "pending");
    assert_eq!(json["order"]["loyaltyPoints"], 25);
    let order_id = json["order"]["id"].as_u64().unwrap();

    let (_, user) = app.get(&format!("/users/{}", user_id)).await;
    assert_eq!(user["loyaltyPoints"], 25);

    let (status, json) = app
        .send(
            "PATCH",
            &format!("/orders/{}/delivery-status", order_id),
            Some(json!({ "status": "delivered" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INVALID_STATUS_TRANSITION");

    let (status, json) = app
        .send(
            "PATCH",
            &format!("/orders/{}/payment-status", order_id),
            Some(json!({ "status": "refunded" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["paymentStatus"], "refunded");
    assert_eq!(app.balance(user_id).await, 50.0);

    let (status, _) = app
        .send(
            "PATCH",
            &format!("/orders/{}/payment-status", order_id),
            Some(json!({ "status": "refunded" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.balance(user_id).await, 50.0);

    let (_, json) = app.get(&format!("/users/{}/orders", user_id)).await;
    assert_eq!(json["total"], 1);
}

#[tokio::test]
async fn test_user_and_address_conflicts() {
    let app = TestApp::new();
    app.create_user("lee@example.com").await;

    let (status, json) = app
        .post("/users", json!({ "email": "LEE@example.com" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "DUPLICATE_EMAIL");

    app.register_address(BTC_DEPOSIT, "BTC").await;
    let (status, json) = app
        .post(
            "/deposit-addresses",
            json!({ "address": BTC_DEPOSIT, "cryptocurrency": "BTC" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "DUPLICATE_ADDRESS");

    let (status, json) = app.get("/users/777").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn test_mock_chain_admin_routes() {
    let app = TestApp::new();
    let user_id = app.create_user("max@example.com").await;
    app.register_address(BTC_DEPOSIT, "BTC").await;

    let tx_hash = hash("ad");
    let tx_id = app.submit(user_id, &tx_hash, 50.0).await;

    let (status, _) = app
        .post(
            "/admin/mock/transactions",
            json!({
                "cryptocurrency": "BTC",
                "transactionHash": tx_hash,
                "outputs": [{ "address": BTC_DEPOSIT, "value": FIFTY_DOLLARS_SATS }],
                "confirmations": 1
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, json) = app.verify(tx_id).await;
    assert_eq!(json["code"], "TX_UNCONFIRMED");

    let (status, _) = app.send("POST", "/admin/mock/mine", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.verify(tx_id).await;
    assert_eq!(status, StatusCode::OK);
}
