//! TrueServices Wallet Service
//!
//! Owns users' USD balances, the deposit ledger and orders paid from the
//! balance. Deposits are verified against a block explorer and credited
//! at most once per transaction hash.

pub mod config;
pub mod explorer;
pub mod handlers;
pub mod intake;
pub mod ledger;
pub mod mock_explorer;
pub mod models;
pub mod orders;
pub mod pricing;
pub mod storage;
pub mod verifier;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use handlers::AppState;
pub use ledger::Ledger;
pub use storage::{MemoryStore, RedisStore, Store};
pub use verifier::Verifier;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let mock_mode = state.mock_explorer.is_some();
    let shared_state = Arc::new(state);

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/users", post(handlers::create_user_handler))
        .route("/users/{id}", get(handlers::get_user_handler))
        .route(
            "/users/{id}/transactions",
            get(handlers::list_user_transactions_handler),
        )
        .route("/users/{id}/orders", get(handlers::list_user_orders_handler))
        .route(
            "/deposit-addresses",
            post(handlers::register_address_handler).get(handlers::list_addresses_handler),
        )
        .route(
            "/deposit-addresses/{address}/deactivate",
            post(handlers::deactivate_address_handler),
        )
        .route("/transactions", post(handlers::submit_transaction_handler))
        .route("/transactions/{id}", get(handlers::get_transaction_handler))
        .route(
            "/transactions/verify",
            post(handlers::verify_transaction_handler),
        )
        .route(
            "/transactions/verify-auto",
            post(handlers::verify_auto_handler),
        )
        .route("/orders", post(handlers::create_order_handler))
        .route("/orders/{id}", get(handlers::get_order_handler))
        .route(
            "/orders/{id}/payment-status",
            patch(handlers::update_payment_status_handler),
        )
        .route(
            "/orders/{id}/delivery-status",
            patch(handlers::update_delivery_status_handler),
        )
        .route("/stats", get(handlers::stats_handler));

    if mock_mode {
        router = router
            .route(
                "/admin/mock/transactions",
                post(handlers::mock_broadcast_handler),
            )
            .route("/admin/mock/mine", post(handlers::mock_mine_handler));
    }

    router
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
