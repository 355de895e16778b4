//! Wallet Service
//!
//! Main entry point for deposit verification and balance management.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_service::{
    create_router,
    explorer::{ChainExplorer, HttpExplorer},
    mock_explorer::MockExplorer,
    pricing::{FixedPriceOracle, HttpPriceOracle, PriceOracle},
    AppState, Config, RedisStore, Verifier,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wallet_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Wallet Service");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Redis URL: {}", config.redis_url);
    info!("  API address: {}", config.api_address());
    info!("  Mock mode: {}", config.mock_mode);
    info!("  Min confirmations: {}", config.min_confirmations);

    let store = RedisStore::new(&config.redis_url)
        .await
        .context("Failed to initialize storage")?;
    info!("Connected to Redis");

    let (explorer, prices, mock_explorer): (
        Arc<dyn ChainExplorer>,
        Arc<dyn PriceOracle>,
        Option<Arc<MockExplorer>>,
    ) = if config.mock_mode {
        warn!(
            "Mock mode: using the in-process chain and a fixed price of {} USD",
            config.mock_usd_price
        );
        let mock = Arc::new(MockExplorer::new());
        (
            mock.clone(),
            Arc::new(FixedPriceOracle::uniform(config.mock_usd_price)),
            Some(mock),
        )
    } else {
        info!("  Explorer: {}", config.explorer_url);
        info!("  Pricing: {}", config.pricing_url);
        let explorer = HttpExplorer::new(config.explorer_url.clone(), config.explorer_timeout())
            .context("Failed to create explorer client")?;
        let prices = HttpPriceOracle::new(config.pricing_url.clone(), config.explorer_timeout())
            .context("Failed to create pricing client")?;
        (Arc::new(explorer), Arc::new(prices), None)
    };

    let verifier = Verifier::new(explorer, prices, config.min_confirmations);
    let state = AppState::new(Arc::new(store), verifier, mock_explorer);
    let app = create_router(state);

    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Wallet Service running on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("API server error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down Wallet Service");

    Ok(())
}
