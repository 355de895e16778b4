//! API request handlers for the wallet service

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use trueservices_common::{Cryptocurrency, Error, TransactionHash, Usd};

use crate::{
    intake::{self, SubmitTransactionRequest},
    ledger::{AutoVerify, Credit, Ledger, VerifyError},
    mock_explorer::MockExplorer,
    models::{DeliveryStatus, DepositAddress, Order, PaymentStatus, Stats, Transaction, User},
    orders::{self, CreateOrderRequest, StatusUpdateRequest},
    storage::Store,
    verifier::{Rejection, Verifier},
};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub ledger: Ledger,

    /// Present in mock mode only, exposes the simulated chain to admins
    pub mock_explorer: Option<Arc<MockExplorer>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        verifier: Verifier,
        mock_explorer: Option<Arc<MockExplorer>>,
    ) -> Self {
        Self {
            ledger: Ledger::new(store.clone(), verifier),
            store,
            mock_explorer,
        }
    }
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "code": self.code,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_)
            | Error::InvalidAmount(_)
            | Error::UnsupportedCrypto(_)
            | Error::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,

            Error::UserNotFound(_)
            | Error::TransactionNotFound(_)
            | Error::OrderNotFound(_)
            | Error::AddressNotFound(_) => StatusCode::NOT_FOUND,

            Error::DuplicateTransaction(_)
            | Error::AlreadyVerified(_)
            | Error::TransactionRejected(_)
            | Error::DuplicateAddress(_)
            | Error::DuplicateEmail(_)
            | Error::InvalidTransition { .. } => StatusCode::CONFLICT,

            Error::Explorer(_)
            | Error::Pricing(_)
            | Error::Redis(_)
            | Error::JsonSerialization(_)
            | Error::Other(_) => {
                error!("Request failed: {:#}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        ApiError::new(status, err.code(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Invalid request body: {}", rejection.body_text()),
        )
    }
}

/// Unwrap a JSON body, reporting malformed input in the API error shape
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    Ok(payload?.0)
}

fn confirmation_details(current: u32, required: u32) -> Value {
    json!({ "current": current, "required": required })
}

/// Error vocabulary of `POST /transactions/verify`
fn verify_error(err: VerifyError) -> ApiError {
    let rejection = match err {
        VerifyError::Failed(e) => return e.into(),
        VerifyError::Rejected(r) => r,
    };
    let message = rejection.to_string();

    match rejection {
        Rejection::NotFoundOnChain => {
            ApiError::new(StatusCode::BAD_REQUEST, "TX_NOT_FOUND_ON_CHAIN", message)
        }
        Rejection::Unconfirmed { current, required } => {
            ApiError::new(StatusCode::BAD_REQUEST, "TX_UNCONFIRMED", message)
                .with_details(confirmation_details(current, required))
        }
        Rejection::InvalidRecipient => {
            ApiError::new(StatusCode::BAD_REQUEST, "INVALID_RECIPIENT", message)
        }
        Rejection::ZeroValue => ApiError::new(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", message),
        Rejection::Upstream(_) => {
            error!("Verification upstream failure: {}", message);
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "VERIFICATION_FAILED",
                message,
            )
        }
    }
}

/// Error vocabulary of `POST /transactions/verify-auto`
fn verify_auto_error(err: VerifyError) -> ApiError {
    let rejection = match err {
        VerifyError::Failed(Error::AlreadyVerified(id)) => {
            return ApiError::new(
                StatusCode::CONFLICT,
                "DUPLICATE_TRANSACTION",
                format!("Transaction {} is already verified", id),
            )
        }
        VerifyError::Failed(e) => return e.into(),
        VerifyError::Rejected(r) => r,
    };
    let message = rejection.to_string();

    match rejection {
        Rejection::NotFoundOnChain => {
            ApiError::new(StatusCode::BAD_REQUEST, "TX_NOT_FOUND", message)
        }
        Rejection::Unconfirmed { current: 0, required } => {
            ApiError::new(StatusCode::BAD_REQUEST, "UNCONFIRMED", message)
                .with_details(confirmation_details(0, required))
        }
        Rejection::Unconfirmed { current, required } => ApiError::new(
            StatusCode::BAD_REQUEST,
            "INSUFFICIENT_CONFIRMATIONS",
            message,
        )
        .with_details(confirmation_details(current, required)),
        other => verify_error(VerifyError::Rejected(other)),
    }
}

/// Request to create a user
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Request to register a deposit address
#[derive(Debug, Deserialize)]
pub struct RegisterAddressRequest {
    pub address: Option<String>,
    pub cryptocurrency: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListAddressesQuery {
    pub active: Option<bool>,
}

/// Request to verify a stored transaction
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub transaction_id: Option<u64>,
}

/// Request to verify a payment to a named deposit address
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAutoRequest {
    pub transaction_hash: Option<String>,
    pub cryptocurrency: Option<String>,
    pub user_id: Option<u64>,
    pub target_address: Option<String>,
}

/// Successful verification
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub transaction: Transaction,
    pub credited_amount: Usd,
    pub new_balance: Usd,
}

impl From<Credit> for VerifyResponse {
    fn from(credit: Credit) -> Self {
        Self {
            transaction: credit.transaction,
            credited_amount: credit.credited,
            new_balance: credit.new_balance,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order: Order,
    pub new_balance: Usd,
}

#[derive(Debug, Serialize)]
pub struct TransactionsListResponse {
    pub transactions: Vec<Transaction>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct OrdersListResponse {
    pub orders: Vec<Order>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct AddressesListResponse {
    pub addresses: Vec<DepositAddress>,
    pub total: usize,
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.health_check().await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "service": "wallet-service"
        }))
        .into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "wallet-service",
                    "error": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

/// Create a user
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let payload = body(payload)?;

    let email = payload.email.as_deref().map(str::trim).unwrap_or_default();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::Validation("A valid email is required".to_string()).into());
    }
    let display_name = payload
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email));

    let user = state
        .store
        .create_user(email, display_name)
        .await?
        .ok_or_else(|| Error::DuplicateEmail(email.to_string()))?;

    info!("User {} created", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Get a user with balance and loyalty points
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<u64>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or(Error::UserNotFound(user_id))?;
    Ok(Json(user))
}

/// List a user's deposit transactions
pub async fn list_user_transactions_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<u64>,
) -> Result<Json<TransactionsListResponse>, ApiError> {
    if state.store.get_user(user_id).await?.is_none() {
        return Err(Error::UserNotFound(user_id).into());
    }

    let transactions = state.store.list_user_transactions(user_id).await?;
    Ok(Json(TransactionsListResponse {
        total: transactions.len(),
        transactions,
    }))
}

/// List a user's orders
pub async fn list_user_orders_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<u64>,
) -> Result<Json<OrdersListResponse>, ApiError> {
    if state.store.get_user(user_id).await?.is_none() {
        return Err(Error::UserNotFound(user_id).into());
    }

    let orders = state.store.list_user_orders(user_id).await?;
    Ok(Json(OrdersListResponse {
        total: orders.len(),
        orders,
    }))
}

/// Register a deposit address
pub async fn register_address_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterAddressRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DepositAddress>), ApiError> {
    let payload = body(payload)?;

    let (Some(address), Some(cryptocurrency)) = (payload.address, payload.cryptocurrency) else {
        return Err(Error::Validation(
            "Missing required fields: address, cryptocurrency".to_string(),
        )
        .into());
    };
    let address = address.trim().to_string();
    if address.is_empty() {
        return Err(Error::Validation("address must not be empty".to_string()).into());
    }
    let cryptocurrency: Cryptocurrency = cryptocurrency.parse()?;

    let deposit = DepositAddress::new(address, cryptocurrency, payload.label);
    if !state.store.add_deposit_address(&deposit).await? {
        return Err(Error::DuplicateAddress(deposit.address).into());
    }

    info!(
        "Registered {} deposit address {}",
        deposit.cryptocurrency, deposit.address
    );
    Ok((StatusCode::CREATED, Json(deposit)))
}

/// List deposit addresses, optionally only active ones
pub async fn list_addresses_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAddressesQuery>,
) -> Result<Json<AddressesListResponse>, ApiError> {
    let mut addresses = state.store.list_deposit_addresses().await?;
    if let Some(active) = query.active {
        addresses.retain(|a| a.is_active == active);
    }

    Ok(Json(AddressesListResponse {
        total: addresses.len(),
        addresses,
    }))
}

/// Stop accepting deposits to an address
pub async fn deactivate_address_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<DepositAddress>, ApiError> {
    if !state.store.set_deposit_address_active(&address, false).await? {
        return Err(Error::AddressNotFound(address).into());
    }
    info!("Deactivated deposit address {}", address);

    let deposit = state
        .store
        .get_deposit_address(&address)
        .await?
        .ok_or(Error::AddressNotFound(address))?;
    Ok(Json(deposit))
}

/// Record a user-submitted deposit
pub async fn submit_transaction_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let submission = body(payload)?.validate()?;
    let transaction = intake::submit(state.store.as_ref(), submission).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// Get one transaction
pub async fn get_transaction_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Transaction>, ApiError> {
    let transaction = state
        .store
        .get_transaction(id)
        .await?
        .ok_or(Error::TransactionNotFound(id))?;
    Ok(Json(transaction))
}

/// Verify a stored transaction on chain and credit it
pub async fn verify_transaction_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let id = body(payload)?
        .transaction_id
        .ok_or_else(|| Error::Validation("Missing required fields: transactionId".to_string()))?;

    info!("Verifying transaction {}", id);

    let credit = state
        .ledger
        .verify_transaction(id)
        .await
        .map_err(verify_error)?;
    Ok(Json(credit.into()))
}

/// Verify a payment to a named deposit address, pricing it from chain data
pub async fn verify_auto_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyAutoRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let payload = body(payload)?;

    let (Some(hash), Some(cryptocurrency), Some(user_id), Some(target_address)) = (
        payload.transaction_hash,
        payload.cryptocurrency,
        payload.user_id,
        payload.target_address,
    ) else {
        return Err(Error::Validation(
            "Missing required fields: transactionHash, cryptocurrency, userId, targetAddress"
                .to_string(),
        )
        .into());
    };

    let request = AutoVerify {
        user_id,
        cryptocurrency: cryptocurrency.parse()?,
        transaction_hash: TransactionHash::parse(&hash)?,
        target_address: target_address.trim().to_string(),
    };

    info!(
        "Auto-verifying {} {} for user {}",
        request.cryptocurrency, request.transaction_hash, user_id
    );

    let credit = state
        .ledger
        .verify_auto(request)
        .await
        .map_err(verify_auto_error)?;
    Ok(Json(credit.into()))
}

/// Place an order paid from the balance
pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let new = body(payload)?.validate()?;
    let (order, new_balance) = orders::place(state.store.as_ref(), new).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse { order, new_balance }),
    ))
}

/// Get one order
pub async fn get_order_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .store
        .get_order(id)
        .await?
        .ok_or(Error::OrderNotFound(id))?;
    Ok(Json(order))
}

/// Staff payment-status change
pub async fn update_payment_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let next: PaymentStatus = body(payload)?.status.parse()?;
    let order = orders::update_payment_status(state.store.as_ref(), id, next).await?;
    Ok(Json(order))
}

/// Staff delivery-status change
pub async fn update_delivery_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let next: DeliveryStatus = body(payload)?.status.parse()?;
    let order = orders::update_delivery_status(state.store.as_ref(), id, next).await?;
    Ok(Json(order))
}

/// Totals for the admin dashboard
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(state.store.stats().await?))
}

/// One output of a simulated chain transaction
#[derive(Debug, Deserialize)]
pub struct MockOutput {
    pub address: String,
    pub value: u64,
}

/// Simulated broadcast (mock mode only)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockBroadcastRequest {
    pub cryptocurrency: String,
    pub transaction_hash: String,
    pub outputs: Vec<MockOutput>,
    #[serde(default)]
    pub confirmations: u32,
}

fn mock_explorer(state: &AppState) -> Result<&MockExplorer, ApiError> {
    state.mock_explorer.as_deref().ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Mock chain is only available in mock mode",
        )
    })
}

/// Put a transaction on the mock chain
///
/// POST /admin/mock/transactions
pub async fn mock_broadcast_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MockBroadcastRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let explorer = mock_explorer(&state)?;
    let req = body(payload)?;

    let crypto: Cryptocurrency = req.cryptocurrency.parse()?;
    let hash = TransactionHash::parse(&req.transaction_hash)?;
    let outputs = req.outputs.into_iter().map(|o| (o.address, o.value)).collect();

    explorer.broadcast(crypto, &hash, outputs, req.confirmations).await;
    info!("Mock broadcast of {} {}", crypto, hash);
    Ok(StatusCode::CREATED)
}

/// Mine one block on the mock chain
///
/// POST /admin/mock/mine
pub async fn mock_mine_handler(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    mock_explorer(&state)?.mine_block().await;
    Ok(StatusCode::NO_CONTENT)
}
