use thiserror::Error;

use crate::Usd;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unsupported cryptocurrency: {0}")]
    UnsupportedCrypto(String),

    #[error("User {0} not found")]
    UserNotFound(u64),

    #[error("Transaction {0} not found")]
    TransactionNotFound(u64),

    #[error("Order {0} not found")]
    OrderNotFound(u64),

    #[error("Deposit address {0} not found")]
    AddressNotFound(String),

    #[error("Transaction hash {0} has already been submitted")]
    DuplicateTransaction(String),

    #[error("Transaction {0} is already verified")]
    AlreadyVerified(u64),

    #[error("Transaction {0} was rejected")]
    TransactionRejected(u64),

    #[error("Deposit address {0} is already registered")]
    DuplicateAddress(String),

    #[error("Email {0} is already registered")]
    DuplicateEmail(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Usd, required: Usd },

    #[error("Cannot change {field} from {from} to {to}")]
    InvalidTransition {
        field: &'static str,
        from: String,
        to: String,
    },

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Explorer error: {0}")]
    Explorer(String),

    #[error("Pricing error: {0}")]
    Pricing(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Machine-readable code surfaced to API clients
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::InvalidAmount(_) => "INVALID_AMOUNT",
            Error::UnsupportedCrypto(_) => "UNSUPPORTED_CRYPTO",
            Error::UserNotFound(_) => "USER_NOT_FOUND",
            Error::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Error::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Error::AddressNotFound(_) => "ADDRESS_NOT_FOUND",
            Error::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            Error::AlreadyVerified(_) => "ALREADY_VERIFIED",
            Error::TransactionRejected(_) => "TRANSACTION_REJECTED",
            Error::DuplicateAddress(_) => "DUPLICATE_ADDRESS",
            Error::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            Error::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Error::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            Error::Explorer(_) | Error::Pricing(_) => "VERIFICATION_FAILED",
            Error::Redis(_) | Error::JsonSerialization(_) | Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller can expect a different outcome by retrying later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Redis(_) | Error::Explorer(_) | Error::Pricing(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
