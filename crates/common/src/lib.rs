pub mod crypto;
pub mod error;
pub mod money;
pub mod tx_hash;

pub use crypto::Cryptocurrency;
pub use error::{Error, Result};
pub use money::Usd;
pub use tx_hash::TransactionHash;
