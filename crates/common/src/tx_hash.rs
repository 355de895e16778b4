use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::Error;

const MAX_HEX_LEN: usize = 128;

/// A normalised on-chain transaction hash (non-empty lowercase hex)
///
/// The `0x` prefix is dropped and the hex is lowercased, so two spellings
/// of the same hash always collide on the uniqueness index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionHash(String);

impl TransactionHash {
    /// Parse and normalise a user-supplied hash
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex_part.is_empty() {
            return Err(Error::Validation("Transaction hash is empty".to_string()));
        }
        if hex_part.len() > MAX_HEX_LEN {
            return Err(Error::Validation(format!(
                "Transaction hash is longer than {} characters",
                MAX_HEX_LEN
            )));
        }
        if let Some(bad) = hex_part.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(Error::Validation(format!(
                "Invalid transaction hash: unexpected character {:?}",
                bad
            )));
        }

        Ok(Self(hex_part.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TransactionHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TransactionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
