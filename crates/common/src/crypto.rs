use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Coins accepted for deposits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cryptocurrency {
    Btc,
    Ltc,
    Doge,
    Dash,
}

impl Cryptocurrency {
    pub const ALL: [Cryptocurrency; 4] = [
        Cryptocurrency::Btc,
        Cryptocurrency::Ltc,
        Cryptocurrency::Doge,
        Cryptocurrency::Dash,
    ];

    /// Ticker code, e.g. `BTC`
    pub fn code(&self) -> &'static str {
        match self {
            Cryptocurrency::Btc => "BTC",
            Cryptocurrency::Ltc => "LTC",
            Cryptocurrency::Doge => "DOGE",
            Cryptocurrency::Dash => "DASH",
        }
    }

    /// Chain segment in block explorer URLs
    pub fn explorer_slug(&self) -> &'static str {
        match self {
            Cryptocurrency::Btc => "btc",
            Cryptocurrency::Ltc => "ltc",
            Cryptocurrency::Doge => "doge",
            Cryptocurrency::Dash => "dash",
        }
    }

    /// Coin identifier used by the pricing API
    pub fn pricing_id(&self) -> &'static str {
        match self {
            Cryptocurrency::Btc => "bitcoin",
            Cryptocurrency::Ltc => "litecoin",
            Cryptocurrency::Doge => "dogecoin",
            Cryptocurrency::Dash => "dash",
        }
    }

    /// Decimal places of the smallest on-chain unit
    pub fn decimals(&self) -> u32 {
        8
    }
}

impl FromStr for Cryptocurrency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BTC" => Ok(Cryptocurrency::Btc),
            "LTC" => Ok(Cryptocurrency::Ltc),
            "DOGE" => Ok(Cryptocurrency::Doge),
            "DASH" => Ok(Cryptocurrency::Dash),
            _ => Err(Error::UnsupportedCrypto(s.to_string())),
        }
    }
}

impl fmt::Display for Cryptocurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for Cryptocurrency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Cryptocurrency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}
