//! USD amounts
//!
//! Balances and amounts are held as integer cents so credits and debits
//! are exact. On the wire they appear as decimal dollars (`50.0`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::{Error, Result};

/// A USD amount in cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Usd(i64);

impl Usd {
    pub const ZERO: Usd = Usd(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Convert a decimal dollar value, rounding to the nearest cent
    pub fn from_dollars(dollars: f64) -> Result<Self> {
        if !dollars.is_finite() {
            return Err(Error::InvalidAmount(format!("{} is not a number", dollars)));
        }

        let cents = (dollars * 100.0).round();
        if cents.abs() >= i64::MAX as f64 {
            return Err(Error::InvalidAmount(format!("{} is out of range", dollars)));
        }

        Ok(Self(cents as i64))
    }

    /// Value of `units` base units of a coin with `decimals` places at `usd_price` per coin
    pub fn from_coin_units(units: u64, decimals: u32, usd_price: f64) -> Result<Self> {
        if !usd_price.is_finite() || usd_price < 0.0 {
            return Err(Error::Pricing(format!("Invalid USD price {}", usd_price)));
        }

        let cents = (units as f64 * usd_price * 100.0 / 10f64.powi(decimals as i32)).round();
        if cents >= i64::MAX as f64 {
            return Err(Error::InvalidAmount(format!(
                "{} units at {} USD is out of range",
                units, usd_price
            )));
        }

        Ok(Self(cents as i64))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Whole dollars, rounded down
    pub fn whole_dollars(&self) -> i64 {
        self.0.div_euclid(100)
    }

    pub fn checked_add(self, other: Usd) -> Option<Usd> {
        self.0.checked_add(other.0).map(Usd)
    }

    pub fn checked_sub(self, other: Usd) -> Option<Usd> {
        self.0.checked_sub(other.0).map(Usd)
    }
}

impl fmt::Display for Usd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Usd {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_dollars())
    }
}

impl<'de> Deserialize<'de> for Usd {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        let dollars = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n,
            Raw::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| serde::de::Error::custom(format!("invalid amount: {}", s)))?,
        };

        Usd::from_dollars(dollars).map_err(serde::de::Error::custom)
    }
}
