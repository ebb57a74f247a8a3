//! Core type definitions for curvebuy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Ledger address (user wallet or autonomous agent), base58-encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ledger unit (transaction) ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Amount in base-currency minor units (1 coin = 1_000_000_000 units)
pub type Amount = i64;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Current unix time in seconds
pub fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as Timestamp
}

/// Constants
pub mod constants {
    use super::Amount;

    /// Base-currency minor units per whole coin
    pub const UNITS_PER_COIN: Amount = 1_000_000_000;

    /// Asset key used for the base currency in balance maps
    pub const BASE_ASSET: &str = "base";

    /// Amount the operator sends to a buffer to trigger execution.
    /// Deposits of exactly this size are not refills.
    pub const EXECUTE_TRIGGER_AMOUNT: Amount = 10_000;

    /// Held back from a buffer balance to pay for the purchase request itself
    pub const PURCHASE_FEE_RESERVE: Amount = 1_000;

    /// Fee cap used when a buffer definition does not set `max_fee_percent`
    pub const DEFAULT_MAX_FEE_PERCENT: f64 = 1.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let addr = Address::new("7DTJZNB3MHSBVI72CKXRIKONJYBV7I2Z");
        assert_eq!(addr.to_string(), "7DTJZNB3MHSBVI72CKXRIKONJYBV7I2Z");
        assert_eq!(addr.as_str(), addr.0);
    }

    #[test]
    fn test_address_serializes_transparently() {
        let addr = Address::from("ABC");
        assert_eq!(serde_json::to_string(&addr).unwrap(), "\"ABC\"");
    }

    #[test]
    fn test_unix_now_is_recent() {
        // 2020-01-01
        assert!(unix_now() > 1_577_836_800);
    }
}
