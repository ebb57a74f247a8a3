//! Order Types
//!
//! Providers, the normalized provider record, and errors.

use std::fmt;

use curvebuy_core::{LedgerError, ProviderError, StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Supported exchange providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    SimpleSwap,
    OswapCc,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::SimpleSwap, Provider::OswapCc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleSwap => "simpleswap",
            Self::OswapCc => "oswapcc",
        }
    }

    pub fn parse(name: &str) -> Result<Self, OrderError> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| OrderError::UnknownProvider(name.to_string()))
    }

    /// Whether `status` means the exchange has delivered
    pub fn is_finished(&self, status: &str) -> bool {
        match self {
            Self::SimpleSwap => status == "finished" || status == "sending",
            Self::OswapCc => status == "sent",
        }
    }

    /// OswapCC quotes no input amount upfront
    pub fn reports_amount_in(&self) -> bool {
        matches!(self, Self::SimpleSwap)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider order record mapped onto common field names
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOrder {
    pub status: String,
    pub address_to: String,
    pub currency_from: String,
    pub amount_from: Option<f64>,
    pub amount_to: f64,
}

impl ProviderOrder {
    /// Normalize a raw record. OswapCC names its fields `out_address`,
    /// `in_coin`, `in_amount` and `expected_out_amount`.
    pub fn from_raw(provider: Provider, raw: &Value) -> Result<Self, OrderError> {
        let (address_key, currency_key, from_key, to_key) = match provider {
            Provider::SimpleSwap => ("address_to", "currency_from", "amount_from", "amount_to"),
            Provider::OswapCc => ("out_address", "in_coin", "in_amount", "expected_out_amount"),
        };
        let bad = |message: String| OrderError::BadRecord { provider, message };

        let text = |key: &str| -> Result<String, OrderError> {
            raw.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| bad(format!("missing {}", key)))
        };

        Ok(Self {
            status: text("status")?,
            address_to: text(address_key)?,
            currency_from: text(currency_key)?,
            amount_from: raw.get(from_key).and_then(number),
            amount_to: raw
                .get(to_key)
                .and_then(number)
                .ok_or_else(|| bad(format!("missing {}", to_key)))?,
        })
    }
}

/// Amounts arrive as JSON numbers or decimal strings
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Order reconciliation errors
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Wrong provider: {0}")]
    UnknownProvider(String),

    #[error("Unusable {provider} record: {message}")]
    BadRecord { provider: Provider, message: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<OrderError> for curvebuy_core::Error {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::UnknownProvider(name) => ValidationError::UnknownProvider(name).into(),
            OrderError::BadRecord { provider, message } => ProviderError::MissingData {
                provider: provider.to_string(),
                message,
            }
            .into(),
            OrderError::Provider(e) => e.into(),
            OrderError::Validation(e) => e.into(),
            OrderError::Storage(e) => e.into(),
            OrderError::Ledger(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_names() {
        assert_eq!(Provider::parse("simpleswap").unwrap(), Provider::SimpleSwap);
        assert_eq!(Provider::parse("oswapcc").unwrap(), Provider::OswapCc);
        assert!(matches!(
            Provider::parse("changelly"),
            Err(OrderError::UnknownProvider(_))
        ));
        assert_eq!(
            serde_json::to_string(&Provider::OswapCc).unwrap(),
            "\"oswapcc\""
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(Provider::SimpleSwap.is_finished("finished"));
        assert!(Provider::SimpleSwap.is_finished("sending"));
        assert!(!Provider::SimpleSwap.is_finished("sent"));
        assert!(Provider::OswapCc.is_finished("sent"));
        assert!(!Provider::OswapCc.is_finished("finished"));
    }

    #[test]
    fn test_simpleswap_record() {
        let raw = json!({
            "status": "waiting",
            "address_to": "BUF",
            "currency_from": "btc",
            "amount_from": "0.005",
            "amount_to": "23.4"
        });
        let order = ProviderOrder::from_raw(Provider::SimpleSwap, &raw).unwrap();
        assert_eq!(order.amount_from, Some(0.005));
        assert_eq!(order.amount_to, 23.4);
        assert_eq!(order.currency_from, "btc");
    }

    #[test]
    fn test_oswapcc_record_mapping() {
        let raw = json!({
            "status": "sent",
            "out_address": "BUF",
            "in_coin": "USDT",
            "expected_out_amount": 12.5
        });
        let order = ProviderOrder::from_raw(Provider::OswapCc, &raw).unwrap();
        assert_eq!(order.address_to, "BUF");
        assert_eq!(order.currency_from, "USDT");
        assert_eq!(order.amount_from, None);
        assert_eq!(order.amount_to, 12.5);

        let err = ProviderOrder::from_raw(Provider::OswapCc, &json!({"status": "sent"}));
        assert!(matches!(err, Err(OrderError::BadRecord { .. })));
    }
}
