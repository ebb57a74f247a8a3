//! Curve State Types
//!
//! Curve parameters, reserve snapshot, getter results, and errors.

use curvebuy_core::{constants::BASE_ASSET, Address, LedgerError};
use ledger_client::StateVars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::calculator;

/// Static parameters of a curve contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    #[serde(default = "default_reserve_asset")]
    pub reserve_asset: String,
    #[serde(default = "default_reserve_decimals")]
    pub reserve_asset_decimals: i32,
    #[serde(default = "default_decimals1")]
    pub decimals1: i32,
    #[serde(default = "default_decimals2")]
    pub decimals2: i32,
    /// Exponent of supply1
    #[serde(default = "default_m")]
    pub m: f64,
    /// Exponent of supply2
    #[serde(default = "default_n")]
    pub n: f64,
}

// contract-side defaults for omitted params
fn default_reserve_asset() -> String {
    BASE_ASSET.to_string()
}

fn default_reserve_decimals() -> i32 {
    9
}

fn default_decimals1() -> i32 {
    9
}

fn default_decimals2() -> i32 {
    2
}

fn default_m() -> f64 {
    2.0
}

fn default_n() -> f64 {
    0.5
}

impl CurveParams {
    pub fn from_value(params: &Value) -> Result<Self, SolverError> {
        let parsed: Self = serde_json::from_value(params.clone())
            .map_err(|e| SolverError::InvalidParams(e.to_string()))?;
        if parsed.n == 0.0 {
            return Err(SolverError::InvalidParams("n must be non-zero".into()));
        }
        Ok(parsed)
    }
}

/// Reserve and supplies as seen in (pending) state vars
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CurveReserves {
    pub reserve: f64,
    pub supply1: f64,
    pub supply2: f64,
}

impl CurveReserves {
    pub fn from_vars(vars: &StateVars) -> Self {
        let num = |name: &str| vars.get(name).and_then(Value::as_f64).unwrap_or(0.0);
        Self {
            reserve: num("reserve"),
            supply1: num("supply1"),
            supply2: num("supply2"),
        }
    }
}

/// One oracle feed a curve depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleFeed {
    pub oracle: Address,
    pub feed_name: String,
}

/// Result of the `get_exchange_result` getter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeResult {
    /// Reserve the buyer must pay, fees included
    pub reserve_needed: f64,
    /// Net change of the curve reserve
    #[serde(default)]
    pub reserve_delta: f64,
    /// Total fee charged, in reserve units
    #[serde(default)]
    pub fee: f64,
}

impl ExchangeResult {
    pub fn quote(&self) -> Quote {
        Quote {
            fee_percent: calculator::fee_percent(self.fee, self.reserve_delta),
            reserve_needed: self.reserve_needed,
        }
    }
}

/// What the solver needs to know about one candidate amount
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub fee_percent: f64,
    pub reserve_needed: f64,
}

/// Curve protocol errors
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Invalid curve params: {0}")]
    InvalidParams(String),

    #[error("{0} is not a curve contract")]
    NotACurve(Address),

    #[error("Unexpected getter result: {0}")]
    BadGetterResult(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<SolverError> for curvebuy_core::Error {
    fn from(e: SolverError) -> Self {
        match e {
            SolverError::Ledger(e) => Self::Ledger(e),
            other => Self::Ledger(LedgerError::ApiError {
                message: other.to_string(),
            }),
        }
    }
}
