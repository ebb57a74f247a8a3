//! Data Transfer Objects for API requests and responses

use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `{status: "success", data}` envelope. `data` is omitted when there is none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Success<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Success<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
        }
    }
}

impl Success<()> {
    pub fn empty() -> Self {
        Self {
            status: "success".to_string(),
            data: None,
        }
    }
}

/// `{status: "error", error, code}` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub error: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: error.into(),
            code: code.into(),
        }
    }
}

/// GET /create_buffer
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBufferQuery {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub curve_aa: String,
}

/// GET /get_expected_compensation. Kept as raw strings so malformed numbers
/// surface as `bad_params` rather than a query rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedCompensationQuery {
    #[serde(default)]
    pub amount_in: String,
    #[serde(default)]
    pub currency_in: String,
    #[serde(default)]
    pub amount_out: String,
}
