//! Error types for curvebuy

use thiserror::Error;

/// Core errors that can occur in curvebuy
#[derive(Debug, Error)]
pub enum Error {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Local state disagrees with the event stream. Never retried.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error must stop event processing
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

/// Ledger gateway query and submission errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger unreachable at {url}")]
    Unreachable { url: String },

    #[error("Ledger returned error: {message}")]
    ApiError { message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Unknown address: {address}")]
    NotFound { address: String },

    #[error("Getter {getter} failed on {address}: {message}")]
    GetterFailed {
        address: String,
        getter: String,
        message: String,
    },
}

/// Boundary validation errors, surfaced to the caller and never retried
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid address: {address}")]
    InvalidAddress { address: String },

    #[error("Not an AA: {address}")]
    NotAnAa { address: String },

    #[error("Wrong AA: {address} is not based on {expected_base}")]
    WrongTemplate {
        address: String,
        expected_base: String,
    },

    #[error("Reserve asset of {address} is not the base currency")]
    ReserveNotBase { address: String },

    #[error("No such buffer: {address}")]
    UnknownBuffer { address: String },

    #[error("Wrong provider: {0}")]
    UnknownProvider(String),

    #[error("{field} doesn't match: {expected} !== {actual}")]
    OrderMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Bad params: {0}")]
    BadParams(String),
}

impl ValidationError {
    /// Get an HTTP-friendly error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAddress { .. } => "invalid_address",
            Self::NotAnAa { .. } => "not_an_aa",
            Self::WrongTemplate { .. } => "wrong_aa",
            Self::ReserveNotBase { .. } => "reserve_not_base",
            Self::UnknownBuffer { .. } => "unknown_buffer",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::OrderMismatch { .. } => "order_mismatch",
            Self::BadParams(_) => "bad_params",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidAddress { .. } | Self::BadParams(_) | Self::UnknownProvider(_) => 400,
            Self::UnknownBuffer { .. } => 404,
            Self::NotAnAa { .. } | Self::WrongTemplate { .. } | Self::ReserveNotBase { .. } => {
                422
            }
            Self::OrderMismatch { .. } => 422,
        }
    }
}

/// Third-party exchange and market-rate API errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Http { provider: String, message: String },

    #[error("{provider} returned no data: {message}")]
    MissingData { provider: String, message: String },
}

/// Database errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Failed to open database: {0}")]
    Open(String),
}

/// Result type alias for curvebuy operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_codes() {
        let err = ValidationError::InvalidAddress {
            address: "x".into(),
        };
        assert_eq!(err.error_code(), "invalid_address");
        assert_eq!(err.status_code(), 400);

        let err = ValidationError::OrderMismatch {
            field: "input currency",
            expected: "BTC".into(),
            actual: "ETH".into(),
        };
        assert_eq!(err.error_code(), "order_mismatch");
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.to_string(), "input currency doesn't match: BTC !== ETH");
    }

    #[test]
    fn test_only_invariant_is_fatal() {
        assert!(Error::Invariant("desync".into()).is_fatal());
        assert!(!Error::Ledger(LedgerError::ApiError {
            message: "timeout".into()
        })
        .is_fatal());
        assert!(!Error::Config("x".into()).is_fatal());
    }
}
