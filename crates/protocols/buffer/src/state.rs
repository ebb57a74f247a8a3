//! Buffer types and errors

use curve::SolverError;
use curvebuy_core::{Address, LedgerError, StorageError, ValidationError};
use orders::OrderError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// What a user needs to fund a buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferInfo {
    pub buffer_address: Address,
    pub definition: Value,
}

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Failed to define buffer {0}")]
    DefineFailed(Address),

    /// Local pending state disagrees with the event stream
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl From<BufferError> for curvebuy_core::Error {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::Invariant(msg) => Self::Invariant(msg),
            BufferError::DefineFailed(addr) => Self::Ledger(LedgerError::ApiError {
                message: format!("failed to define buffer {}", addr),
            }),
            BufferError::Validation(e) => e.into(),
            BufferError::Storage(e) => e.into(),
            BufferError::Ledger(e) => e.into(),
            BufferError::Solver(e) => e.into(),
            BufferError::Order(e) => e.into(),
        }
    }
}
