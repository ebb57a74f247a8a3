//! Application state shared across API handlers

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use buffer::{BufferError, BufferOrchestrator};
use curvebuy_core::{Address, LedgerError, ValidationError};
use ledger_client::Ledger;
use orders::{OrderError, OrderReconciler};
use thiserror::Error;

use crate::broadcast::StateBroadcaster;
use crate::dto::ErrorBody;

/// Errors returned by the API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not tracking this AA: {0}")]
    NotTracking(Address),

    #[error(transparent)]
    Internal(curvebuy_core::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST)
            }
            Self::NotTracking(_) => StatusCode::NOT_FOUND,
            Self::Internal(curvebuy_core::Error::Ledger(_))
            | Self::Internal(curvebuy_core::Error::Provider(_)) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::NotTracking(_) => "not_tracking",
            Self::Internal(curvebuy_core::Error::Ledger(_)) => "ledger_error",
            Self::Internal(curvebuy_core::Error::Provider(_)) => "provider_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<curvebuy_core::Error> for ApiError {
    fn from(e: curvebuy_core::Error) -> Self {
        match e {
            curvebuy_core::Error::Validation(e) => Self::Validation(e),
            other => Self::Internal(other),
        }
    }
}

impl From<BufferError> for ApiError {
    fn from(e: BufferError) -> Self {
        curvebuy_core::Error::from(e).into()
    }
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        curvebuy_core::Error::from(e).into()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self::Internal(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{}", self);
        } else {
            tracing::warn!(code = self.error_code(), "{}", self);
        }
        let body = ErrorBody::new(self.error_code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    buffers: Arc<BufferOrchestrator>,
    orders: Arc<OrderReconciler>,
    ledger: Arc<dyn Ledger>,
    curve_base_aa: Address,
    feed: Arc<StateBroadcaster>,
}

impl AppState {
    pub fn new(
        buffers: Arc<BufferOrchestrator>,
        orders: Arc<OrderReconciler>,
        ledger: Arc<dyn Ledger>,
        curve_base_aa: Address,
        feed: Arc<StateBroadcaster>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                buffers,
                orders,
                ledger,
                curve_base_aa,
                feed,
            }),
        }
    }

    pub fn buffers(&self) -> &BufferOrchestrator {
        &self.inner.buffers
    }

    pub fn orders(&self) -> &OrderReconciler {
        &self.inner.orders
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.inner.ledger.as_ref()
    }

    /// Template every curve a buffer is created for must come from
    pub fn curve_base_aa(&self) -> &Address {
        &self.inner.curve_base_aa
    }

    pub fn feed(&self) -> &Arc<StateBroadcaster> {
        &self.inner.feed
    }
}
