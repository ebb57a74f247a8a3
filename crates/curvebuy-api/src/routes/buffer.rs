//! Buffer endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use buffer::{validate_curve_aa, BufferInfo};
use curvebuy_core::{Address, ValidationError};
use ledger_client::is_valid_address;
use serde_json::Value;

use crate::dto::{CreateBufferQuery, Success};
use crate::{ApiError, AppState};

/// GET /create_buffer?address=&curve_aa= - Buffer of an owner on a curve,
/// created on first request
pub async fn create_buffer(
    State(state): State<AppState>,
    Query(query): Query<CreateBufferQuery>,
) -> Result<Json<Success<BufferInfo>>, ApiError> {
    tracing::debug!(owner = %query.address, curve = %query.curve_aa, "create_buffer");
    if !is_valid_address(&query.address) {
        return Err(ValidationError::InvalidAddress {
            address: query.address,
        }
        .into());
    }
    let owner = Address::new(query.address);
    let curve = Address::new(query.curve_aa);
    validate_curve_aa(state.ledger(), &curve, state.curve_base_aa()).await?;

    let info = state.buffers().get_or_create_buffer(&owner, &curve).await?;
    Ok(Json(Success::new(info)))
}

/// GET /aa/:address - Definition of a known contract
pub async fn get_aa(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Success<Value>>, ApiError> {
    if !is_valid_address(&address) {
        return Err(ValidationError::InvalidAddress { address }.into());
    }
    let address = Address::new(address);
    match state.ledger().read_aa_definition(&address).await? {
        Some(row) => Ok(Json(Success::new(row.definition))),
        None => Err(ApiError::NotTracking(address)),
    }
}
