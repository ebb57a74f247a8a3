//! Exchange order endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use curvebuy_core::ValidationError;
use orders::{ExpectedCompensation, OrderRequest};
use serde_json::Value;

use crate::dto::{ExpectedCompensationQuery, Success};
use crate::{ApiError, AppState};

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|x| x.is_finite())
}

/// GET /get_expected_compensation?amount_in=&currency_in=&amount_out=
pub async fn get_expected_compensation(
    State(state): State<AppState>,
    Query(query): Query<ExpectedCompensationQuery>,
) -> Result<Json<Success<ExpectedCompensation>>, ApiError> {
    let (Some(amount_in), Some(amount_out)) =
        (parse_finite(&query.amount_in), parse_finite(&query.amount_out))
    else {
        return Err(ValidationError::BadParams("amounts must be numbers".into()).into());
    };
    if query.currency_in.is_empty() {
        return Err(ValidationError::BadParams("currency_in is required".into()).into());
    }

    let expected = state
        .orders()
        .expected_compensation(amount_in, &query.currency_in, amount_out)
        .await?;
    Ok(Json(Success::new(expected)))
}

/// POST /create_order - Register an exchange order funding a buffer
pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Success<()>>, ApiError> {
    let request: OrderRequest = serde_json::from_value(body)
        .map_err(|e| ValidationError::BadParams(e.to_string()))?;
    tracing::info!(
        provider = %request.provider,
        provider_id = %request.provider_id,
        buffer = %request.buffer_address,
        "create_order"
    );

    if !state.orders().create_order(&request).await? {
        tracing::debug!(provider_id = %request.provider_id, "order already recorded");
    }
    Ok(Json(Success::empty()))
}
