//! Curve address validation

use curvebuy_core::{constants::BASE_ASSET, Address, ValidationError};
use ledger_client::{is_valid_address, Ledger};
use serde_json::Value;

use crate::state::BufferError;

/// Check that `curve` is a curve contract from `curve_base_aa` whose
/// reserve is the base currency
pub async fn validate_curve_aa(
    ledger: &dyn Ledger,
    curve: &Address,
    curve_base_aa: &Address,
) -> Result<(), BufferError> {
    if !is_valid_address(curve.as_str()) {
        return Err(ValidationError::InvalidAddress {
            address: curve.to_string(),
        }
        .into());
    }
    let row = ledger
        .read_aa_definition(curve)
        .await?
        .ok_or_else(|| ValidationError::NotAnAa {
            address: curve.to_string(),
        })?;
    if row.base_aa.as_ref() != Some(curve_base_aa) {
        return Err(ValidationError::WrongTemplate {
            address: curve.to_string(),
            expected_base: curve_base_aa.to_string(),
        }
        .into());
    }
    let reserve_asset = row
        .params()
        .and_then(|p| p.get("reserve_asset"))
        .and_then(Value::as_str)
        .unwrap_or(BASE_ASSET);
    if reserve_asset != BASE_ASSET {
        return Err(ValidationError::ReserveNotBase {
            address: curve.to_string(),
        }
        .into());
    }
    Ok(())
}
