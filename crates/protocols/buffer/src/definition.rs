//! Buffer contract definitions

use curvebuy_core::{constants::DEFAULT_MAX_FEE_PERCENT, Address};
use ledger_client::{definition_params, derive_address};
use serde_json::{json, Value};

/// Definition of the buffer of `owner` on `curve`, instantiated from `base_aa`
pub fn buffer_definition(base_aa: &Address, owner: &Address, curve: &Address) -> Value {
    json!(["autonomous agent", {
        "base_aa": base_aa,
        "params": {
            "address": owner,
            "curve_aa": curve,
        }
    }])
}

/// Address of the buffer of `owner` on `curve`. Pure: same inputs, same address.
pub fn buffer_address(base_aa: &Address, owner: &Address, curve: &Address) -> Address {
    derive_address(&buffer_definition(base_aa, owner, curve))
}

/// Fee cap (percent) of a buffer's purchases
pub fn max_fee_percent(definition: &Value) -> f64 {
    definition_params(definition)
        .and_then(|p| p.get("max_fee_percent"))
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_MAX_FEE_PERCENT)
}
