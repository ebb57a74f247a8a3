//! Curve Calculator
//!
//! Pure math, no async, no ledger.
//!
//! The curve keeps `reserve = s1^m * s2^n` (in display units), so with
//! no fees the tokens2 obtainable for `dr` more reserve is
//!   s2' = ((r + dr) / s1^m)^(1/n),  ds2 = s2' - s2

use curvebuy_core::Amount;

use crate::state::{CurveParams, CurveReserves};

/// Tokens2 bought for `dr` reserve if there were no fees. Used only to seed
/// the search. Returns 0 for degenerate curves.
pub fn zero_fee_tokens2(params: &CurveParams, reserves: &CurveReserves, dr: Amount) -> Amount {
    let new_r = (reserves.reserve + dr as f64) / 10f64.powi(params.reserve_asset_decimals);
    let s1 = reserves.supply1 / 10f64.powi(params.decimals1);
    let new_s2 = (new_r / s1.powf(params.m)).powf(1.0 / params.n);
    let ds2 = (new_s2 * 10f64.powi(params.decimals2) - reserves.supply2).floor();
    if !ds2.is_finite() || ds2 <= 0.0 {
        return 0;
    }
    ds2.min(Amount::MAX as f64) as Amount
}

/// Fee as a percentage of turnover. No turnover is an infinitely bad price.
pub fn fee_percent(fee: f64, reserve_delta: f64) -> f64 {
    let turnover = reserve_delta.abs();
    if turnover == 0.0 {
        return f64::INFINITY;
    }
    fee / turnover * 100.0
}
