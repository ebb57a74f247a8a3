//! Fee and Compensation Calculator
//!
//! Pure math, no IO. Amounts are in whole units of the bought token.
//!
//! fair_out = fair_rate * amount_in
//! fee%     = (fair_out - amount_out) / fair_out * 100
//!
//! Compensation tops the user up to the output they would have received
//! at the target fee, capped at a percentage of what they did receive.

use curvebuy_core::{constants::UNITS_PER_COIN, Amount};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeAndCompensation {
    /// Realized fee in percent; negative when the user got more than fair
    pub fee: f64,
    pub compensation: f64,
}

pub fn fee_and_compensation(
    fair_rate: f64,
    amount_in: f64,
    amount_out: f64,
    target_fee: f64,
    max_compensation: f64,
) -> FeeAndCompensation {
    let fair_amount_out = fair_rate * amount_in;
    if fair_amount_out.is_nan() || fair_amount_out <= 0.0 {
        return FeeAndCompensation {
            fee: 0.0,
            compensation: 0.0,
        };
    }
    let fee = (fair_amount_out - amount_out) / fair_amount_out * 100.0;
    let mut compensation = 0.0;
    if fee > 0.0 {
        let target_amount_out = fair_amount_out * (1.0 - target_fee / 100.0);
        if amount_out < target_amount_out {
            compensation =
                (target_amount_out - amount_out).min(amount_out * max_compensation / 100.0);
        }
    }
    FeeAndCompensation { fee, compensation }
}

/// Final compensation of a finished order: nothing for orders admitted over
/// quota, and exactly zero when it is below one minor unit.
pub fn settle_compensation(is_eligible: bool, compensation: f64) -> Option<f64> {
    if !is_eligible {
        None
    } else if to_base_units(compensation) == 0 {
        Some(0.0)
    } else {
        Some(compensation)
    }
}

/// Whole coins to base-currency minor units, rounded down
pub fn to_base_units(coins: f64) -> Amount {
    (coins * UNITS_PER_COIN as f64).floor() as Amount
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_percent_fee() {
        // 100 USD at 20 per USD, 3% below fair
        let res = fee_and_compensation(20.0, 100.0, 1940.0, 1.0, 10.0);
        assert!((res.fee - 3.0).abs() < 1e-9);
        // shortfall to 1980 is 40, cap is 194
        assert!((res.compensation - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_cap_binds() {
        let res = fee_and_compensation(20.0, 100.0, 1000.0, 1.0, 5.0);
        assert!((res.fee - 50.0).abs() < 1e-9);
        assert!((res.compensation - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_within_target_or_reward() {
        let within = fee_and_compensation(20.0, 100.0, 1990.0, 1.0, 5.0);
        assert!(within.fee > 0.0);
        assert_eq!(within.compensation, 0.0);

        let reward = fee_and_compensation(20.0, 100.0, 2100.0, 1.0, 5.0);
        assert!(reward.fee < 0.0);
        assert_eq!(reward.compensation, 0.0);
    }

    #[test]
    fn test_compensation_bounds() {
        for &(rate, amount_in, out, target, cap) in &[
            (20.0, 100.0, 1940.0, 1.0, 10.0),
            (0.3, 7.0, 1.1, 0.5, 5.0),
            (1.0, 1.0, 0.0, 1.0, 5.0),
            (3.5, 12.0, 45.0, 2.0, 1.0),
            (3.5, 12.0, 30.0, 2.0, 100.0),
        ] {
            let res = fee_and_compensation(rate, amount_in, out, target, cap);
            assert!(res.compensation >= 0.0);
            assert!(res.compensation <= out * cap / 100.0 + 1e-12);
        }
    }

    #[test]
    fn test_no_fair_value() {
        let res = fee_and_compensation(0.0, 100.0, 10.0, 1.0, 5.0);
        assert_eq!(res.compensation, 0.0);
    }

    #[test]
    fn test_settle() {
        assert_eq!(settle_compensation(false, 40.0), None);
        assert_eq!(settle_compensation(true, 4e-10), Some(0.0));
        assert_eq!(settle_compensation(true, 0.5), Some(0.5));
    }

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units(1.5), 1_500_000_000);
        assert_eq!(to_base_units(9e-10), 0);
    }
}
