//! Fee-bounded purchase sizing
//!
//! Finds the largest tokens2 amount whose fee stays under a cap and whose
//! cost fits the balance. Each evaluation is a getter call, so the search
//! is capped at `MAX_SOLVER_ITERATIONS`. The pricing function is not
//! guaranteed monotonic and the rescale step assumes local linearity, so
//! this is a heuristic: whatever it returns satisfies both constraints,
//! but it is not necessarily the true maximum.

use async_trait::async_trait;
use curvebuy_core::Amount;
use tracing::debug;

use crate::state::{Quote, SolverError};

/// Maximum pricing evaluations per search
pub const MAX_SOLVER_ITERATIONS: usize = 10;

/// Prices a candidate tokens2 amount
#[async_trait]
pub trait PricingOracle: Send + Sync {
    async fn quote(&self, tokens2: Amount) -> Result<Quote, SolverError>;
}

/// Search `[0, upper_bound]` for the largest acceptable amount; 0 if none is.
pub async fn solve<P: PricingOracle + ?Sized>(
    upper_bound: Amount,
    balance: Amount,
    max_fee_percent: f64,
    oracle: &P,
) -> Result<Amount, SolverError> {
    if balance <= 0 || upper_bound <= 0 {
        return Ok(0);
    }

    let mut top = upper_bound;
    let mut bottom: Amount = 0;
    let mut best: Amount = 0;
    let mut candidate = top;

    for iteration in 1..=MAX_SOLVER_ITERATIONS {
        if candidate <= 0 {
            break;
        }
        let quote = oracle.quote(candidate).await?;
        debug!(
            iteration,
            candidate,
            fee_percent = quote.fee_percent,
            reserve_needed = quote.reserve_needed,
            "tested amount"
        );

        let next = if quote.fee_percent <= max_fee_percent {
            if quote.reserve_needed <= balance as f64 {
                best = candidate;
                if candidate >= top {
                    break;
                }
                // go up
                bottom = candidate;
                candidate + (top - candidate) / 2
            } else {
                // too expensive: scale down assuming linear cost
                top = (candidate as f64 * balance as f64 / quote.reserve_needed).floor() as Amount;
                top
            }
        } else {
            // fee too high: go down
            top = candidate;
            bottom + (candidate - bottom) / 2
        };

        // a deterministic oracle gives the same answer twice
        if next == candidate {
            break;
        }
        candidate = next;
    }

    debug!(best, "search finished");
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FnOracle<F> {
        f: F,
        calls: AtomicUsize,
    }

    impl<F> FnOracle<F>
    where
        F: Fn(Amount) -> Quote + Send + Sync,
    {
        fn new(f: F) -> Self {
            Self {
                f,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<F> PricingOracle for FnOracle<F>
    where
        F: Fn(Amount) -> Quote + Send + Sync,
    {
        async fn quote(&self, tokens2: Amount) -> Result<Quote, SolverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.f)(tokens2))
        }
    }

    /// Linear cost with a fee that grows with size
    fn growing_fee(price: f64, fee_per_unit: f64) -> impl Fn(Amount) -> Quote + Send + Sync {
        move |t| Quote {
            fee_percent: t as f64 * fee_per_unit,
            reserve_needed: t as f64 * price,
        }
    }

    #[tokio::test]
    async fn test_zero_balance_returns_zero() {
        let oracle = FnOracle::new(growing_fee(1.0, 0.0));
        assert_eq!(solve(1_000, 0, 1.0, &oracle).await.unwrap(), 0);
        assert_eq!(solve(1_000, -5, 1.0, &oracle).await.unwrap(), 0);
        assert_eq!(solve(0, 1_000, 1.0, &oracle).await.unwrap(), 0);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_scenario_linear_cost() {
        // 100 tokens cost 140000 at 0.5% fee
        let oracle = FnOracle::new(|t: Amount| Quote {
            fee_percent: 0.5,
            reserve_needed: t as f64 * 1400.0,
        });
        let amount = solve(200, 150_000, 1.0, &oracle).await.unwrap();
        assert!(amount >= 100);
        assert!(amount as f64 * 1400.0 <= 150_000.0);
    }

    #[tokio::test]
    async fn test_upper_bound_accepted_immediately() {
        let oracle = FnOracle::new(growing_fee(1.0, 0.0));
        assert_eq!(solve(500, 1_000, 1.0, &oracle).await.unwrap(), 500);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_fee_cap_binds() {
        // fee reaches 1% at 1000 tokens
        let oracle = FnOracle::new(growing_fee(1.0, 0.001));
        let amount = solve(4_000, 1_000_000, 1.0, &oracle).await.unwrap();
        assert!(amount > 0);
        assert!(amount <= 1_000);
        assert!(oracle.calls() <= MAX_SOLVER_ITERATIONS);
    }

    #[tokio::test]
    async fn test_never_more_than_ten_evaluations() {
        // fee always too high: bisects down towards zero
        let oracle = FnOracle::new(|_| Quote {
            fee_percent: 50.0,
            reserve_needed: 1.0,
        });
        assert_eq!(solve(1 << 40, 1_000, 1.0, &oracle).await.unwrap(), 0);
        assert_eq!(oracle.calls(), MAX_SOLVER_ITERATIONS);
    }

    #[tokio::test]
    async fn test_results_respect_constraints() {
        // non-monotone fee: bumps at multiples of 7
        let pricing = |t: Amount| Quote {
            fee_percent: if t % 7 == 0 { 3.0 } else { (t as f64).sqrt() / 40.0 },
            reserve_needed: t as f64 * 90.0 + (t as f64).powf(1.3),
        };
        for &(upper, balance, cap) in &[
            (10_000, 200_000, 1.0),
            (10_000, 2_000_000, 2.0),
            (333, 50_000, 0.4),
            (1_000_000, 5_000_000, 1.5),
            (17, 100, 1.0),
        ] {
            let oracle = FnOracle::new(pricing);
            let amount = solve(upper, balance, cap, &oracle).await.unwrap();
            if amount > 0 {
                let q = pricing(amount);
                assert!(q.fee_percent <= cap, "fee {} > {}", q.fee_percent, cap);
                assert!(q.reserve_needed <= balance as f64);
            }
            assert!(oracle.calls() <= MAX_SOLVER_ITERATIONS);
        }
    }

    #[tokio::test]
    async fn test_bisects_near_amount_max() {
        let threshold = Amount::MAX / 4 * 3;
        let oracle = FnOracle::new(move |t: Amount| Quote {
            fee_percent: if t < threshold { 0.1 } else { 5.0 },
            reserve_needed: 1.0,
        });
        let amount = solve(Amount::MAX, 1_000, 1.0, &oracle).await.unwrap();
        assert!(amount >= Amount::MAX / 2);
        assert!(amount < threshold);
        assert!(oracle.calls() <= MAX_SOLVER_ITERATIONS);
    }

    #[tokio::test]
    async fn test_oracle_error_propagates() {
        struct Failing;
        #[async_trait]
        impl PricingOracle for Failing {
            async fn quote(&self, _: Amount) -> Result<Quote, SolverError> {
                Err(SolverError::BadGetterResult("boom".into()))
            }
        }
        assert!(solve(10, 10, 1.0, &Failing).await.is_err());
    }
}
