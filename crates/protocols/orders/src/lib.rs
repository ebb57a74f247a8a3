//! Exchange Order Reconciliation
//!
//! Users fund their buffers through third-party exchanges. This crate
//! records those orders, polls the exchanges until each order completes,
//! prices the realized fee against a fair market rate, and pays the user
//! back the part of the fee above the target, within a daily quota.
//!
//! # Lifecycle
//!
//! - `pending`: recorded, exchange not finished
//! - `done`: fee and compensation fixed
//! - `compensated`: payout sent (or nothing was owed)

pub mod calculator;
pub mod constants;
pub mod fetch;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod rates;
pub mod reconciler;
pub mod state;

pub use calculator::{fee_and_compensation, settle_compensation, to_base_units, FeeAndCompensation};
pub use constants::*;
pub use fetch::{OrderProvider, OswapCcClient, Providers, SimpleSwapClient};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{FixedRates, InMemoryProvider};
pub use rates::{CryptoCompareClient, RateSource};
pub use reconciler::{CompensationPolicy, ExpectedCompensation, OrderReconciler, OrderRequest};
pub use state::{OrderError, Provider, ProviderOrder};
