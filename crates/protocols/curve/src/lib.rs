//! Bonded Curve Protocol
//!
//! A curve contract issues two tokens against a reserve. The bot buys
//! tokens2 on behalf of buffers, sizing each purchase as the largest amount
//! whose fee stays under the buffer's cap. Pricing is evaluated by the
//! contract's own `get_exchange_result` getter against pending state.

pub mod calculator;
pub mod constants;
pub mod registry;
pub mod solver;
pub mod state;
pub mod tracker;

// Re-exports
pub use calculator::{fee_percent, zero_fee_tokens2};
pub use registry::CurveRegistry;
pub use solver::{solve, PricingOracle, MAX_SOLVER_ITERATIONS};
pub use state::{CurveParams, CurveReserves, ExchangeResult, OracleFeed, Quote, SolverError};
pub use tracker::CurveTracker;
