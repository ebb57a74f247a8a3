//! Buffer Accounts
//!
//! A buffer is a per-user contract, one per (owner, curve) pair, that
//! collects deposits until the bot spends them on the curve's tokens2.
//!
//! # States
//!
//! - idle (`in_work = 0`): nothing to do until a deposit or response arrives
//! - active (`in_work = 1`): retried by every sweep until done or stale

pub mod definition;
pub mod orchestrator;
pub mod state;
pub mod validate;

pub use definition::{buffer_address, buffer_definition, max_fee_percent};
pub use orchestrator::{BufferOrchestrator, BufferSettings};
pub use state::{BufferError, BufferInfo};
pub use validate::validate_curve_aa;
