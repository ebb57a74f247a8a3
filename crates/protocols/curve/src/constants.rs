//! Curve contract constants

use std::time::Duration;

/// Getter returning the oracle feeds a curve reads
pub const GET_ORACLES_GETTER: &str = "get_oracles";

/// Getter pricing an exchange of `[tokens1, tokens2]`
pub const GET_EXCHANGE_RESULT_GETTER: &str = "get_exchange_result";

/// Default period of the oracle feed refresh
pub const ORACLE_UPDATE_INTERVAL: Duration = Duration::from_secs(2 * 60);
