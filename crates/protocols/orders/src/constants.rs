//! Exchange API endpoints and reconciliation constants

use std::time::Duration;

pub const SIMPLESWAP_API_URL: &str = "https://api.simpleswap.io/v1";

pub const OSWAPCC_API_URL: &str = "https://wallet.obytechina.org/api";

pub const CRYPTOCOMPARE_API_URL: &str = "https://min-api.cryptocompare.com";

/// Timeout for exchange and rate API calls (30 seconds)
pub const PROVIDER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Relative input-amount drift above which the provider's figure replaces ours
pub const AMOUNT_IN_DRIFT: f64 = 0.001;

/// Seconds per quota day
pub const QUOTA_DAY_SECS: i64 = 86_400;
