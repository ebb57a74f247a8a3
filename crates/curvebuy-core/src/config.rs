//! Configuration types for curvebuy

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{Error, Result};
use crate::types::Amount;

/// Ledger gateway connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Gateway URL (e.g., "http://127.0.0.1:6612")
    pub url: String,

    /// API key for authenticated endpoints (optional)
    #[serde(default)]
    pub api_key: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6612".to_string(),
            api_key: String::new(),
        }
    }
}

/// Watch list of the upcoming-state feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFeedConfig {
    /// Curve templates: every contract defined from them gets a curve tracker
    #[serde(default)]
    pub curve_base_aas: Vec<String>,

    /// Companion templates (governance, deposits, stability funds, ...)
    #[serde(default)]
    pub other_base_aas: Vec<String>,

    /// Factory contracts followed directly
    #[serde(default)]
    pub factory_aas: Vec<String>,

    /// Maximum concurrent websocket observers
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    100
}

impl Default for StateFeedConfig {
    fn default() -> Self {
        Self {
            curve_base_aas: Vec::new(),
            other_base_aas: Vec::new(),
            factory_aas: Vec::new(),
            max_connections: default_max_connections(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ledger gateway settings
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// API server port
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    #[serde(default)]
    pub testnet: bool,

    /// Buffer template the per-user buffers are instantiated from
    #[serde(default)]
    pub buffer_base_aa: String,

    /// Template every supported curve must be defined from
    #[serde(default)]
    pub curve_base_aa: String,

    #[serde(default)]
    pub arb_base_aa: String,

    /// Paid once to a buffer owner with an empty wallet after the first purchase
    #[serde(default = "default_welcome_amount")]
    pub welcome_amount: Amount,

    #[serde(default)]
    pub simpleswap_api_key: String,

    /// Fee (%) that compensation brings the realized exchange fee down to
    #[serde(default = "default_target_fee")]
    pub target_fee: f64,

    /// Cap on compensation, % of the actual output amount
    #[serde(default = "default_max_compensation")]
    pub max_compensation: f64,

    /// Daily cap on expected compensation, in whole coins
    #[serde(default = "default_daily_compensation_quota")]
    pub daily_compensation_quota: f64,

    /// Currency code fair-market rates are quoted in
    #[serde(default = "default_fair_rate_symbol")]
    pub fair_rate_symbol: String,

    /// Refresh oracle feeds from the bot (light node mode)
    #[serde(default = "default_light")]
    pub light: bool,

    /// Buffers at or below this balance are not worth a purchase
    #[serde(default = "default_min_buffer_balance")]
    pub min_buffer_balance: Amount,

    /// Age after which an underfunded buffer is deactivated
    #[serde(default = "default_stale_buffer_hours")]
    pub stale_buffer_hours: i64,

    #[serde(default = "default_oracle_refresh_secs")]
    pub oracle_refresh_secs: u64,

    #[serde(default = "default_finish_orders_secs")]
    pub finish_orders_secs: u64,

    #[serde(default = "default_pay_compensations_ms")]
    pub pay_compensations_ms: u64,

    #[serde(default)]
    pub state_feed: StateFeedConfig,
}

fn default_database_path() -> String {
    "curvebuy.sqlite".to_string()
}

fn default_web_port() -> u16 {
    8080
}

fn default_welcome_amount() -> Amount {
    100_000
}

fn default_target_fee() -> f64 {
    1.0
}

fn default_max_compensation() -> f64 {
    5.0
}

fn default_daily_compensation_quota() -> f64 {
    10.0
}

fn default_fair_rate_symbol() -> String {
    "GBYTE".to_string()
}

fn default_light() -> bool {
    true
}

fn default_min_buffer_balance() -> Amount {
    100_000
}

fn default_stale_buffer_hours() -> i64 {
    24
}

fn default_oracle_refresh_secs() -> u64 {
    120
}

fn default_finish_orders_secs() -> u64 {
    300
}

fn default_pay_compensations_ms() -> u64 {
    660_013
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            database_path: default_database_path(),
            web_port: default_web_port(),
            testnet: false,
            buffer_base_aa: String::new(),
            curve_base_aa: String::new(),
            arb_base_aa: String::new(),
            welcome_amount: default_welcome_amount(),
            simpleswap_api_key: String::new(),
            target_fee: default_target_fee(),
            max_compensation: default_max_compensation(),
            daily_compensation_quota: default_daily_compensation_quota(),
            fair_rate_symbol: default_fair_rate_symbol(),
            light: default_light(),
            min_buffer_balance: default_min_buffer_balance(),
            stale_buffer_hours: default_stale_buffer_hours(),
            oracle_refresh_secs: default_oracle_refresh_secs(),
            finish_orders_secs: default_finish_orders_secs(),
            pay_compensations_ms: default_pay_compensations_ms(),
            state_feed: StateFeedConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        // testnet instances serve on the next port unless web_port is set
        if config.testnet && !raw.contains("\"web_port\"") {
            config.web_port = default_web_port() + 1;
        }
        Ok(config)
    }

    /// Check settings that have no usable default
    pub fn validate(&self) -> Result<()> {
        if self.simpleswap_api_key.is_empty() {
            return Err(Error::Config("please specify simpleswap_api_key".into()));
        }
        if self.buffer_base_aa.is_empty() || self.curve_base_aa.is_empty() {
            return Err(Error::Config(
                "buffer_base_aa and curve_base_aa must be set".into(),
            ));
        }
        if self.node.url.is_empty() {
            return Err(Error::Config("node.url is empty".into()));
        }
        Ok(())
    }

    pub fn stale_buffer_secs(&self) -> i64 {
        self.stale_buffer_hours * 3600
    }
}
