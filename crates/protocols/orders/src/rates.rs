//! Fair market rates

use async_trait::async_trait;
use curvebuy_core::ProviderError;
use serde_json::Value;
use tracing::debug;

use crate::constants::CRYPTOCOMPARE_API_URL;
use crate::fetch::{endpoint, get_json, http_client};

/// Source of fair exchange rates into the bought token
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Units of the bought token per unit of `currency`
    async fn fair_rate(&self, currency: &str) -> Result<f64, ProviderError>;
}

pub struct CryptoCompareClient {
    http: reqwest::Client,
    base_url: String,
    symbol: String,
}

impl CryptoCompareClient {
    /// `symbol` is the ticker of the bought token, e.g. GBYTE
    pub fn new(symbol: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(CRYPTOCOMPARE_API_URL, symbol)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into(),
            symbol: symbol.into(),
        })
    }

    fn price_request(&self, currency: &str) -> Result<reqwest::RequestBuilder, ProviderError> {
        let url = endpoint(&self.base_url, &["data", "price"], "cryptocompare")?;
        Ok(self
            .http
            .get(url)
            .query(&[("fsym", currency), ("tsyms", self.symbol.as_str())]))
    }
}

#[async_trait]
impl RateSource for CryptoCompareClient {
    async fn fair_rate(&self, currency: &str) -> Result<f64, ProviderError> {
        let raw = get_json(self.price_request(currency)?, "cryptocompare").await?;
        let rate = parse_rate(&raw, &self.symbol)?;
        debug!(currency, rate, "fair rate fetched");
        Ok(rate)
    }
}

fn parse_rate(raw: &Value, symbol: &str) -> Result<f64, ProviderError> {
    raw.get(symbol)
        .and_then(Value::as_f64)
        .filter(|r| *r > 0.0)
        .ok_or_else(|| ProviderError::MissingData {
            provider: "cryptocompare".into(),
            message: format!("no {} in response {}", symbol, raw),
        })
}
