//! Exchange Order Fetching
//!
//! Clients for the exchange APIs. Only order status lookups are used.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use curvebuy_core::ProviderError;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::constants::{OSWAPCC_API_URL, PROVIDER_REQUEST_TIMEOUT, SIMPLESWAP_API_URL};
use crate::state::{OrderError, Provider, ProviderOrder};

/// Order status lookup at one exchange
#[async_trait]
pub trait OrderProvider: Send + Sync {
    fn provider(&self) -> Provider;

    async fn fetch_order(&self, provider_id: &str) -> Result<ProviderOrder, OrderError>;
}

pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent("curvebuy")
        .timeout(PROVIDER_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Http {
            provider: "http".into(),
            message: e.to_string(),
        })
}

/// `base` with `segments` appended, each percent-encoded as one path segment
pub(crate) fn endpoint(
    base: &str,
    segments: &[&str],
    provider: &str,
) -> Result<Url, ProviderError> {
    let bad_url = |message: String| ProviderError::Http {
        provider: provider.to_string(),
        message,
    };
    let mut url = Url::parse(base).map_err(|e| bad_url(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| bad_url(format!("{} cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Send a GET built by the caller, mapping every failure to `ProviderError::Http`
pub(crate) async fn get_json(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<Value, ProviderError> {
    let http_err = |message: String| ProviderError::Http {
        provider: provider.to_string(),
        message,
    };
    let response = request
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| http_err(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(http_err(format!("HTTP {}: {}", status, body)));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| http_err(e.to_string()))
}

pub struct SimpleSwapClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SimpleSwapClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(SIMPLESWAP_API_URL, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn status_request(&self, provider_id: &str) -> Result<reqwest::RequestBuilder, ProviderError> {
        let url = endpoint(&self.base_url, &["get_exchange"], self.provider().as_str())?;
        Ok(self
            .http
            .get(url)
            .query(&[("api_key", self.api_key.as_str()), ("id", provider_id)]))
    }
}

#[async_trait]
impl OrderProvider for SimpleSwapClient {
    fn provider(&self) -> Provider {
        Provider::SimpleSwap
    }

    async fn fetch_order(&self, provider_id: &str) -> Result<ProviderOrder, OrderError> {
        let raw = get_json(self.status_request(provider_id)?, self.provider().as_str()).await?;
        debug!(provider_id, "simpleswap order fetched");
        ProviderOrder::from_raw(self.provider(), &raw)
    }
}

pub struct OswapCcClient {
    http: reqwest::Client,
    base_url: String,
}

impl OswapCcClient {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(OSWAPCC_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into(),
        })
    }

    fn status_request(&self, provider_id: &str) -> Result<reqwest::RequestBuilder, ProviderError> {
        let url = endpoint(
            &self.base_url,
            &["get_status", provider_id],
            self.provider().as_str(),
        )?;
        Ok(self.http.get(url))
    }
}

#[async_trait]
impl OrderProvider for OswapCcClient {
    fn provider(&self) -> Provider {
        Provider::OswapCc
    }

    async fn fetch_order(&self, provider_id: &str) -> Result<ProviderOrder, OrderError> {
        let raw = get_json(self.status_request(provider_id)?, self.provider().as_str()).await?;
        // the record is wrapped in {data}
        let data = raw
            .get("data")
            .filter(|d| !d.is_null())
            .ok_or_else(|| ProviderError::MissingData {
                provider: self.provider().to_string(),
                message: format!("no data in response {}", raw),
            })?;
        debug!(provider_id, "oswapcc order fetched");
        ProviderOrder::from_raw(self.provider(), data)
    }
}

/// The configured exchange clients, by provider
#[derive(Clone, Default)]
pub struct Providers {
    clients: HashMap<Provider, Arc<dyn OrderProvider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, client: Arc<dyn OrderProvider>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    pub fn get(&self, provider: Provider) -> Result<&Arc<dyn OrderProvider>, OrderError> {
        self.clients
            .get(&provider)
            .ok_or_else(|| OrderError::UnknownProvider(provider.to_string()))
    }
}
