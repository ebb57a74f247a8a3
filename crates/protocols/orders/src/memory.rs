//! In-process exchange and rate doubles

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use curvebuy_core::ProviderError;
use serde_json::Value;

use crate::fetch::OrderProvider;
use crate::rates::RateSource;
use crate::state::{OrderError, Provider, ProviderOrder};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exchange serving raw records set by the test
pub struct InMemoryProvider {
    provider: Provider,
    orders: Mutex<HashMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            orders: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Set the raw record returned for `id`, in the provider's own field names
    pub fn set_order(&self, id: &str, raw: Value) {
        locked(&self.orders).insert(id.to_string(), raw);
    }

    /// Make lookups of `id` fail until called with `false`
    pub fn set_failing(&self, id: &str, failing: bool) {
        let mut set = locked(&self.failing);
        if failing {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
    }
}

#[async_trait]
impl OrderProvider for InMemoryProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch_order(&self, provider_id: &str) -> Result<ProviderOrder, OrderError> {
        if locked(&self.failing).contains(provider_id) {
            return Err(ProviderError::Http {
                provider: self.provider.to_string(),
                message: "connection reset".into(),
            }
            .into());
        }
        let raw = locked(&self.orders)
            .get(provider_id)
            .cloned()
            .ok_or_else(|| ProviderError::MissingData {
                provider: self.provider.to_string(),
                message: format!("no order {}", provider_id),
            })?;
        ProviderOrder::from_raw(self.provider, &raw)
    }
}

/// Fixed fair rates
#[derive(Default)]
pub struct FixedRates {
    rates: Mutex<HashMap<String, f64>>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, currency: &str, rate: f64) -> Self {
        self.set_rate(currency, rate);
        self
    }

    pub fn set_rate(&self, currency: &str, rate: f64) {
        locked(&self.rates).insert(currency.to_uppercase(), rate);
    }
}

#[async_trait]
impl RateSource for FixedRates {
    async fn fair_rate(&self, currency: &str) -> Result<f64, ProviderError> {
        locked(&self.rates)
            .get(&currency.to_uppercase())
            .copied()
            .ok_or_else(|| ProviderError::MissingData {
                provider: "rates".into(),
                message: format!("no rate for {}", currency),
            })
    }
}
