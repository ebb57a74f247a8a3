//! Registry of tracked curves and the arbitrage contracts trading on them

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use curvebuy_core::Address;
use ledger_client::{EventSender, UpcomingStateCache};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::state::SolverError;
use crate::tracker::CurveTracker;

struct RegistryInner {
    trackers: RwLock<HashMap<Address, Arc<CurveTracker>>>,
    creation_locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
    arbs: RwLock<HashMap<Address, Address>>,
    state: UpcomingStateCache,
    events: Option<EventSender>,
    light: bool,
    refresh_interval: Option<Duration>,
}

/// Owned curve registry, shared by handle
#[derive(Clone)]
pub struct CurveRegistry {
    inner: Arc<RegistryInner>,
}

impl CurveRegistry {
    /// `refresh_interval` of `None` disables the periodic feed refresh
    pub fn new(
        state: UpcomingStateCache,
        events: Option<EventSender>,
        light: bool,
        refresh_interval: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                trackers: RwLock::new(HashMap::new()),
                creation_locks: Mutex::new(HashMap::new()),
                arbs: RwLock::new(HashMap::new()),
                state,
                events,
                light,
                refresh_interval,
            }),
        }
    }

    pub async fn get(&self, curve: &Address) -> Option<Arc<CurveTracker>> {
        self.inner.trackers.read().await.get(curve).cloned()
    }

    pub async fn is_tracked(&self, curve: &Address) -> bool {
        self.inner.trackers.read().await.contains_key(curve)
    }

    /// Tracker for a curve, created on first reference. Concurrent first
    /// references for the same address create one tracker.
    pub async fn get_or_create(&self, curve: &Address) -> Result<Arc<CurveTracker>, SolverError> {
        if let Some(tracker) = self.get(curve).await {
            return Ok(tracker);
        }

        let lock = {
            let mut locks = self.inner.creation_locks.lock().await;
            locks.entry(curve.clone()).or_default().clone()
        };
        let _guard = lock.lock().await;
        if let Some(tracker) = self.get(curve).await {
            return Ok(tracker);
        }

        let tracker = Arc::new(
            CurveTracker::create(
                curve.clone(),
                self.inner.state.clone(),
                self.inner.events.clone(),
                self.inner.light,
            )
            .await?,
        );
        if let Some(interval) = self.inner.refresh_interval {
            tracker.clone().spawn_refresh(interval);
        }
        self.inner
            .trackers
            .write()
            .await
            .insert(curve.clone(), tracker.clone());
        info!(curve = %curve, "tracking curve");
        Ok(tracker)
    }

    pub async fn curves(&self) -> Vec<Address> {
        self.inner.trackers.read().await.keys().cloned().collect()
    }

    pub async fn add_arb(&self, arb: Address, curve: Address) {
        self.inner.arbs.write().await.insert(arb, curve);
    }

    pub async fn curve_of_arb(&self, arb: &Address) -> Option<Address> {
        self.inner.arbs.read().await.get(arb).cloned()
    }
}
