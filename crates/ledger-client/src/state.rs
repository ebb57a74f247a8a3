//! Upcoming (pending) contract state
//!
//! Two layers: the confirmed state read from the ledger for every followed
//! contract, and a list of speculative overlays, one per submitted or
//! observed trigger unit that has not produced a response yet. Overlays are
//! dropped when the matching response arrives and the confirmed layer is
//! re-read for every contract they touched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use curvebuy_core::{Address, Amount, UnitId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::events::{EventHandler, LedgerEvent};
use crate::{Ledger, Result};

pub type StateVars = Map<String, Value>;

/// Balances by asset (`"base"` for the base currency)
pub type Balances = BTreeMap<String, Amount>;

/// Expected effects of one trigger. A `null` state var deletes the variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectedEffects {
    #[serde(default)]
    pub state_var_updates: BTreeMap<Address, StateVars>,
    #[serde(default)]
    pub balance_deltas: BTreeMap<Address, Balances>,
}

impl ProjectedEffects {
    pub fn with_balance_delta(mut self, aa: &Address, asset: &str, delta: Amount) -> Self {
        *self
            .balance_deltas
            .entry(aa.clone())
            .or_default()
            .entry(asset.to_string())
            .or_insert(0) += delta;
        self
    }

    pub fn with_state_var(mut self, aa: &Address, name: &str, value: Value) -> Self {
        self.state_var_updates
            .entry(aa.clone())
            .or_default()
            .insert(name.to_string(), value);
        self
    }

    /// Contracts whose state or balances this touches
    pub fn affected(&self) -> BTreeSet<Address> {
        self.state_var_updates
            .keys()
            .chain(self.balance_deltas.keys())
            .cloned()
            .collect()
    }
}

/// Projected state of a set of contracts, as served to observers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingSnapshot {
    pub upcoming_state_vars: BTreeMap<Address, StateVars>,
    pub upcoming_balances: BTreeMap<Address, Balances>,
}

impl UpcomingSnapshot {
    pub fn is_empty(&self) -> bool {
        self.upcoming_state_vars.is_empty() && self.upcoming_balances.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct UpcomingState {
    followed: BTreeSet<Address>,
    confirmed_vars: BTreeMap<Address, StateVars>,
    confirmed_balances: BTreeMap<Address, Balances>,
    pending: Vec<(UnitId, ProjectedEffects)>,
}

impl UpcomingState {
    pub fn is_followed(&self, aa: &Address) -> bool {
        self.followed.contains(aa)
    }

    pub fn followed(&self) -> impl Iterator<Item = &Address> {
        self.followed.iter()
    }

    /// Replace the confirmed layer of a contract and mark it followed
    pub fn set_confirmed(&mut self, aa: Address, vars: StateVars, balances: Balances) {
        self.confirmed_vars.insert(aa.clone(), vars);
        self.confirmed_balances.insert(aa.clone(), balances);
        self.followed.insert(aa);
    }

    /// Seed confirmed balances of a contract that has none yet
    pub fn add_balances(&mut self, aa: &Address, balances: Balances) {
        self.confirmed_balances.entry(aa.clone()).or_insert(balances);
    }

    pub fn has_overlay(&self, unit: &UnitId) -> bool {
        self.pending.iter().any(|(u, _)| u == unit)
    }

    /// Add an overlay; false if this unit is already applied
    pub fn apply_overlay(&mut self, unit: UnitId, effects: ProjectedEffects) -> bool {
        if self.has_overlay(&unit) {
            return false;
        }
        self.pending.push((unit, effects));
        true
    }

    /// Drop the overlay of a unit that got its response
    pub fn settle(&mut self, unit: &UnitId) -> Option<ProjectedEffects> {
        let idx = self.pending.iter().position(|(u, _)| u == unit)?;
        Some(self.pending.remove(idx).1)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn upcoming_state_vars(&self, aa: &Address) -> StateVars {
        let mut vars = self.confirmed_vars.get(aa).cloned().unwrap_or_default();
        for (_, effects) in &self.pending {
            let Some(updates) = effects.state_var_updates.get(aa) else {
                continue;
            };
            for (name, value) in updates {
                if value.is_null() {
                    vars.remove(name);
                } else {
                    vars.insert(name.clone(), value.clone());
                }
            }
        }
        vars
    }

    /// `None` if nothing is known about this contract's balances
    pub fn upcoming_balances(&self, aa: &Address) -> Option<Balances> {
        let mut known = false;
        let mut balances = match self.confirmed_balances.get(aa) {
            Some(b) => {
                known = true;
                b.clone()
            }
            None => Balances::new(),
        };
        for (_, effects) in &self.pending {
            if let Some(deltas) = effects.balance_deltas.get(aa) {
                known = true;
                for (asset, delta) in deltas {
                    *balances.entry(asset.clone()).or_insert(0) += delta;
                }
            }
        }
        known.then_some(balances)
    }

    /// Full projected view, used to evaluate getters in pending state
    pub fn view(&self) -> UpcomingSnapshot {
        let mut addresses: BTreeSet<Address> = self
            .confirmed_vars
            .keys()
            .chain(self.confirmed_balances.keys())
            .cloned()
            .collect();
        for (_, effects) in &self.pending {
            addresses.extend(effects.affected());
        }
        let list: Vec<Address> = addresses.into_iter().collect();
        self.snapshot_of(&list)
    }

    /// Projected view restricted to the given contracts
    pub fn snapshot_of(&self, aas: &[Address]) -> UpcomingSnapshot {
        let mut snapshot = UpcomingSnapshot::default();
        for aa in aas {
            snapshot
                .upcoming_state_vars
                .insert(aa.clone(), self.upcoming_state_vars(aa));
            if let Some(balances) = self.upcoming_balances(aa) {
                snapshot.upcoming_balances.insert(aa.clone(), balances);
            }
        }
        snapshot
    }
}

/// Shared upcoming state behind the global pending-state lock
#[derive(Clone)]
pub struct UpcomingStateCache {
    state: Arc<Mutex<UpcomingState>>,
    ledger: Arc<dyn Ledger>,
}

impl UpcomingStateCache {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            state: Arc::new(Mutex::new(UpcomingState::default())),
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Take the pending-state lock. Held across a whole critical section,
    /// e.g. an entire amount search.
    pub async fn lock(&self) -> MutexGuard<'_, UpcomingState> {
        self.state.lock().await
    }

    pub async fn is_followed(&self, aa: &Address) -> bool {
        self.state.lock().await.is_followed(aa)
    }

    /// Start tracking a contract: read its confirmed state and subscribe to its events
    pub async fn follow(&self, aa: &Address) -> Result<()> {
        if self.is_followed(aa).await {
            return Ok(());
        }
        let vars = self.ledger.read_aa_state_vars(aa).await?;
        let balances = self.ledger.read_aa_balances(aa).await?;
        self.ledger.watch_aa(aa).await?;

        let mut state = self.state.lock().await;
        if !state.is_followed(aa) {
            debug!(aa = %aa, "following");
            state.set_confirmed(aa.clone(), vars, balances);
        }
        Ok(())
    }

    pub async fn upcoming_balances(&self, aa: &Address) -> Option<Balances> {
        self.state.lock().await.upcoming_balances(aa)
    }

    /// Projected balances, reading confirmed balances from the ledger if none are known yet
    pub async fn balances_or_fetch(&self, aa: &Address) -> Result<Balances> {
        let mut state = self.state.lock().await;
        if let Some(balances) = state.upcoming_balances(aa) {
            return Ok(balances);
        }
        debug!(aa = %aa, "balances not known yet");
        let balances = self.ledger.read_aa_balances(aa).await?;
        state.add_balances(aa, balances);
        Ok(state.upcoming_balances(aa).unwrap_or_default())
    }

    /// Apply the projected effects of a trigger unit. Idempotent per unit.
    pub async fn apply_request(&self, unit: &UnitId) -> Result<bool> {
        if self.state.lock().await.has_overlay(unit) {
            return Ok(false);
        }
        let effects = self.ledger.project_request(unit).await?;
        let applied = self.state.lock().await.apply_overlay(unit.clone(), effects);
        if applied {
            debug!(unit = %unit, "applied projected effects");
        }
        Ok(applied)
    }

    /// A response arrived: drop the speculative layer and refresh confirmed state
    pub async fn settle_response(&self, trigger_unit: &UnitId, aa: &Address) -> Result<()> {
        let settled = self.state.lock().await.settle(trigger_unit);
        let mut affected = settled.map(|e| e.affected()).unwrap_or_default();
        affected.insert(aa.clone());

        for addr in affected {
            if !self.is_followed(&addr).await {
                continue;
            }
            let vars = self.ledger.read_aa_state_vars(&addr).await?;
            let balances = self.ledger.read_aa_balances(&addr).await?;
            self.state.lock().await.set_confirmed(addr, vars, balances);
        }
        Ok(())
    }

    pub async fn snapshot_of(&self, aas: &[Address]) -> UpcomingSnapshot {
        self.state.lock().await.snapshot_of(aas)
    }
}

#[async_trait]
impl EventHandler for UpcomingStateCache {
    fn name(&self) -> &'static str {
        "upcoming_state"
    }

    async fn on_event(&self, event: &LedgerEvent) -> curvebuy_core::Result<()> {
        match event {
            LedgerEvent::Request(req) => {
                if self.is_followed(&req.aa_address).await {
                    self.apply_request(&req.unit).await?;
                }
            }
            LedgerEvent::Response(resp) => {
                self.settle_response(&resp.trigger_unit, &resp.aa_address)
                    .await?;
            }
            LedgerEvent::DefinitionApplied(_) | LedgerEvent::DataFeedsUpdated => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AaRequest;
    use crate::InMemoryLedger;
    use serde_json::json;

    fn addr(s: &str) -> Address {
        Address::from(s)
    }

    #[test]
    fn test_overlay_on_top_of_confirmed() {
        let aa = addr("CURVE");
        let mut state = UpcomingState::default();
        let mut vars = StateVars::new();
        vars.insert("supply1".into(), json!(100));
        vars.insert("old".into(), json!(true));
        state.set_confirmed(aa.clone(), vars, Balances::from([("base".to_string(), 500)]));

        let effects = ProjectedEffects::default()
            .with_balance_delta(&aa, "base", 250)
            .with_state_var(&aa, "supply1", json!(120))
            .with_state_var(&aa, "old", Value::Null);
        assert!(state.apply_overlay(UnitId::new("U1"), effects.clone()));
        // same unit twice is a no-op
        assert!(!state.apply_overlay(UnitId::new("U1"), effects));

        let vars = state.upcoming_state_vars(&aa);
        assert_eq!(vars["supply1"], json!(120));
        assert!(!vars.contains_key("old"));
        assert_eq!(state.upcoming_balances(&aa).unwrap()["base"], 750);

        assert!(state.settle(&UnitId::new("U1")).is_some());
        assert_eq!(state.upcoming_balances(&aa).unwrap()["base"], 500);
        assert_eq!(state.pending_count(), 0);
    }

    #[test]
    fn test_unknown_balances() {
        let state = UpcomingState::default();
        assert!(state.upcoming_balances(&addr("X")).is_none());
        let snapshot = state.snapshot_of(&[addr("X")]);
        assert!(snapshot.upcoming_balances.is_empty());
        assert!(snapshot.upcoming_state_vars[&addr("X")].is_empty());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = UpcomingSnapshot::default();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("upcomingStateVars").is_some());
        assert!(json.get("upcomingBalances").is_some());
    }

    #[tokio::test]
    async fn test_cache_follow_and_events() {
        let ledger = Arc::new(InMemoryLedger::new("OPERATOR"));
        let buffer = addr("BUF");
        ledger.set_aa_balance(&buffer, "base", 1_000);
        let cache = UpcomingStateCache::new(ledger.clone());

        cache.follow(&buffer).await.unwrap();
        assert!(ledger.is_watched(&buffer));
        assert_eq!(cache.upcoming_balances(&buffer).await.unwrap()["base"], 1_000);

        // a deposit is seen as a request to the followed contract
        let unit = UnitId::new("DEPOSIT");
        ledger.set_projection(
            &unit,
            ProjectedEffects::default().with_balance_delta(&buffer, "base", 200_000),
        );
        let event = LedgerEvent::Request(AaRequest {
            unit: unit.clone(),
            aa_address: buffer.clone(),
            trigger_address: addr("USER"),
            base_amount: Some(200_000),
        });
        cache.on_event(&event).await.unwrap();
        cache.on_event(&event).await.unwrap();
        assert_eq!(cache.upcoming_balances(&buffer).await.unwrap()["base"], 201_000);

        // the ledger settles and the response arrives
        ledger.set_aa_balance(&buffer, "base", 201_000);
        cache.settle_response(&unit, &buffer).await.unwrap();
        assert_eq!(cache.lock().await.pending_count(), 0);
        assert_eq!(cache.upcoming_balances(&buffer).await.unwrap()["base"], 201_000);
    }

    #[tokio::test]
    async fn test_requests_to_unfollowed_contracts_ignored() {
        let ledger = Arc::new(InMemoryLedger::new("OPERATOR"));
        let cache = UpcomingStateCache::new(ledger.clone());
        let event = LedgerEvent::Request(AaRequest {
            unit: UnitId::new("U"),
            aa_address: addr("OTHER"),
            trigger_address: addr("USER"),
            base_amount: None,
        });
        cache.on_event(&event).await.unwrap();
        assert_eq!(cache.lock().await.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_balances_or_fetch_seeds_once() {
        let ledger = Arc::new(InMemoryLedger::new("OPERATOR"));
        let buffer = addr("BUF");
        ledger.set_aa_balance(&buffer, "base", 42);
        let cache = UpcomingStateCache::new(ledger.clone());
        assert_eq!(cache.balances_or_fetch(&buffer).await.unwrap()["base"], 42);
        ledger.set_aa_balance(&buffer, "base", 99);
        // seeded value is kept until a response refreshes it
        assert_eq!(cache.balances_or_fetch(&buffer).await.unwrap()["base"], 42);
    }
}
