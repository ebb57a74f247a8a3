//! In-process ledger for tests and local runs

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use curvebuy_core::{constants::BASE_ASSET, Address, Amount, LedgerError, UnitId};
use serde_json::Value;

use crate::address::{definition_base_aa, derive_address};
use crate::state::{Balances, ProjectedEffects, StateVars, UpcomingSnapshot};
use crate::{AaDefinitionRow, Ledger, Result};

/// Getter implementation: `(args, state view) -> result`
pub type GetterFn = Arc<dyn Fn(&[Value], &UpcomingSnapshot) -> Result<Value> + Send + Sync>;

/// Effects of a request the operator submits
pub type RequestEffectsFn = Arc<dyn Fn(&SentRequest) -> ProjectedEffects + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub unit: UnitId,
    pub aa: Address,
    pub amount: Amount,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentPayment {
    pub unit: UnitId,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Default)]
struct Inner {
    definitions: BTreeMap<Address, AaDefinitionRow>,
    state_vars: BTreeMap<Address, StateVars>,
    aa_balances: BTreeMap<Address, Balances>,
    balances: BTreeMap<Address, Amount>,
    getters: HashMap<(Address, String), GetterFn>,
    request_effects: Option<RequestEffectsFn>,
    projections: HashMap<UnitId, ProjectedEffects>,
    requests: Vec<SentRequest>,
    payments: Vec<SentPayment>,
    defined: Vec<Value>,
    prior_payees: BTreeSet<Address>,
    feed_changes: BTreeSet<(Address, String)>,
    feed_update_calls: usize,
    watched: BTreeSet<Address>,
    reject_submissions: bool,
    offline: bool,
    payment_delay: Option<Duration>,
    next_unit: u64,
}

impl Inner {
    fn next_unit(&mut self) -> UnitId {
        self.next_unit += 1;
        UnitId::new(format!("UNIT{}", self.next_unit))
    }

    fn confirmed_view(&self) -> UpcomingSnapshot {
        UpcomingSnapshot {
            upcoming_state_vars: self.state_vars.clone(),
            upcoming_balances: self.aa_balances.clone(),
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            return Err(LedgerError::Unreachable {
                url: "memory".into(),
            });
        }
        Ok(())
    }
}

/// Ledger kept entirely in memory
pub struct InMemoryLedger {
    operator: Address,
    inner: Mutex<Inner>,
}

impl InMemoryLedger {
    pub fn new(operator: &str) -> Self {
        Self {
            operator: Address::from(operator),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a contract under its derived address
    pub fn add_aa(&self, definition: Value) -> Address {
        let address = derive_address(&definition);
        self.insert_aa(AaDefinitionRow {
            address: address.clone(),
            base_aa: definition_base_aa(&definition),
            definition,
        });
        address
    }

    /// Register a contract under an arbitrary address
    pub fn insert_aa(&self, row: AaDefinitionRow) {
        self.inner().definitions.insert(row.address.clone(), row);
    }

    pub fn set_state_var(&self, aa: &Address, name: &str, value: Value) {
        self.inner()
            .state_vars
            .entry(aa.clone())
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn set_aa_balance(&self, aa: &Address, asset: &str, amount: Amount) {
        self.inner()
            .aa_balances
            .entry(aa.clone())
            .or_default()
            .insert(asset.to_string(), amount);
    }

    /// Base-currency balance of a plain address
    pub fn set_balance(&self, address: &Address, amount: Amount) {
        self.inner().balances.insert(address.clone(), amount);
    }

    pub fn set_getter<F>(&self, aa: &Address, name: &str, f: F)
    where
        F: Fn(&[Value], &UpcomingSnapshot) -> Result<Value> + Send + Sync + 'static,
    {
        self.inner()
            .getters
            .insert((aa.clone(), name.to_string()), Arc::new(f));
    }

    /// Override the default effects (base amount credited to the target) of operator requests
    pub fn set_request_effects<F>(&self, f: F)
    where
        F: Fn(&SentRequest) -> ProjectedEffects + Send + Sync + 'static,
    {
        self.inner().request_effects = Some(Arc::new(f));
    }

    /// Projection returned for a unit not submitted through this ledger
    pub fn set_projection(&self, unit: &UnitId, effects: ProjectedEffects) {
        self.inner().projections.insert(unit.clone(), effects);
    }

    /// Requests and payments return no unit
    pub fn set_reject_submissions(&self, reject: bool) {
        self.inner().reject_submissions = reject;
    }

    /// Submissions fail with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.inner().offline = offline;
    }

    /// Payments wait this long before they are recorded
    pub fn set_payment_delay(&self, delay: Duration) {
        self.inner().payment_delay = Some(delay);
    }

    /// Pretend the operator paid this address in the past
    pub fn mark_paid_before(&self, address: &Address) {
        self.inner().prior_payees.insert(address.clone());
    }

    /// The next refresh of this feed reports a change
    pub fn queue_feed_change(&self, oracle: &Address, feed_name: &str) {
        self.inner()
            .feed_changes
            .insert((oracle.clone(), feed_name.to_string()));
    }

    pub fn feed_update_calls(&self) -> usize {
        self.inner().feed_update_calls
    }

    pub fn requests(&self) -> Vec<SentRequest> {
        self.inner().requests.clone()
    }

    pub fn payments(&self) -> Vec<SentPayment> {
        self.inner().payments.clone()
    }

    pub fn defined(&self) -> Vec<Value> {
        self.inner().defined.clone()
    }

    pub fn is_watched(&self, aa: &Address) -> bool {
        self.inner().watched.contains(aa)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    fn operator_address(&self) -> &Address {
        &self.operator
    }

    async fn read_aa_params(&self, aa: &Address) -> Result<Option<Value>> {
        let inner = self.inner();
        Ok(inner.definitions.get(aa).map(|row| {
            row.params()
                .cloned()
                .map(Value::Object)
                .unwrap_or_else(|| Value::Object(Default::default()))
        }))
    }

    async fn read_aa_definition(&self, aa: &Address) -> Result<Option<AaDefinitionRow>> {
        Ok(self.inner().definitions.get(aa).cloned())
    }

    async fn define_aa(&self, definition: &Value) -> Result<Option<UnitId>> {
        let mut inner = self.inner();
        inner.check_online()?;
        if inner.reject_submissions {
            return Ok(None);
        }
        let address = derive_address(definition);
        inner
            .definitions
            .entry(address.clone())
            .or_insert_with(|| AaDefinitionRow {
                address,
                definition: definition.clone(),
                base_aa: definition_base_aa(definition),
            });
        inner.defined.push(definition.clone());
        Ok(Some(inner.next_unit()))
    }

    async fn aas_by_base_aas(&self, base_aas: &[Address]) -> Result<Vec<AaDefinitionRow>> {
        Ok(self
            .inner()
            .definitions
            .values()
            .filter(|row| row.base_aa.as_ref().is_some_and(|b| base_aas.contains(b)))
            .cloned()
            .collect())
    }

    async fn execute_getter(&self, aa: &Address, getter: &str, args: &[Value]) -> Result<Value> {
        let (f, view) = {
            let inner = self.inner();
            (
                inner.getters.get(&(aa.clone(), getter.to_string())).cloned(),
                inner.confirmed_view(),
            )
        };
        let f = f.ok_or_else(|| missing_getter(aa, getter))?;
        f(args, &view)
    }

    async fn execute_getter_in_state(
        &self,
        aa: &Address,
        getter: &str,
        args: &[Value],
        view: &UpcomingSnapshot,
    ) -> Result<Value> {
        let f = self
            .inner()
            .getters
            .get(&(aa.clone(), getter.to_string()))
            .cloned()
            .ok_or_else(|| missing_getter(aa, getter))?;
        f(args, view)
    }

    async fn read_aa_state_vars(&self, aa: &Address) -> Result<StateVars> {
        Ok(self.inner().state_vars.get(aa).cloned().unwrap_or_default())
    }

    async fn read_aa_balances(&self, aa: &Address) -> Result<Balances> {
        Ok(self.inner().aa_balances.get(aa).cloned().unwrap_or_default())
    }

    async fn read_balance(&self, address: &Address) -> Result<Amount> {
        Ok(self.inner().balances.get(address).copied().unwrap_or(0))
    }

    async fn send_aa_request(
        &self,
        aa: &Address,
        amount: Amount,
        data: &Value,
    ) -> Result<Option<UnitId>> {
        let mut inner = self.inner();
        inner.check_online()?;
        if inner.reject_submissions {
            return Ok(None);
        }
        let request = SentRequest {
            unit: inner.next_unit(),
            aa: aa.clone(),
            amount,
            data: data.clone(),
        };
        let effects = match &inner.request_effects {
            Some(f) => f(&request),
            None => ProjectedEffects::default().with_balance_delta(aa, BASE_ASSET, amount),
        };
        inner.projections.insert(request.unit.clone(), effects);
        let unit = request.unit.clone();
        inner.requests.push(request);
        Ok(Some(unit))
    }

    async fn project_request(&self, unit: &UnitId) -> Result<ProjectedEffects> {
        Ok(self
            .inner()
            .projections
            .get(unit)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_payment(&self, to: &Address, amount: Amount) -> Result<Option<UnitId>> {
        let delay = self.inner().payment_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner();
        inner.check_online()?;
        if inner.reject_submissions {
            return Ok(None);
        }
        let unit = inner.next_unit();
        *inner.balances.entry(to.clone()).or_insert(0) += amount;
        inner.payments.push(SentPayment {
            unit: unit.clone(),
            to: to.clone(),
            amount,
        });
        Ok(Some(unit))
    }

    async fn has_received_from_operator(&self, address: &Address) -> Result<bool> {
        let inner = self.inner();
        Ok(inner.prior_payees.contains(address) || inner.payments.iter().any(|p| &p.to == address))
    }

    async fn update_data_feed(
        &self,
        oracle: &Address,
        feed_name: &str,
        _force: bool,
    ) -> Result<bool> {
        let mut inner = self.inner();
        inner.feed_update_calls += 1;
        Ok(inner
            .feed_changes
            .remove(&(oracle.clone(), feed_name.to_string())))
    }

    async fn watch_aa(&self, aa: &Address) -> Result<()> {
        self.inner().watched.insert(aa.clone());
        Ok(())
    }
}

fn missing_getter(aa: &Address, getter: &str) -> LedgerError {
    LedgerError::GetterFailed {
        address: aa.to_string(),
        getter: getter.to_string(),
        message: "no such getter".into(),
    }
}
