//! Buffer lifecycle
//!
//! Reacts to ledger events on buffers, curves and arbitrage contracts,
//! decides when a buffer should buy and how much, and submits purchases.

use std::sync::Arc;

use async_trait::async_trait;
use curve::CurveRegistry;
use curvebuy_core::constants::{BASE_ASSET, EXECUTE_TRIGGER_AMOUNT, PURCHASE_FEE_RESERVE};
use curvebuy_core::{unix_now, Address, Amount, AppConfig, UnitId};
use curvebuy_db::{BufferRow, Database};
use ledger_client::{
    definition_params, AaRequest, AaResponse, EventHandler, Ledger, LedgerEvent,
    UpcomingStateCache,
};
use orders::OrderReconciler;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::definition::{buffer_definition, max_fee_percent};
use crate::state::{BufferError, BufferInfo};

#[derive(Debug, Clone, PartialEq)]
pub struct BufferSettings {
    pub buffer_base_aa: Address,
    /// Paid once to owners holding no base currency when their first purchase completes
    pub welcome_amount: Amount,
    /// Balance below which a deposit does not trigger a purchase
    pub min_buffer_balance: Amount,
    /// Age after which a buffer with a dust balance is given up on
    pub stale_buffer_secs: i64,
}

impl BufferSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            buffer_base_aa: Address::new(config.buffer_base_aa.clone()),
            welcome_amount: config.welcome_amount,
            min_buffer_balance: config.min_buffer_balance,
            stale_buffer_secs: config.stale_buffer_secs(),
        }
    }
}

pub struct BufferOrchestrator {
    db: Database,
    state: UpcomingStateCache,
    curves: CurveRegistry,
    orders: Arc<OrderReconciler>,
    settings: BufferSettings,
    recheck: Mutex<()>,
}

impl BufferOrchestrator {
    pub fn new(
        db: Database,
        state: UpcomingStateCache,
        curves: CurveRegistry,
        orders: Arc<OrderReconciler>,
        settings: BufferSettings,
    ) -> Self {
        Self {
            db,
            state,
            curves,
            orders,
            settings,
            recheck: Mutex::new(()),
        }
    }

    fn ledger(&self) -> &Arc<dyn Ledger> {
        self.state.ledger()
    }

    pub fn curves(&self) -> &CurveRegistry {
        &self.curves
    }

    pub async fn get_buffer(&self, buffer: &Address) -> Result<Option<BufferRow>, BufferError> {
        Ok(self.db.get_buffer(buffer).await?)
    }

    /// The buffer of `owner` on `curve`, defined on the ledger if it does
    /// not exist yet. Asking again puts an idle buffer back in work.
    pub async fn get_or_create_buffer(
        &self,
        owner: &Address,
        curve: &Address,
    ) -> Result<BufferInfo, BufferError> {
        let now = unix_now();
        if let Some(row) = self.db.find_buffer(owner, curve).await? {
            let buffer = row.buffer();
            self.db.reactivate_buffer(&buffer, now).await?;
            self.curves.get_or_create(curve).await?;
            self.state.follow(&buffer).await?;
            debug!(buffer = %buffer, owner = %owner, "existing buffer");
            return Ok(BufferInfo {
                buffer_address: buffer,
                definition: row.definition_json(),
            });
        }

        let definition = buffer_definition(&self.settings.buffer_base_aa, owner, curve);
        let buffer = ledger_client::derive_address(&definition);
        if self.ledger().read_aa_definition(&buffer).await?.is_none() {
            let unit = self
                .ledger()
                .define_aa(&definition)
                .await?
                .ok_or_else(|| BufferError::DefineFailed(buffer.clone()))?;
            info!(buffer = %buffer, owner = %owner, curve = %curve, unit = %unit, "defined new buffer");
        }
        self.db
            .insert_buffer(&buffer, owner, curve, &definition, now)
            .await?;
        self.curves.get_or_create(curve).await?;
        self.state.follow(&buffer).await?;
        Ok(BufferInfo {
            buffer_address: buffer,
            definition,
        })
    }

    /// Retry every buffer in work, optionally only those on one curve.
    /// One sweep at a time. Buffers left with dust past the stale age are
    /// taken out of work.
    pub async fn trigger_pending_buffers(&self, curve: Option<&Address>) -> Result<(), BufferError> {
        let _guard = self.recheck.lock().await;
        let rows = self.db.buffers_in_work(curve).await?;
        info!(
            curve = %curve.map(|c| c.to_string()).unwrap_or_else(|| "all".into()),
            count = rows.len(),
            "looking for non-executed buffers"
        );
        let stale_before = unix_now() - self.settings.stale_buffer_secs;

        for row in rows {
            let buffer = row.buffer();
            let balances = match self.state.balances_or_fetch(&buffer).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(buffer = %buffer, "Failed to read balances: {}", e);
                    continue;
                }
            };
            let balance = balances.get(BASE_ASSET).copied().unwrap_or(0);
            if balance <= self.settings.min_buffer_balance && row.creation_date < stale_before {
                info!(buffer = %buffer, balance, "balance left is too low, will stop checking");
                self.db.set_in_work(&buffer, false).await?;
                continue;
            }
            debug!(buffer = %buffer, balance, "retrying");
            if let Err(e) = self
                .execute_purchase(&buffer, balance, &row.curve(), &row.definition_json())
                .await
            {
                warn!(buffer = %buffer, "Purchase attempt failed: {}", e);
            }
        }
        Ok(())
    }

    /// Spend `balance` (less the fee reserve) on tokens2. Returns the
    /// request unit, or `None` if nothing was sent.
    pub async fn execute_purchase(
        &self,
        buffer: &Address,
        balance: Amount,
        curve: &Address,
        definition: &Value,
    ) -> Result<Option<UnitId>, BufferError> {
        let tracker = self.curves.get_or_create(curve).await?;
        let tokens2 = tracker
            .get_optimal_amount(balance - PURCHASE_FEE_RESERVE, max_fee_percent(definition))
            .await?;
        if tokens2 == 0 {
            info!(buffer = %buffer, balance, "would receive 0 tokens2");
            return Ok(None);
        }

        let data = json!({"execute": 1, "tokens2": tokens2});
        let Some(unit) = self
            .ledger()
            .send_aa_request(buffer, EXECUTE_TRIGGER_AMOUNT, &data)
            .await?
        else {
            warn!(buffer = %buffer, "Failed to send purchase request");
            return Ok(None);
        };
        info!(buffer = %buffer, tokens2, unit = %unit, "purchase requested");
        // the next attempt must see this purchase as pending
        self.state.apply_request(&unit).await?;
        Ok(Some(unit))
    }

    pub async fn on_request(&self, request: &AaRequest) -> Result<(), BufferError> {
        if &request.trigger_address == self.ledger().operator_address() {
            debug!(unit = %request.unit, "skipping our own request");
            return Ok(());
        }
        let aa = &request.aa_address;
        let Some(buffer) = self.db.get_buffer(aa).await? else {
            let curve = if self.curves.is_tracked(aa).await {
                debug!(curve = %aa, "request to curve");
                aa.clone()
            } else if let Some(curve) = self.curves.curve_of_arb(aa).await {
                debug!(arb = %aa, curve = %curve, "request to arb");
                curve
            } else {
                debug!(aa = %aa, "request to unrecognized AA");
                return Ok(());
            };
            return self.trigger_pending_buffers(Some(&curve)).await;
        };

        let amount = match request.base_amount {
            None => {
                debug!(buffer = %aa, "no base payment to buffer");
                return Ok(());
            }
            Some(EXECUTE_TRIGGER_AMOUNT) => {
                debug!(buffer = %aa, "skipping execute request");
                return Ok(());
            }
            Some(amount) => amount,
        };

        // a refill
        info!(buffer = %aa, amount, "buffer refilled");
        if let Err(e) = self.orders.finish_orders(Some(aa)).await {
            warn!(buffer = %aa, "Failed to finish orders: {}", e);
        }
        let balances = self.state.upcoming_balances(aa).await.ok_or_else(|| {
            let msg = format!("no upcoming balances on buffer {}", aa);
            error!("{}", msg);
            BufferError::Invariant(msg)
        })?;
        let balance = balances.get(BASE_ASSET).copied().unwrap_or(0);
        if balance < self.settings.min_buffer_balance {
            info!(buffer = %aa, balance, "balance is too low");
            return Ok(());
        }
        if !buffer.in_work {
            self.db.set_in_work(aa, true).await?;
        }
        self.execute_purchase(aa, balance, &buffer.curve(), &buffer.definition_json())
            .await?;
        Ok(())
    }

    pub async fn on_response(&self, response: &AaResponse) -> Result<(), BufferError> {
        let aa = &response.aa_address;
        let Some(buffer) = self.db.get_buffer(aa).await? else {
            if self.curves.is_tracked(aa).await {
                debug!(curve = %aa, "response from curve");
                return self.trigger_pending_buffers(Some(aa)).await;
            }
            debug!(aa = %aa, "response from AA that is neither buffer nor tracked curve");
            return Ok(());
        };

        if response.bounced {
            info!(
                buffer = %aa,
                error = response.response.error.as_deref().unwrap_or(""),
                "buffer bounced"
            );
            return Ok(());
        }
        if response.response.response_vars.is_none() {
            if !buffer.in_work && &response.trigger_address != self.ledger().operator_address() {
                self.db.set_in_work(aa, true).await?;
            }
            debug!(buffer = %aa, "no response vars");
            return Ok(());
        }
        if response.message() == Some("Done") {
            info!(buffer = %aa, "buffer is done");
            self.db.set_in_work(aa, false).await?;
            self.pay_welcome(&buffer.owner()).await?;
        }
        Ok(())
    }

    /// Make sure a new user has some base currency for fees
    async fn pay_welcome(&self, owner: &Address) -> Result<(), BufferError> {
        if self.ledger().read_balance(owner).await? > 0 {
            debug!(owner = %owner, "owner already has base currency");
            return Ok(());
        }
        if self.ledger().has_received_from_operator(owner).await? {
            debug!(owner = %owner, "already paid welcome amount");
            return Ok(());
        }
        match self
            .ledger()
            .send_payment(owner, self.settings.welcome_amount)
            .await?
        {
            Some(unit) => info!(owner = %owner, unit = %unit, "paid welcome amount"),
            None => warn!(owner = %owner, "Failed to pay welcome amount"),
        }
        Ok(())
    }

    /// Startup: follow every buffer and register the curves of those in
    /// work, then map arbitrage contracts to their curves.
    pub async fn start_watching(&self, arb_base_aa: Option<&Address>) -> Result<(), BufferError> {
        for row in self.db.buffers_in_work(None).await? {
            self.curves.get_or_create(&row.curve()).await?;
            self.state.follow(&row.buffer()).await?;
        }
        for row in self.db.idle_buffers().await? {
            self.state.follow(&row.buffer()).await?;
        }

        let Some(arb_base_aa) = arb_base_aa else {
            return Ok(());
        };
        for row in self
            .ledger()
            .aas_by_base_aas(std::slice::from_ref(arb_base_aa))
            .await?
        {
            let Some(curve) = definition_params(&row.definition)
                .and_then(|p| p.get("curve_aa"))
                .and_then(Value::as_str)
                .map(Address::from)
            else {
                warn!(arb = %row.address, "Arb without curve_aa");
                continue;
            };
            if let Err(e) = self.curves.get_or_create(&curve).await {
                warn!(arb = %row.address, curve = %curve, "Failed to track arb curve: {}", e);
                continue;
            }
            self.curves.add_arb(row.address.clone(), curve).await;
            self.state.follow(&row.address).await?;
            info!(arb = %row.address, "watching arb");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for BufferOrchestrator {
    fn name(&self) -> &'static str {
        "buffers"
    }

    async fn on_event(&self, event: &LedgerEvent) -> curvebuy_core::Result<()> {
        match event {
            LedgerEvent::Request(req) => self.on_request(req).await?,
            LedgerEvent::Response(resp) => self.on_response(resp).await?,
            LedgerEvent::DataFeedsUpdated => self.trigger_pending_buffers(None).await?,
            LedgerEvent::DefinitionApplied(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvebuy_core::Error;
    use ledger_client::{InMemoryLedger, ProjectedEffects, ResponseBody};
    use orders::{CompensationPolicy, FixedRates, Providers};

    const DAY: i64 = 86_400;

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        db: Database,
        state: UpcomingStateCache,
        orch: BufferOrchestrator,
        curve: Address,
        owner: Address,
    }

    /// Curve pricing tokens2 at 2 base units plus a fee of t / 1e6 percent
    fn setup_curve(ledger: &InMemoryLedger) -> Address {
        let curve = ledger.add_aa(json!(["autonomous agent", {
            "base_aa": "CURVEBASE",
            "params": {"m": 2, "n": 0.5, "decimals1": 9, "decimals2": 9}
        }]));
        ledger.set_state_var(&curve, "reserve", json!(4e9));
        ledger.set_state_var(&curve, "supply1", json!(2e9));
        ledger.set_state_var(&curve, "supply2", json!(1e9));
        ledger.set_getter(&curve, "get_oracles", |_, _| Ok(json!([])));
        ledger.set_getter(&curve, "get_exchange_result", |args, _| {
            let tokens2 = args[1].as_f64().unwrap_or(0.0);
            let delta = tokens2 * 2.0;
            let fee = delta * tokens2 / 1e8;
            Ok(json!({"reserve_needed": delta + fee, "reserve_delta": delta, "fee": fee}))
        });
        curve
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new("OP"));
        let curve = setup_curve(&ledger);
        let db = Database::open_in_memory().await.unwrap();
        let state = UpcomingStateCache::new(ledger.clone());
        let curves = CurveRegistry::new(state.clone(), None, true, None);
        let orders = Arc::new(OrderReconciler::new(
            db.clone(),
            ledger.clone(),
            Providers::new(),
            Arc::new(FixedRates::new()),
            CompensationPolicy {
                target_fee: 1.0,
                max_compensation: 5.0,
                daily_quota: 10.0,
            },
        ));
        let orch = BufferOrchestrator::new(
            db.clone(),
            state.clone(),
            curves,
            orders,
            BufferSettings {
                buffer_base_aa: Address::from("BUFBASE"),
                welcome_amount: 100_000,
                min_buffer_balance: 100_000,
                stale_buffer_secs: DAY,
            },
        );
        Fixture {
            ledger,
            db,
            state,
            orch,
            curve,
            owner: Address::from("OWNER"),
        }
    }

    /// Deliver an event the way the dispatcher does: pending state first
    async fn deliver(f: &Fixture, event: LedgerEvent) -> curvebuy_core::Result<()> {
        f.state.on_event(&event).await?;
        f.orch.on_event(&event).await
    }

    fn deposit(f: &Fixture, buffer: &Address, unit: &str, amount: Amount) -> LedgerEvent {
        let unit = UnitId::new(unit);
        f.ledger.set_projection(
            &unit,
            ProjectedEffects::default().with_balance_delta(buffer, BASE_ASSET, amount),
        );
        LedgerEvent::Request(AaRequest {
            unit,
            aa_address: buffer.clone(),
            trigger_address: f.owner.clone(),
            base_amount: Some(amount),
        })
    }

    fn response(buffer: &Address, trigger: &str, vars: Option<Value>) -> LedgerEvent {
        LedgerEvent::Response(AaResponse {
            trigger_unit: UnitId::new("T"),
            aa_address: buffer.clone(),
            trigger_address: Address::from(trigger),
            bounced: false,
            response: ResponseBody {
                error: None,
                response_vars: vars.and_then(|v| v.as_object().cloned()),
            },
        })
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let f = fixture().await;
        let a = f.orch.get_or_create_buffer(&f.owner, &f.curve).await.unwrap();
        assert_eq!(
            a.buffer_address,
            crate::buffer_address(&Address::from("BUFBASE"), &f.owner, &f.curve)
        );
        assert!(f.orch.curves().is_tracked(&f.curve).await);
        assert!(f.state.is_followed(&a.buffer_address).await);

        f.db.set_in_work(&a.buffer_address, false).await.unwrap();
        let b = f.orch.get_or_create_buffer(&f.owner, &f.curve).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(f.ledger.defined().len(), 1);
        assert!(f.db.get_buffer(&b.buffer_address).await.unwrap().unwrap().in_work);
    }

    #[tokio::test]
    async fn test_define_rejected() {
        let f = fixture().await;
        f.ledger.set_reject_submissions(true);
        let res = f.orch.get_or_create_buffer(&f.owner, &f.curve).await;
        assert!(matches!(res, Err(BufferError::DefineFailed(_))));
        assert!(f.db.find_buffer(&f.owner, &f.curve).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deposit_triggers_purchase() {
        let f = fixture().await;
        let buffer = f.orch.get_or_create_buffer(&f.owner, &f.curve).await.unwrap().buffer_address;

        deliver(&f, deposit(&f, &buffer, "DEP1", 500_000)).await.unwrap();

        let requests = f.ledger.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].aa, buffer);
        assert_eq!(requests[0].amount, EXECUTE_TRIGGER_AMOUNT);
        assert_eq!(requests[0].data["execute"], json!(1));
        let tokens2 = requests[0].data["tokens2"].as_i64().unwrap();
        assert!(tokens2 > 0);
        // fits in the balance less the fee reserve
        let cost = 2.0 * tokens2 as f64 * (1.0 + tokens2 as f64 / 1e8);
        assert!(cost <= (500_000 - PURCHASE_FEE_RESERVE) as f64);
        // applied to pending state right away
        assert!(f.state.lock().await.has_overlay(&requests[0].unit));
    }

    #[tokio::test]
    async fn test_non_refills_ignored() {
        let f = fixture().await;
        let buffer = f.orch.get_or_create_buffer(&f.owner, &f.curve).await.unwrap().buffer_address;

        // too small
        deliver(&f, deposit(&f, &buffer, "SMALL", 50_000)).await.unwrap();
        // execute trigger
        deliver(&f, deposit(&f, &buffer, "EXEC", EXECUTE_TRIGGER_AMOUNT)).await.unwrap();
        // our own request
        let mut own = deposit(&f, &buffer, "OWN", 500_000);
        if let LedgerEvent::Request(req) = &mut own {
            req.trigger_address = Address::from("OP");
        }
        deliver(&f, own).await.unwrap();
        // unrelated contract
        deliver(&f, deposit(&f, &Address::from("ELSEWHERE"), "X", 500_000)).await.unwrap();

        assert!(f.ledger.requests().is_empty());
    }

    #[tokio::test]
    async fn test_deposit_to_unfollowed_buffer_is_fatal() {
        let f = fixture().await;
        let buffer = crate::buffer_address(&Address::from("BUFBASE"), &f.owner, &f.curve);
        f.db.insert_buffer(&buffer, &f.owner, &f.curve, &json!([]), unix_now())
            .await
            .unwrap();

        let err = deliver(&f, deposit(&f, &buffer, "DEP1", 500_000)).await.unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[tokio::test]
    async fn test_done_pays_welcome_once() {
        let f = fixture().await;
        let buffer = f.orch.get_or_create_buffer(&f.owner, &f.curve).await.unwrap().buffer_address;

        deliver(&f, response(&buffer, "OP", Some(json!({"message": "Done"})))).await.unwrap();
        assert!(!f.db.get_buffer(&buffer).await.unwrap().unwrap().in_work);
        let payments = f.ledger.payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].to, f.owner);
        assert_eq!(payments[0].amount, 100_000);

        // the owner now has a balance and was paid before
        deliver(&f, response(&buffer, "OP", Some(json!({"message": "Done"})))).await.unwrap();
        assert_eq!(f.ledger.payments().len(), 1);
    }

    #[tokio::test]
    async fn test_no_welcome_for_funded_or_known_owner() {
        let f = fixture().await;
        let buffer = f.orch.get_or_create_buffer(&f.owner, &f.curve).await.unwrap().buffer_address;
        f.ledger.set_balance(&f.owner, 5);
        deliver(&f, response(&buffer, "OP", Some(json!({"message": "Done"})))).await.unwrap();

        f.ledger.set_balance(&f.owner, 0);
        f.ledger.mark_paid_before(&f.owner);
        deliver(&f, response(&buffer, "OP", Some(json!({"message": "Done"})))).await.unwrap();
        assert!(f.ledger.payments().is_empty());
    }

    #[tokio::test]
    async fn test_unexplained_response_reactivates() {
        let f = fixture().await;
        let buffer = f.orch.get_or_create_buffer(&f.owner, &f.curve).await.unwrap().buffer_address;
        f.db.set_in_work(&buffer, false).await.unwrap();

        // self-triggered: stays idle
        deliver(&f, response(&buffer, "OP", None)).await.unwrap();
        assert!(!f.db.get_buffer(&buffer).await.unwrap().unwrap().in_work);

        deliver(&f, response(&buffer, "SOMEONE", None)).await.unwrap();
        assert!(f.db.get_buffer(&buffer).await.unwrap().unwrap().in_work);

        // bounced responses change nothing
        f.db.set_in_work(&buffer, false).await.unwrap();
        let mut bounced = response(&buffer, "SOMEONE", None);
        if let LedgerEvent::Response(resp) = &mut bounced {
            resp.bounced = true;
        }
        deliver(&f, bounced).await.unwrap();
        assert!(!f.db.get_buffer(&buffer).await.unwrap().unwrap().in_work);
    }

    #[tokio::test]
    async fn test_sweep_gives_up_on_stale_dust() {
        let f = fixture().await;
        f.orch.curves().get_or_create(&f.curve).await.unwrap();
        let old = Address::from("OLD");
        let young = Address::from("YOUNG");
        f.db.insert_buffer(&old, &Address::from("O1"), &f.curve, &json!([]), unix_now() - 2 * DAY)
            .await
            .unwrap();
        f.db.insert_buffer(&young, &Address::from("O2"), &f.curve, &json!([]), unix_now())
            .await
            .unwrap();
        f.ledger.set_aa_balance(&old, BASE_ASSET, 50_000);
        f.ledger.set_aa_balance(&young, BASE_ASSET, 50_000);

        f.orch.trigger_pending_buffers(None).await.unwrap();

        assert!(!f.db.get_buffer(&old).await.unwrap().unwrap().in_work);
        assert!(f.db.get_buffer(&young).await.unwrap().unwrap().in_work);
        // the young one is still retried
        let requests = f.ledger.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].aa, young);
    }

    #[tokio::test]
    async fn test_curve_and_arb_activity_retries_buffers() {
        let f = fixture().await;
        let buffer = f.orch.get_or_create_buffer(&f.owner, &f.curve).await.unwrap().buffer_address;
        f.ledger.set_aa_balance(&buffer, BASE_ASSET, 300_000);
        // pending state knows nothing about the new balance until refreshed
        f.state.settle_response(&UnitId::new("NONE"), &buffer).await.unwrap();

        let arb = f.ledger.add_aa(json!(["autonomous agent", {
            "base_aa": "ARBBASE",
            "params": {"curve_aa": f.curve}
        }]));
        f.orch
            .start_watching(Some(&Address::from("ARBBASE")))
            .await
            .unwrap();
        assert_eq!(f.orch.curves().curve_of_arb(&arb).await, Some(f.curve.clone()));

        let to_arb = LedgerEvent::Request(AaRequest {
            unit: UnitId::new("ARB1"),
            aa_address: arb,
            trigger_address: Address::from("TRADER"),
            base_amount: Some(1_000_000),
        });
        deliver(&f, to_arb).await.unwrap();
        assert_eq!(f.ledger.requests().len(), 1);

        let to_curve = LedgerEvent::Request(AaRequest {
            unit: UnitId::new("CURVE1"),
            aa_address: f.curve.clone(),
            trigger_address: Address::from("TRADER"),
            base_amount: Some(1_000_000),
        });
        deliver(&f, to_curve).await.unwrap();
        assert_eq!(f.ledger.requests().len(), 2);

        deliver(&f, LedgerEvent::DataFeedsUpdated).await.unwrap();
        assert_eq!(f.ledger.requests().len(), 3);
    }
}
