//! Order reconciliation and compensation payouts

use std::sync::Arc;

use curvebuy_core::{unix_now, Address, AppConfig, ValidationError};
use curvebuy_db::{Database, NewOrder, OrderRow, OrderUpdate};
use ledger_client::Ledger;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::calculator::{self, FeeAndCompensation};
use crate::constants::{AMOUNT_IN_DRIFT, QUOTA_DAY_SECS};
use crate::fetch::Providers;
use crate::rates::RateSource;
use crate::state::{OrderError, Provider, ProviderOrder};

/// Compensation settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompensationPolicy {
    /// Fee (percent) the user should end up paying at most
    pub target_fee: f64,
    /// Cap on compensation, percent of the amount received
    pub max_compensation: f64,
    /// Expected compensation admitted per day, whole coins
    pub daily_quota: f64,
}

impl CompensationPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            target_fee: config.target_fee,
            max_compensation: config.max_compensation,
            daily_quota: config.daily_compensation_quota,
        }
    }
}

/// An exchange order reported by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub provider: String,
    pub provider_id: String,
    pub buffer_address: Address,
    pub amount_in: f64,
    pub currency_in: String,
    pub expected_amount_out: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedCompensation {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation: Option<f64>,
}

pub struct OrderReconciler {
    db: Database,
    ledger: Arc<dyn Ledger>,
    providers: Providers,
    rates: Arc<dyn RateSource>,
    policy: CompensationPolicy,
    pay_lock: Mutex<()>,
}

impl OrderReconciler {
    pub fn new(
        db: Database,
        ledger: Arc<dyn Ledger>,
        providers: Providers,
        rates: Arc<dyn RateSource>,
        policy: CompensationPolicy,
    ) -> Self {
        Self {
            db,
            ledger,
            providers,
            rates,
            policy,
            pay_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &CompensationPolicy {
        &self.policy
    }

    /// Whether today's expected compensation is still under quota.
    /// Days start at midnight UTC.
    pub async fn is_eligible(&self) -> Result<bool, OrderError> {
        let now = unix_now();
        let day_start = now - now.rem_euclid(QUOTA_DAY_SECS);
        let total = self.db.expected_compensation_since(day_start).await?;
        Ok(total < self.policy.daily_quota)
    }

    async fn fee_and_compensation(
        &self,
        amount_in: f64,
        currency_in: &str,
        amount_out: f64,
    ) -> Result<FeeAndCompensation, OrderError> {
        let fair_rate = self.rates.fair_rate(currency_in).await?;
        Ok(calculator::fee_and_compensation(
            fair_rate,
            amount_in,
            amount_out,
            self.policy.target_fee,
            self.policy.max_compensation,
        ))
    }

    /// Compensation a trade would earn if it were made now
    pub async fn expected_compensation(
        &self,
        amount_in: f64,
        currency_in: &str,
        amount_out: f64,
    ) -> Result<ExpectedCompensation, OrderError> {
        if !self.is_eligible().await? {
            return Ok(ExpectedCompensation {
                eligible: false,
                compensation: None,
            });
        }
        let res = self
            .fee_and_compensation(amount_in, &currency_in.to_uppercase(), amount_out)
            .await?;
        Ok(ExpectedCompensation {
            eligible: true,
            compensation: Some(res.compensation),
        })
    }

    /// Record an order after checking it against the provider's record.
    /// Returns false if the order was already recorded.
    pub async fn create_order(&self, request: &OrderRequest) -> Result<bool, OrderError> {
        let provider = Provider::parse(&request.provider)?;
        if request.amount_in <= 0.0 || request.expected_amount_out <= 0.0 {
            return Err(ValidationError::BadParams("amounts must be positive".into()).into());
        }
        if self.db.get_buffer(&request.buffer_address).await?.is_none() {
            return Err(ValidationError::UnknownBuffer {
                address: request.buffer_address.to_string(),
            }
            .into());
        }
        let is_eligible = self.is_eligible().await?;
        let currency_in = request.currency_in.to_uppercase();

        let info = self
            .providers
            .get(provider)?
            .fetch_order(&request.provider_id)
            .await?;
        check_against_provider(provider, request, &currency_in, &info)?;

        // estimate only; the final figures are computed when the order completes
        let estimate = self
            .fee_and_compensation(request.amount_in, &currency_in, request.expected_amount_out)
            .await?;
        let expected_compensation = is_eligible.then_some(estimate.compensation);

        let inserted = self
            .db
            .insert_order(&NewOrder {
                provider: provider.as_str().to_string(),
                provider_id: request.provider_id.clone(),
                buffer_address: request.buffer_address.clone(),
                amount_in: request.amount_in,
                currency_in,
                expected_amount_out: request.expected_amount_out,
                expected_compensation,
                expected_fee: estimate.fee,
                is_eligible,
                creation_date: unix_now(),
            })
            .await?;
        info!(
            provider = %provider,
            provider_id = %request.provider_id,
            buffer = %request.buffer_address,
            is_eligible,
            fee = estimate.fee,
            "order recorded"
        );
        Ok(inserted)
    }

    /// Finalize completed orders, optionally only those of one buffer.
    /// Pays compensations if any order was finished. Returns the number finished.
    pub async fn finish_orders(&self, buffer: Option<&Address>) -> Result<usize, OrderError> {
        let orders = self.db.open_orders(buffer).await?;
        let mut count = 0;
        for order in orders {
            match self.finish_order(&order).await {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => warn!(order_id = order.order_id, "Failed to finish order: {}", e),
            }
        }
        if count > 0 {
            self.pay_compensations().await?;
        }
        Ok(count)
    }

    async fn finish_order(&self, order: &OrderRow) -> Result<bool, OrderError> {
        let provider = Provider::parse(&order.provider)?;
        let info = self
            .providers
            .get(provider)?
            .fetch_order(&order.provider_id)
            .await?;
        if !provider.is_finished(&info.status) {
            debug!(order_id = order.order_id, status = %info.status, "order not finished yet");
            return Ok(false);
        }

        let mut amount_in = order.amount_in;
        if let Some(actual) = info.amount_from {
            if (actual - amount_in).abs() / amount_in > AMOUNT_IN_DRIFT {
                info!(
                    order_id = order.order_id,
                    "amount_in updated from {} to {}", amount_in, actual
                );
                self.db.update_amount_in(order.order_id, actual).await?;
                amount_in = actual;
            }
        }

        let res = self
            .fee_and_compensation(amount_in, &order.currency_in, info.amount_to)
            .await?;
        let compensation = calculator::settle_compensation(order.is_eligible, res.compensation);
        let update = OrderUpdate {
            amount_out: info.amount_to,
            fee: res.fee,
            compensation,
            is_compensated: order.is_eligible && compensation == Some(0.0),
        };
        info!(
            order_id = order.order_id,
            amount_in,
            currency = %order.currency_in,
            fee = res.fee,
            compensation = ?compensation,
            "order finished"
        );
        Ok(self.db.finish_order(order.order_id, &update).await?)
    }

    /// Pay every owed compensation. One run at a time; a failed payment is
    /// retried on the next run. Returns the number paid.
    pub async fn pay_compensations(&self) -> Result<usize, OrderError> {
        let _guard = self.pay_lock.lock().await;
        let owed = self.db.unpaid_compensations().await?;
        let mut paid = 0;
        for order in owed {
            let buffer = Address::new(order.buffer_address.clone());
            let amount = calculator::to_base_units(order.compensation);
            if amount <= 0 {
                warn!(order_id = order.order_id, "Compensation rounds to nothing, skipping");
                continue;
            }
            let unit = match self.ledger.send_payment(&buffer, amount).await {
                Ok(Some(unit)) => unit,
                Ok(None) => {
                    warn!(order_id = order.order_id, buffer = %buffer, amount, "Compensation payment rejected");
                    continue;
                }
                Err(e) => {
                    warn!(order_id = order.order_id, buffer = %buffer, "Compensation payment failed: {}", e);
                    continue;
                }
            };
            info!(
                order_id = order.order_id,
                buffer = %buffer,
                owner = ?order.owner_address,
                compensation = order.compensation,
                unit = %unit,
                "compensation sent"
            );
            if self.db.mark_compensated(order.order_id, &unit, unix_now()).await? {
                paid += 1;
            }
            if order.buffer_in_work == Some(false) {
                self.db.set_in_work(&buffer, true).await?;
            }
        }
        Ok(paid)
    }
}

fn same_amount(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn check_against_provider(
    provider: Provider,
    request: &OrderRequest,
    currency_in: &str,
    info: &ProviderOrder,
) -> Result<(), ValidationError> {
    let mismatch = |field: &'static str, expected: String, actual: String| {
        Err(ValidationError::OrderMismatch {
            field,
            expected,
            actual,
        })
    };
    if request.buffer_address.as_str() != info.address_to {
        return mismatch(
            "dest address",
            request.buffer_address.to_string(),
            info.address_to.clone(),
        );
    }
    if currency_in != info.currency_from.to_uppercase() {
        return mismatch("input currency", currency_in.to_string(), info.currency_from.clone());
    }
    if provider.reports_amount_in()
        && !info
            .amount_from
            .is_some_and(|actual| same_amount(request.amount_in, actual))
    {
        return mismatch(
            "input amount",
            request.amount_in.to_string(),
            info.amount_from.map(|a| a.to_string()).unwrap_or_default(),
        );
    }
    if !same_amount(request.expected_amount_out, info.amount_to) {
        return mismatch(
            "output amount",
            request.expected_amount_out.to_string(),
            info.amount_to.to_string(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FixedRates, InMemoryProvider};
    use ledger_client::InMemoryLedger;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        db: Database,
        ledger: Arc<InMemoryLedger>,
        simpleswap: Arc<InMemoryProvider>,
        oswapcc: Arc<InMemoryProvider>,
        reconciler: OrderReconciler,
    }

    async fn fixture(daily_quota: f64) -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_buffer(
            &Address::from("BUF"),
            &Address::from("OWNER"),
            &Address::from("CURVE"),
            &json!({}),
            unix_now(),
        )
        .await
        .unwrap();
        let ledger = Arc::new(InMemoryLedger::new("OP"));
        let simpleswap = Arc::new(InMemoryProvider::new(Provider::SimpleSwap));
        let oswapcc = Arc::new(InMemoryProvider::new(Provider::OswapCc));
        let reconciler = OrderReconciler::new(
            db.clone(),
            ledger.clone(),
            Providers::new()
                .with(simpleswap.clone())
                .with(oswapcc.clone()),
            Arc::new(FixedRates::new().with("USD", 20.0)),
            CompensationPolicy {
                target_fee: 1.0,
                max_compensation: 10.0,
                daily_quota,
            },
        );
        Fixture {
            db,
            ledger,
            simpleswap,
            oswapcc,
            reconciler,
        }
    }

    fn request(id: &str) -> OrderRequest {
        OrderRequest {
            provider: "simpleswap".into(),
            provider_id: id.into(),
            buffer_address: Address::from("BUF"),
            amount_in: 100.0,
            currency_in: "usd".into(),
            expected_amount_out: 1940.0,
        }
    }

    fn simpleswap_record(status: &str, amount_from: &str, amount_to: &str) -> serde_json::Value {
        json!({
            "status": status,
            "address_to": "BUF",
            "currency_from": "usd",
            "amount_from": amount_from,
            "amount_to": amount_to
        })
    }

    #[tokio::test]
    async fn test_create_order_records_estimate() {
        let f = fixture(1000.0).await;
        f.simpleswap.set_order("X1", simpleswap_record("waiting", "100", "1940"));

        assert!(f.reconciler.create_order(&request("X1")).await.unwrap());
        let row = f.db.get_order("simpleswap", "X1").await.unwrap().unwrap();
        assert!(row.is_eligible);
        assert_eq!(row.currency_in, "USD");
        assert!((row.expected_compensation.unwrap() - 40.0).abs() < 1e-9);
        assert!((row.expected_fee.unwrap() - 3.0).abs() < 1e-9);

        // registering twice is a no-op
        assert!(!f.reconciler.create_order(&request("X1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_order_rejects_mismatch() {
        let f = fixture(1000.0).await;
        f.simpleswap.set_order("X1", simpleswap_record("waiting", "99", "1940"));
        let err = f.reconciler.create_order(&request("X1")).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::OrderMismatch { field: "input amount", .. })
        ));

        f.simpleswap.set_order("X2", simpleswap_record("waiting", "100", "1900"));
        let err = f.reconciler.create_order(&request("X2")).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::OrderMismatch { field: "output amount", .. })
        ));

        let mut other = request("X3");
        other.buffer_address = Address::from("NOBUF");
        assert!(matches!(
            f.reconciler.create_order(&other).await.unwrap_err(),
            OrderError::Validation(ValidationError::UnknownBuffer { .. })
        ));

        let mut other = request("X4");
        other.provider = "changelly".into();
        assert!(matches!(
            f.reconciler.create_order(&other).await.unwrap_err(),
            OrderError::UnknownProvider(_)
        ));
        assert!(f.db.open_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oswapcc_skips_amount_in_check() {
        let f = fixture(1000.0).await;
        f.oswapcc.set_order(
            "7",
            json!({"status": "new", "out_address": "BUF", "in_coin": "USD", "expected_out_amount": "1940"}),
        );
        let mut req = request("7");
        req.provider = "oswapcc".into();
        assert!(f.reconciler.create_order(&req).await.unwrap());
    }

    #[tokio::test]
    async fn test_quota_exhausted_orders_get_no_compensation() {
        // quota of 40 is used up by the first order
        let f = fixture(40.0).await;
        f.simpleswap.set_order("X1", simpleswap_record("waiting", "100", "1940"));
        f.simpleswap.set_order("X2", simpleswap_record("waiting", "100", "1940"));

        assert!(f.reconciler.is_eligible().await.unwrap());
        f.reconciler.create_order(&request("X1")).await.unwrap();
        assert!(!f.reconciler.is_eligible().await.unwrap());
        assert_eq!(
            f.reconciler
                .expected_compensation(100.0, "usd", 1940.0)
                .await
                .unwrap(),
            ExpectedCompensation {
                eligible: false,
                compensation: None
            }
        );

        f.reconciler.create_order(&request("X2")).await.unwrap();
        let row = f.db.get_order("simpleswap", "X2").await.unwrap().unwrap();
        assert!(!row.is_eligible);
        assert_eq!(row.expected_compensation, None);

        // finished orders admitted over quota stay uncompensated
        f.simpleswap.set_order("X1", simpleswap_record("finished", "100", "1940"));
        f.simpleswap.set_order("X2", simpleswap_record("finished", "100", "1940"));
        assert_eq!(f.reconciler.finish_orders(None).await.unwrap(), 2);
        let row = f.db.get_order("simpleswap", "X2").await.unwrap().unwrap();
        assert!(row.is_done);
        assert_eq!(row.compensation, None);
        assert!(!row.is_compensated);
        assert_eq!(f.ledger.payments().len(), 1);
    }

    #[tokio::test]
    async fn test_finish_and_pay() {
        let f = fixture(1000.0).await;
        f.simpleswap.set_order("X1", simpleswap_record("waiting", "100", "1940"));
        f.reconciler.create_order(&request("X1")).await.unwrap();

        // not finished yet
        assert_eq!(f.reconciler.finish_orders(None).await.unwrap(), 0);

        // input drifted by 1%, output came in lower than quoted
        f.simpleswap.set_order("X1", simpleswap_record("sending", "101", "1900"));
        f.db.set_in_work(&Address::from("BUF"), false).await.unwrap();
        assert_eq!(f.reconciler.finish_orders(Some(&Address::from("BUF"))).await.unwrap(), 1);

        let row = f.db.get_order("simpleswap", "X1").await.unwrap().unwrap();
        assert_eq!(row.amount_in, 101.0);
        assert_eq!(row.amount_out, Some(1900.0));
        // fair 2020, target 1999.8, shortfall 99.8, cap 190
        assert!((row.compensation.unwrap() - 99.8).abs() < 1e-9);
        assert!(row.is_compensated);
        assert!(row.compensation_unit.is_some());

        let payments = f.ledger.payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].to, Address::from("BUF"));
        assert_eq!(payments[0].amount, calculator::to_base_units(row.compensation.unwrap()));
        // idle buffer woken up by the payout
        assert!(f.db.get_buffer(&Address::from("BUF")).await.unwrap().unwrap().in_work);

        // nothing more to pay
        assert_eq!(f.reconciler.pay_compensations().await.unwrap(), 0);
        assert_eq!(f.ledger.payments().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_payouts_pay_once() {
        let f = fixture(1000.0).await;
        f.simpleswap.set_order("X1", simpleswap_record("waiting", "100", "1940"));
        f.reconciler.create_order(&request("X1")).await.unwrap();

        // finish while the ledger is down so the compensation stays owed
        f.ledger.set_offline(true);
        f.simpleswap.set_order("X1", simpleswap_record("finished", "100", "1900"));
        assert_eq!(f.reconciler.finish_orders(None).await.unwrap(), 1);
        assert!(f.ledger.payments().is_empty());

        f.ledger.set_offline(false);
        f.ledger.set_payment_delay(Duration::from_millis(20));
        let (first, second) = tokio::join!(
            f.reconciler.pay_compensations(),
            f.reconciler.pay_compensations()
        );
        assert_eq!(first.unwrap() + second.unwrap(), 1);
        assert_eq!(f.ledger.payments().len(), 1);
        let row = f.db.get_order("simpleswap", "X1").await.unwrap().unwrap();
        assert!(row.is_compensated);
    }

    #[tokio::test]
    async fn test_zero_compensation_settles_without_payment() {
        let f = fixture(1000.0).await;
        f.simpleswap.set_order("X1", simpleswap_record("waiting", "100", "1990"));
        let mut req = request("X1");
        req.expected_amount_out = 1990.0;
        f.reconciler.create_order(&req).await.unwrap();

        f.simpleswap.set_order("X1", simpleswap_record("finished", "100", "1990"));
        assert_eq!(f.reconciler.finish_orders(None).await.unwrap(), 1);
        let row = f.db.get_order("simpleswap", "X1").await.unwrap().unwrap();
        assert_eq!(row.compensation, Some(0.0));
        assert!(row.is_compensated);
        assert!(f.ledger.payments().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_retried() {
        let f = fixture(1000.0).await;
        for id in ["X1", "X2"] {
            f.simpleswap.set_order(id, simpleswap_record("waiting", "100", "1940"));
            f.reconciler.create_order(&request(id)).await.unwrap();
            f.simpleswap.set_order(id, simpleswap_record("finished", "100", "1940"));
        }
        f.simpleswap.set_failing("X1", true);
        f.ledger.set_reject_submissions(true);

        // X1 fetch fails, X2 finishes but its payment is rejected
        assert_eq!(f.reconciler.finish_orders(None).await.unwrap(), 1);
        let row = f.db.get_order("simpleswap", "X2").await.unwrap().unwrap();
        assert!(row.is_done);
        assert!(!row.is_compensated);
        assert_eq!(row.compensation_unit, None);

        // next cycle
        f.simpleswap.set_failing("X1", false);
        f.ledger.set_reject_submissions(false);
        assert_eq!(f.reconciler.finish_orders(None).await.unwrap(), 1);
        assert_eq!(f.ledger.payments().len(), 2);
        for id in ["X1", "X2"] {
            let row = f.db.get_order("simpleswap", id).await.unwrap().unwrap();
            assert!(row.is_compensated);
        }
    }
}
