//! Per-curve tracking
//!
//! One `CurveTracker` per curve contract. It keeps the curve's parameters
//! and oracle list, refreshes oracle feeds on a timer, and sizes purchases
//! against the pending state of the curve.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use curvebuy_core::{Address, Amount};
use ledger_client::{EventSender, Ledger, LedgerEvent, UpcomingSnapshot, UpcomingStateCache};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::calculator;
use crate::constants::{GET_EXCHANGE_RESULT_GETTER, GET_ORACLES_GETTER};
use crate::solver::{self, PricingOracle};
use crate::state::{CurveParams, CurveReserves, ExchangeResult, OracleFeed, Quote, SolverError};

pub struct CurveTracker {
    address: Address,
    params: CurveParams,
    oracles: Vec<OracleFeed>,
    state: UpcomingStateCache,
    events: Option<EventSender>,
    light: bool,
}

impl CurveTracker {
    /// Load a curve, refresh its feeds once, and follow its state
    pub async fn create(
        address: Address,
        state: UpcomingStateCache,
        events: Option<EventSender>,
        light: bool,
    ) -> Result<Self, SolverError> {
        let ledger = state.ledger().clone();
        let raw_params = ledger
            .read_aa_params(&address)
            .await?
            .ok_or_else(|| SolverError::NotACurve(address.clone()))?;
        let params = CurveParams::from_value(&raw_params)?;
        let oracles = parse_oracles(
            &ledger
                .execute_getter(&address, GET_ORACLES_GETTER, &[])
                .await?,
        )?;

        if light {
            for feed in &oracles {
                ledger
                    .update_data_feed(&feed.oracle, &feed.feed_name, false)
                    .await?;
            }
        }
        state.follow(&address).await?;

        debug!(curve = %address, oracles = oracles.len(), "curve loaded");
        Ok(Self {
            address,
            params,
            oracles,
            state,
            events,
            light,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn params(&self) -> &CurveParams {
        &self.params
    }

    pub fn oracles(&self) -> &[OracleFeed] {
        &self.oracles
    }

    /// Refresh every oracle feed of the curve. Announces a change unless
    /// `quiet`. Does nothing unless running light.
    pub async fn update_data_feeds(&self, force: bool, quiet: bool) -> Result<bool, SolverError> {
        if !self.light {
            return Ok(false);
        }
        let ledger = self.state.ledger();
        let mut updated = false;
        for feed in &self.oracles {
            if ledger
                .update_data_feed(&feed.oracle, &feed.feed_name, force)
                .await?
            {
                updated = true;
            }
        }
        if updated && !quiet {
            debug!(curve = %self.address, "data feeds updated");
            if let Some(tx) = &self.events {
                let _ = tx.send(LedgerEvent::DataFeedsUpdated);
            }
        }
        Ok(updated)
    }

    /// Periodic feed refresh for the life of the process
    pub fn spawn_refresh(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = self.update_data_feeds(false, false).await {
                    warn!(curve = %self.address, "Data feed refresh failed: {}", e);
                }
            }
        })
    }

    /// Largest tokens2 purchase for `balance` reserve with fee at most
    /// `max_fee_percent`. Holds the pending-state lock for the whole search.
    pub async fn get_optimal_amount(
        &self,
        balance: Amount,
        max_fee_percent: f64,
    ) -> Result<Amount, SolverError> {
        if balance <= 0 {
            return Ok(0);
        }
        let guard = self.state.lock().await;
        let reserves = CurveReserves::from_vars(&guard.upcoming_state_vars(&self.address));
        let top = calculator::zero_fee_tokens2(&self.params, &reserves, balance);

        self.update_data_feeds(false, true).await?;

        let pricing = PendingStatePricing {
            ledger: self.state.ledger().as_ref(),
            curve: &self.address,
            view: guard.view(),
        };
        let amount = solver::solve(top, balance, max_fee_percent, &pricing).await?;
        drop(guard);

        info!(curve = %self.address, balance, top, amount, "found optimal amount");
        Ok(amount)
    }
}

/// Prices candidates with the curve's getter against a fixed pending view
struct PendingStatePricing<'a> {
    ledger: &'a dyn Ledger,
    curve: &'a Address,
    view: UpcomingSnapshot,
}

#[async_trait]
impl PricingOracle for PendingStatePricing<'_> {
    async fn quote(&self, tokens2: Amount) -> Result<Quote, SolverError> {
        let raw = self
            .ledger
            .execute_getter_in_state(
                self.curve,
                GET_EXCHANGE_RESULT_GETTER,
                &[json!(0), json!(tokens2)],
                &self.view,
            )
            .await?;
        let result: ExchangeResult = serde_json::from_value(raw)
            .map_err(|e| SolverError::BadGetterResult(e.to_string()))?;
        Ok(result.quote())
    }
}

fn parse_oracles(raw: &Value) -> Result<Vec<OracleFeed>, SolverError> {
    serde_json::from_value(raw.clone()).map_err(|e| SolverError::BadGetterResult(e.to_string()))
}
