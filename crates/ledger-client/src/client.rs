//! HTTP client for the ledger gateway

use std::time::Duration;

use async_trait::async_trait;
use curvebuy_core::{Address, Amount, LedgerError, NodeConfig, UnitId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{EventSender, LedgerEvent};
use crate::state::{Balances, ProjectedEffects, StateVars, UpcomingSnapshot};
use crate::{AaDefinitionRow, Ledger, Result};

/// Timeout for gateway calls (30 seconds)
const NODE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UnitResponse {
    unit: Option<UnitId>,
}

#[derive(Debug, Deserialize)]
struct GetterResponse {
    result: Value,
}

#[derive(Debug, Deserialize)]
struct OperatorResponse {
    address: Address,
}

#[derive(Debug, Deserialize)]
struct UpdatedResponse {
    updated: bool,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    #[serde(default)]
    total: Amount,
}

#[derive(Debug, Deserialize)]
struct EventPage {
    #[serde(default)]
    events: Vec<LedgerEvent>,
    cursor: u64,
}

#[derive(Serialize)]
struct GetterRequest<'a> {
    getter: &'a str,
    args: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a UpcomingSnapshot>,
}

/// Ledger gateway client
#[derive(Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    config: NodeConfig,
    operator: Address,
}

impl NodeClient {
    /// Connect to the gateway and learn the operator address
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("curvebuy")
            .build()
            .map_err(|e| LedgerError::Unreachable {
                url: format!("{}: {}", config.url, e),
            })?;
        let mut client = Self {
            http,
            config,
            operator: Address::new(""),
        };
        let op: OperatorResponse =
            client
                .get_json("/operator")
                .await?
                .ok_or_else(|| LedgerError::Unreachable {
                    url: client.config.url.clone(),
                })?;
        client.operator = op.address;
        Ok(client)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            req
        } else {
            req.header("api_key", &self.config.api_key)
        }
    }

    /// GET a JSON document; `None` on 404
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let req = self.authorize(self.http.get(self.url(path)));
        let response = timed_request(req.send()).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_response(response).await.map(Some)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let req = self.authorize(self.http.post(self.url(path)).json(body));
        let response = timed_request(req.send()).await?;
        parse_response(response).await
    }

    async fn get_required<T: DeserializeOwned>(&self, path: &str, address: &Address) -> Result<T> {
        self.get_json(path)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                address: address.to_string(),
            })
    }

    /// Fetch events after `cursor`; returns the events and the next cursor
    pub async fn fetch_events(&self, cursor: u64) -> Result<(Vec<LedgerEvent>, u64)> {
        let page: EventPage = self
            .get_json(&format!("/events?after={}", cursor))
            .await?
            .ok_or_else(|| LedgerError::ApiError {
                message: "event feed not available".into(),
            })?;
        Ok((page.events, page.cursor))
    }

    /// Poll the event feed from `start` and forward events in arrival order.
    /// Each cursor the feed advances to is published on `progress`.
    /// Stops when the receiving side is dropped.
    pub fn spawn_event_poller(
        self,
        tx: EventSender,
        interval: Duration,
        start: u64,
        progress: watch::Sender<u64>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut cursor = start;
            info!(cursor, "polling ledger events");
            loop {
                match self.fetch_events(cursor).await {
                    Ok((events, next)) => {
                        if forward_page(&tx, events, next).is_err() {
                            return;
                        }
                        if next != cursor {
                            cursor = next;
                            progress.send_replace(cursor);
                        }
                    }
                    Err(e) => warn!("Event poll failed: {}", e),
                }
                tokio::time::sleep(interval).await;
            }
        })
    }
}

/// Push one page of events; fails once the receiver is gone
fn forward_page(
    tx: &EventSender,
    events: Vec<LedgerEvent>,
    cursor: u64,
) -> std::result::Result<(), ()> {
    if !events.is_empty() {
        debug!(count = events.len(), cursor, "received ledger events");
    }
    for event in events {
        tx.send(event).map_err(|_| ())?;
    }
    Ok(())
}

#[async_trait]
impl Ledger for NodeClient {
    fn operator_address(&self) -> &Address {
        &self.operator
    }

    async fn read_aa_params(&self, aa: &Address) -> Result<Option<Value>> {
        self.get_json(&format!("/aa/{}/params", aa)).await
    }

    async fn read_aa_definition(&self, aa: &Address) -> Result<Option<AaDefinitionRow>> {
        self.get_json(&format!("/aa/{}/definition", aa)).await
    }

    async fn define_aa(&self, definition: &Value) -> Result<Option<UnitId>> {
        let res: UnitResponse = self
            .post_json("/aa/define", &json!({ "definition": definition }))
            .await?;
        Ok(res.unit)
    }

    async fn aas_by_base_aas(&self, base_aas: &[Address]) -> Result<Vec<AaDefinitionRow>> {
        self.post_json("/aa/by_base_aas", &json!({ "base_aas": base_aas }))
            .await
    }

    async fn execute_getter(&self, aa: &Address, getter: &str, args: &[Value]) -> Result<Value> {
        let body = GetterRequest {
            getter,
            args,
            state: None,
        };
        let res: GetterResponse = self
            .post_json(&format!("/aa/{}/getter", aa), &body)
            .await
            .map_err(|e| getter_failed(aa, getter, e))?;
        Ok(res.result)
    }

    async fn execute_getter_in_state(
        &self,
        aa: &Address,
        getter: &str,
        args: &[Value],
        view: &UpcomingSnapshot,
    ) -> Result<Value> {
        let body = GetterRequest {
            getter,
            args,
            state: Some(view),
        };
        let res: GetterResponse = self
            .post_json(&format!("/aa/{}/getter", aa), &body)
            .await
            .map_err(|e| getter_failed(aa, getter, e))?;
        Ok(res.result)
    }

    async fn read_aa_state_vars(&self, aa: &Address) -> Result<StateVars> {
        Ok(self
            .get_json(&format!("/aa/{}/state_vars", aa))
            .await?
            .unwrap_or_default())
    }

    async fn read_aa_balances(&self, aa: &Address) -> Result<Balances> {
        Ok(self
            .get_json(&format!("/aa/{}/balances", aa))
            .await?
            .unwrap_or_default())
    }

    async fn read_balance(&self, address: &Address) -> Result<Amount> {
        let balances: std::collections::BTreeMap<String, BalanceEntry> = self
            .get_required(&format!("/balances/{}", address), address)
            .await?;
        Ok(balances.get("base").map(|b| b.total).unwrap_or(0))
    }

    async fn send_aa_request(
        &self,
        aa: &Address,
        amount: Amount,
        data: &Value,
    ) -> Result<Option<UnitId>> {
        let res: UnitResponse = self
            .post_json(
                &format!("/aa/{}/request", aa),
                &json!({ "amount": amount, "data": data }),
            )
            .await?;
        Ok(res.unit)
    }

    async fn project_request(&self, unit: &UnitId) -> Result<ProjectedEffects> {
        Ok(self
            .get_json(&format!("/units/{}/projection", unit))
            .await?
            .unwrap_or_default())
    }

    async fn send_payment(&self, to: &Address, amount: Amount) -> Result<Option<UnitId>> {
        let res: UnitResponse = self
            .post_json(
                "/payment",
                &json!({ "to_address": to, "amount": amount }),
            )
            .await?;
        Ok(res.unit)
    }

    async fn has_received_from_operator(&self, address: &Address) -> Result<bool> {
        let res: CountResponse = self
            .get_required(&format!("/payments/operator/{}", address), address)
            .await?;
        Ok(res.count > 0)
    }

    async fn update_data_feed(
        &self,
        oracle: &Address,
        feed_name: &str,
        force: bool,
    ) -> Result<bool> {
        let res: UpdatedResponse = self
            .post_json(
                "/data_feeds/update",
                &json!({ "oracle": oracle, "feed_name": feed_name, "force": force }),
            )
            .await?;
        Ok(res.updated)
    }

    async fn watch_aa(&self, aa: &Address) -> Result<()> {
        let _: Value = self.post_json("/watch", &json!({ "address": aa })).await?;
        Ok(())
    }
}

fn getter_failed(aa: &Address, getter: &str, e: LedgerError) -> LedgerError {
    LedgerError::GetterFailed {
        address: aa.to_string(),
        getter: getter.to_string(),
        message: e.to_string(),
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LedgerError::ApiError {
            message: format!("HTTP {}: {}", status, body),
        });
    }
    timed_request(response.json::<T>())
        .await
        .map_err(|e| LedgerError::ParseError(e.to_string()))
}

/// Wrap a gateway future with the request timeout
async fn timed_request<T, E: std::fmt::Display>(
    fut: impl std::future::Future<Output = std::result::Result<T, E>>,
) -> Result<T> {
    tokio::time::timeout(NODE_REQUEST_TIMEOUT, fut)
        .await
        .map_err(|_| LedgerError::ApiError {
            message: format!(
                "Gateway request timed out after {}s",
                NODE_REQUEST_TIMEOUT.as_secs()
            ),
        })?
        .map_err(|e| LedgerError::ApiError {
            message: e.to_string(),
        })
}
