//! Ledger event types and the handler seam

use async_trait::async_trait;
use curvebuy_core::{Address, Amount, UnitId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// A request (trigger) applied to a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AaRequest {
    pub unit: UnitId,
    pub aa_address: Address,
    /// First author of the triggering unit
    pub trigger_address: Address,
    /// Base-currency output to `aa_address` in the triggering unit, if any
    #[serde(default)]
    pub base_amount: Option<Amount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub response_vars: Option<Map<String, Value>>,
}

/// A contract's response to a trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AaResponse {
    pub trigger_unit: UnitId,
    pub aa_address: Address,
    pub trigger_address: Address,
    #[serde(default)]
    pub bounced: bool,
    #[serde(default)]
    pub response: ResponseBody,
}

impl AaResponse {
    /// `message` response variable, if the contract set one
    pub fn message(&self) -> Option<&str> {
        self.response
            .response_vars
            .as_ref()?
            .get("message")?
            .as_str()
    }
}

/// A contract defined on the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionApplied {
    pub address: Address,
    pub definition: Value,
    #[serde(default)]
    pub base_aa: Option<Address>,
}

/// Everything the event stream delivers, plus internal notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Request(AaRequest),
    Response(AaResponse),
    DefinitionApplied(DefinitionApplied),
    /// A refresh changed at least one oracle feed value
    DataFeedsUpdated,
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::DefinitionApplied(_) => "definition_applied",
            Self::DataFeedsUpdated => "data_feeds_updated",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<LedgerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<LedgerEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Typed subscriber of the event stream.
///
/// Handlers must tolerate seeing the same underlying ledger event more
/// than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_event(&self, event: &LedgerEvent) -> curvebuy_core::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let raw = json!({
            "type": "request",
            "unit": "U1",
            "aa_address": "BUF",
            "trigger_address": "USER",
            "base_amount": 250000
        });
        let event: LedgerEvent = serde_json::from_value(raw).unwrap();
        match event {
            LedgerEvent::Request(req) => {
                assert_eq!(req.unit.as_str(), "U1");
                assert_eq!(req.base_amount, Some(250_000));
            }
            other => panic!("unexpected {:?}", other),
        }

        let event: LedgerEvent =
            serde_json::from_value(json!({"type": "data_feeds_updated"})).unwrap();
        assert_eq!(event, LedgerEvent::DataFeedsUpdated);
    }

    #[test]
    fn test_response_message() {
        let raw = json!({
            "type": "response",
            "trigger_unit": "U2",
            "aa_address": "BUF",
            "trigger_address": "OP",
            "response": {"response_vars": {"message": "Done"}}
        });
        let LedgerEvent::Response(resp) = serde_json::from_value(raw).unwrap() else {
            panic!("not a response");
        };
        assert!(!resp.bounced);
        assert_eq!(resp.message(), Some("Done"));
    }
}
