//! ledger-client: Narrow interface to the ledger and contract-execution gateway
//!
//! This crate provides the `Ledger` trait consumed by the rest of the
//! workspace, an HTTP implementation (`NodeClient`), an in-process
//! implementation for tests (`InMemoryLedger`, behind the `test-utils`
//! feature), the typed event stream, and the upcoming-state cache
//! (confirmed layer plus speculative overlay).

pub mod address;
pub mod client;
pub mod events;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod state;

use async_trait::async_trait;
use curvebuy_core::{Address, Amount, LedgerError, UnitId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use address::{definition_base_aa, definition_params, derive_address, is_valid_address};
pub use client::NodeClient;
pub use events::{
    event_channel, AaRequest, AaResponse, DefinitionApplied, EventHandler, EventReceiver,
    EventSender, LedgerEvent, ResponseBody,
};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryLedger;
pub use state::{
    Balances, ProjectedEffects, StateVars, UpcomingSnapshot, UpcomingState, UpcomingStateCache,
};

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// A stored contract definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AaDefinitionRow {
    pub address: Address,
    pub definition: Value,
    #[serde(default)]
    pub base_aa: Option<Address>,
}

impl AaDefinitionRow {
    pub fn params(&self) -> Option<&serde_json::Map<String, Value>> {
        definition_params(&self.definition)
    }
}

/// Operations consumed from the ledger collaborator.
///
/// Submissions return `Ok(None)` when the ledger rejected them; callers
/// log and retry on their next cycle.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Address the operator signs with
    fn operator_address(&self) -> &Address;

    /// Contract parameters, `None` if the address is not a contract
    async fn read_aa_params(&self, aa: &Address) -> Result<Option<Value>>;

    async fn read_aa_definition(&self, aa: &Address) -> Result<Option<AaDefinitionRow>>;

    /// Publish a definition. Defining an existing address is a no-op on the ledger.
    async fn define_aa(&self, definition: &Value) -> Result<Option<UnitId>>;

    /// All contracts instantiated from any of the templates
    async fn aas_by_base_aas(&self, base_aas: &[Address]) -> Result<Vec<AaDefinitionRow>>;

    /// Read-only getter against confirmed state
    async fn execute_getter(&self, aa: &Address, getter: &str, args: &[Value]) -> Result<Value>;

    /// Read-only getter against a pending-state view
    async fn execute_getter_in_state(
        &self,
        aa: &Address,
        getter: &str,
        args: &[Value],
        view: &UpcomingSnapshot,
    ) -> Result<Value>;

    async fn read_aa_state_vars(&self, aa: &Address) -> Result<StateVars>;

    async fn read_aa_balances(&self, aa: &Address) -> Result<Balances>;

    /// Base-currency balance of a plain address
    async fn read_balance(&self, address: &Address) -> Result<Amount>;

    async fn send_aa_request(
        &self,
        aa: &Address,
        amount: Amount,
        data: &Value,
    ) -> Result<Option<UnitId>>;

    /// Effects a submitted (not yet stable) request is expected to have
    async fn project_request(&self, unit: &UnitId) -> Result<ProjectedEffects>;

    async fn send_payment(&self, to: &Address, amount: Amount) -> Result<Option<UnitId>>;

    /// Whether the operator ever paid base currency to this address
    async fn has_received_from_operator(&self, address: &Address) -> Result<bool>;

    /// Pull the latest value of an oracle feed; true if it changed
    async fn update_data_feed(&self, oracle: &Address, feed_name: &str, force: bool)
        -> Result<bool>;

    /// Subscribe the event stream to requests and responses of a contract
    async fn watch_aa(&self, aa: &Address) -> Result<()>;
}
