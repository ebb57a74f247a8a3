//! Pending-state feed
//!
//! Keeps the last snapshot of the watched contracts' upcoming state and
//! pushes per-contract diffs to websocket observers. Observers get the full
//! snapshot once on connect, then `{update}` messages.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use curve::CurveRegistry;
use curvebuy_core::{Address, Error, StateFeedConfig};
use ledger_client::{
    definition_base_aa, DefinitionApplied, EventHandler, LedgerEvent, UpcomingSnapshot,
    UpcomingStateCache,
};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Messages buffered per observer before it starts lagging
pub const UPDATE_CHANNEL_CAPACITY: usize = 256;

const MAXED_OUT_REASON: &str = "inbound connections maxed out";

/// Entries of `new` that are missing from or differ in `old`.
/// Contracts that disappeared are not reported.
pub fn diff(old: &UpcomingSnapshot, new: &UpcomingSnapshot) -> UpcomingSnapshot {
    UpcomingSnapshot {
        upcoming_state_vars: changed(&old.upcoming_state_vars, &new.upcoming_state_vars),
        upcoming_balances: changed(&old.upcoming_balances, &new.upcoming_balances),
    }
}

fn changed<V: PartialEq + Clone>(
    old: &BTreeMap<Address, V>,
    new: &BTreeMap<Address, V>,
) -> BTreeMap<Address, V> {
    new.iter()
        .filter(|(aa, value)| old.get(*aa) != Some(*value))
        .map(|(aa, value)| (aa.clone(), value.clone()))
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum FeedMessage<'a> {
    Snapshot(&'a UpcomingSnapshot),
    Update(&'a UpcomingSnapshot),
}

impl FeedMessage<'_> {
    fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Held for the lifetime of one observer connection
pub struct ConnectionSlot {
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct StateBroadcaster {
    state: UpcomingStateCache,
    curves: CurveRegistry,
    curve_base_aas: Vec<Address>,
    other_base_aas: Vec<Address>,
    factory_aas: Vec<Address>,
    watched: RwLock<Vec<Address>>,
    /// `None` until the startup bootstrap has run
    current: Mutex<Option<UpcomingSnapshot>>,
    updates: broadcast::Sender<String>,
    connections: Arc<AtomicUsize>,
    max_connections: usize,
}

impl StateBroadcaster {
    pub fn new(state: UpcomingStateCache, curves: CurveRegistry, config: &StateFeedConfig) -> Self {
        let addresses = |list: &[String]| list.iter().map(Address::new).collect::<Vec<_>>();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state,
            curves,
            curve_base_aas: addresses(&config.curve_base_aas),
            other_base_aas: addresses(&config.other_base_aas),
            factory_aas: addresses(&config.factory_aas),
            watched: RwLock::new(Vec::new()),
            current: Mutex::new(None),
            updates,
            connections: Arc::new(AtomicUsize::new(0)),
            max_connections: config.max_connections,
        }
    }

    pub async fn watched(&self) -> Vec<Address> {
        self.watched.read().await.clone()
    }

    /// Fresh snapshot of the watched contracts
    pub async fn snapshot(&self) -> UpcomingSnapshot {
        let watched = self.watched().await;
        self.state.snapshot_of(&watched).await
    }

    /// Last broadcast snapshot, or a fresh one before the feed is started
    pub async fn current(&self) -> UpcomingSnapshot {
        let cached = self.current.lock().await.clone();
        match cached {
            Some(snapshot) => snapshot,
            None => self.snapshot().await,
        }
    }

    /// Raw `{update}` messages, as sent to observers
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.updates.subscribe()
    }

    /// Re-snapshot and broadcast what changed. Returns the diff, if any.
    pub async fn update_state(&self) -> Result<Option<UpcomingSnapshot>, Error> {
        let mut current = self.current.lock().await;
        let Some(old) = current.as_ref() else {
            return Ok(None);
        };
        let new = self.snapshot().await;
        let update = diff(old, &new);
        *current = Some(new);
        if update.is_empty() {
            debug!("no changes");
            return Ok(None);
        }
        let message = FeedMessage::Update(&update).encode()?;
        // no observers connected is fine
        let _ = self.updates.send(message);
        Ok(Some(update))
    }

    pub async fn add_watched(&self, aa: &Address) -> Result<(), Error> {
        {
            let mut watched = self.watched.write().await;
            if watched.contains(aa) {
                return Ok(());
            }
            watched.push(aa.clone());
        }
        self.update_state().await?;
        Ok(())
    }

    /// Bootstrap the watch list: every curve and companion contract defined
    /// from the configured templates, plus the factories.
    pub async fn start_watching(&self) -> Result<(), Error> {
        let ledger = self.state.ledger().clone();
        let mut watched = Vec::new();

        if !self.curve_base_aas.is_empty() {
            for row in ledger.aas_by_base_aas(&self.curve_base_aas).await? {
                match self.curves.get_or_create(&row.address).await {
                    Ok(_) => {
                        debug!(curve = %row.address, "will watch curve");
                        watched.push(row.address);
                    }
                    Err(e) => warn!(curve = %row.address, "Failed to track curve: {}", e),
                }
            }
        }

        if !self.other_base_aas.is_empty() {
            for row in ledger.aas_by_base_aas(&self.other_base_aas).await? {
                self.state.follow(&row.address).await?;
                debug!(aa = %row.address, "will watch");
                watched.push(row.address);
            }
        }

        // learn about contracts defined from the templates later on
        for base_aa in self.curve_base_aas.iter().chain(&self.other_base_aas) {
            ledger.watch_aa(base_aa).await?;
        }

        for factory in &self.factory_aas {
            self.state.follow(factory).await?;
            watched.push(factory.clone());
        }

        {
            let mut list = self.watched.write().await;
            for aa in watched {
                if !list.contains(&aa) {
                    list.push(aa);
                }
            }
            info!(watched = list.len(), "state feed ready");
        }
        let snapshot = self.snapshot().await;
        *self.current.lock().await = Some(snapshot);
        Ok(())
    }

    async fn on_definition_applied(&self, def: &DefinitionApplied) -> Result<(), Error> {
        let Some(base_aa) = def
            .base_aa
            .clone()
            .or_else(|| definition_base_aa(&def.definition))
        else {
            return Ok(());
        };
        if self.curve_base_aas.contains(&base_aa) {
            if let Err(e) = self.curves.get_or_create(&def.address).await {
                warn!(curve = %def.address, "Failed to track new curve: {}", e);
                return Ok(());
            }
            info!(curve = %def.address, "will watch new curve");
        } else if self.other_base_aas.contains(&base_aa) {
            self.state.follow(&def.address).await?;
            info!(aa = %def.address, "will watch new non-curve AA");
        } else {
            return Ok(());
        }
        self.add_watched(&def.address).await
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Claim an observer slot, `None` when all are taken
    pub fn try_connect(&self) -> Option<ConnectionSlot> {
        let max = self.max_connections;
        self.connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| ConnectionSlot {
                connections: self.connections.clone(),
            })
    }

    /// Drive one observer connection until it closes
    pub async fn serve(&self, mut socket: WebSocket) {
        let Some(_slot) = self.try_connect() else {
            info!("{}, rejecting new client", MAXED_OUT_REASON);
            let frame = CloseFrame {
                code: close_code::NORMAL,
                reason: MAXED_OUT_REASON.into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        };

        let mut updates = self.updates.subscribe();
        if !self.send_snapshot(&mut socket).await {
            return;
        }
        debug!(observers = self.connection_count(), "observer connected");

        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(message) => {
                        if socket.send(Message::Text(message)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "observer lagging, resending snapshot");
                        if !self.send_snapshot(&mut socket).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                incoming = socket.recv() => match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                },
            }
        }
        debug!("observer disconnected");
    }

    async fn send_snapshot(&self, socket: &mut WebSocket) -> bool {
        let snapshot = self.current().await;
        let message = match FeedMessage::Snapshot(&snapshot).encode() {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to encode snapshot: {}", e);
                return false;
            }
        };
        socket.send(Message::Text(message)).await.is_ok()
    }
}

#[async_trait]
impl EventHandler for StateBroadcaster {
    fn name(&self) -> &'static str {
        "state_feed"
    }

    async fn on_event(&self, event: &LedgerEvent) -> curvebuy_core::Result<()> {
        match event {
            LedgerEvent::Request(_) | LedgerEvent::Response(_) => {
                self.update_state().await?;
            }
            LedgerEvent::DefinitionApplied(def) => self.on_definition_applied(def).await?,
            LedgerEvent::DataFeedsUpdated => {}
        }
        Ok(())
    }
}
