//! Ledger event dispatch
//!
//! Events are delivered strictly in arrival order. For each event every
//! handler runs to completion, in registration order, before the next
//! event is taken.

use std::sync::Arc;

use curvebuy_core::Result;
use ledger_client::{EventHandler, EventReceiver, LedgerEvent};

#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn EventHandler>) -> &mut Self {
        tracing::debug!(handler = handler.name(), "registered event handler");
        self.handlers.push(handler);
        self
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run every handler on one event. Handler failures are logged and the
    /// remaining handlers still run, unless the failure is fatal.
    pub async fn dispatch(&self, event: &LedgerEvent) -> Result<()> {
        for handler in &self.handlers {
            match handler.on_event(event).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    tracing::error!(
                        handler = handler.name(),
                        event = event.kind(),
                        "{}",
                        e
                    );
                    return Err(e);
                }
                Err(e) => tracing::warn!(
                    handler = handler.name(),
                    event = event.kind(),
                    "Handler failed: {}",
                    e
                ),
            }
        }
        Ok(())
    }

    /// Consume the event stream until it closes or a handler hits a fatal error
    pub async fn run(self, mut events: EventReceiver) -> Result<()> {
        tracing::info!(handlers = ?self.handler_names(), "dispatching ledger events");
        while let Some(event) = events.recv().await {
            self.dispatch(&event).await?;
        }
        tracing::warn!("ledger event stream closed");
        Ok(())
    }
}
