//! curvebuy application library
//!
//! Wires the ledger client, the buffer and order engines, the pending-state
//! feed and the HTTP server together.

pub mod dispatcher;
pub mod tasks;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use buffer::{BufferOrchestrator, BufferSettings};
use curve::CurveRegistry;
use curvebuy_api::{start_server, AppState, StateBroadcaster};
use curvebuy_core::{Address, AppConfig, Error};
use curvebuy_db::Database;
use ledger_client::{event_channel, Ledger, NodeClient, UpcomingStateCache};
use orders::{
    CompensationPolicy, CryptoCompareClient, OrderReconciler, OswapCcClient, Providers,
    SimpleSwapClient,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use dispatcher::EventDispatcher;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "CURVEBUY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "conf.json";

const DEFAULT_LOG_FILTER: &str = "info,curvebuy=debug,buffer=debug,orders=debug,curve=debug";

/// How often the ledger gateway is polled for new events
const EVENT_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Templates buffers and curves are instantiated from must exist on the ledger
pub async fn check_templates(ledger: &dyn Ledger, config: &AppConfig) -> Result<(), Error> {
    for template in [&config.buffer_base_aa, &config.curve_base_aa] {
        let address = Address::new(template.clone());
        if ledger.read_aa_definition(&address).await?.is_none() {
            return Err(Error::Config(format!("template {} is not defined", address)));
        }
    }
    Ok(())
}

/// Run the bot until the HTTP server fails, the event stream ends, or a
/// fatal error stops event processing
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config_path =
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load(&config_path)?;
    config.validate()?;
    tracing::info!(config = %config_path, testnet = config.testnet, "Starting curvebuy");

    let node = NodeClient::new(config.node.clone())
        .await
        .with_context(|| format!("connecting to ledger gateway at {}", config.node.url))?;
    tracing::info!(operator = %node.operator_address(), "connected to ledger gateway");
    let ledger: Arc<dyn Ledger> = Arc::new(node.clone());
    check_templates(ledger.as_ref(), &config).await?;

    let db = Database::open(&config.database_path).await?;
    let (events_tx, events_rx) = event_channel();
    let start_cursor = db.event_cursor().await?.unwrap_or(0);
    let (cursor_tx, cursor_rx) = watch::channel(start_cursor);
    tasks::spawn_save_event_cursor(db.clone(), cursor_rx);

    let state = UpcomingStateCache::new(ledger.clone());
    let curves = CurveRegistry::new(
        state.clone(),
        Some(events_tx.clone()),
        config.light,
        Some(Duration::from_secs(config.oracle_refresh_secs)),
    );

    let providers = Providers::new()
        .with(Arc::new(SimpleSwapClient::new(
            config.simpleswap_api_key.clone(),
        )?))
        .with(Arc::new(OswapCcClient::new()?));
    let rates = Arc::new(CryptoCompareClient::new(config.fair_rate_symbol.clone())?);
    let orders = Arc::new(OrderReconciler::new(
        db.clone(),
        ledger.clone(),
        providers,
        rates,
        CompensationPolicy::from_config(&config),
    ));
    let buffers = Arc::new(BufferOrchestrator::new(
        db,
        state.clone(),
        curves.clone(),
        orders.clone(),
        BufferSettings::from_config(&config),
    ));
    let feed = Arc::new(StateBroadcaster::new(
        state.clone(),
        curves,
        &config.state_feed,
    ));

    let mut dispatcher = EventDispatcher::new();
    dispatcher
        .register(Arc::new(state))
        .register(buffers.clone())
        .register(feed.clone());
    let dispatch = tokio::spawn(dispatcher.run(events_rx));
    node.spawn_event_poller(events_tx, EVENT_POLL_INTERVAL, start_cursor, cursor_tx);

    let arb_base_aa =
        (!config.arb_base_aa.is_empty()).then(|| Address::new(config.arb_base_aa.clone()));
    buffers.start_watching(arb_base_aa.as_ref()).await?;

    tasks::spawn_finish_orders(
        orders.clone(),
        Duration::from_secs(config.finish_orders_secs),
    );
    tasks::spawn_pay_compensations(
        orders.clone(),
        Duration::from_millis(config.pay_compensations_ms),
    );

    if let Err(e) = buffers.trigger_pending_buffers(None).await {
        tracing::warn!("Initial buffer sweep failed: {}", e);
    }
    feed.start_watching().await?;

    let app_state = AppState::new(
        buffers,
        orders,
        ledger,
        Address::new(config.curve_base_aa.clone()),
        feed,
    );

    tokio::select! {
        res = start_server(app_state, config.web_port) => {
            res.context("HTTP server failed")?;
        }
        res = dispatch => {
            res.context("event dispatcher panicked")??;
            anyhow::bail!("ledger event stream closed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_client::InMemoryLedger;
    use serde_json::json;

    #[tokio::test]
    async fn test_check_templates() {
        let ledger = InMemoryLedger::new("OP");
        let buffer_base = ledger.add_aa(json!(["autonomous agent", {"doc": "buffer"}]));
        let mut config = AppConfig {
            buffer_base_aa: buffer_base.to_string(),
            curve_base_aa: "MISSING".into(),
            ..AppConfig::default()
        };
        let err = check_templates(&ledger, &config).await.unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("MISSING")));

        let curve_base = ledger.add_aa(json!(["autonomous agent", {"doc": "curve"}]));
        config.curve_base_aa = curve_base.to_string();
        assert!(check_templates(&ledger, &config).await.is_ok());
    }
}
