//! # Parkline Generator
//!
//! Publishes synthetic entry and exit events so the worker has something to
//! consume. Exits are drawn from vehicles currently in the presence set.
//!
//! ## Usage
//!
//! ```bash
//! GENERATOR_INTERVAL_MS=250 cargo run -p parkline-worker --bin parkline-generator
//! ```

use anyhow::Context;
use parkline_shared::connector::{OnExhausted, ResilientConnector};
use parkline_shared::messaging::{BrokerConnection, EventPublisher};
use parkline_shared::presence::{PresenceTracker, RedisStore};
use parkline_shared::telemetry::{init_tracing, Logger};
use parkline_worker::config::GeneratorConfig;
use parkline_worker::generator::EventGenerator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GeneratorConfig::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log)?;

    tracing::info!(
        interval_ms = config.interval.as_millis() as u64,
        exit_ratio = config.exit_ratio,
        "Parkline Generator v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let fatal = config.fatal_policy;
    let connector =
        ResilientConnector::new(Logger::new("connector")).on_exhausted(OnExhausted::Terminate);

    let broker = fatal.enforce(
        BrokerConnection::connect(config.broker.clone(), &connector, Logger::new("broker")).await,
    )?;
    let broker = Arc::new(broker);

    let store = fatal.enforce(
        RedisStore::connect(config.store.clone(), &connector, Logger::new("store")).await,
    )?;
    let tracker = Arc::new(PresenceTracker::new(store, Logger::new("presence")));

    let publisher = EventPublisher::new(broker.clone(), Logger::new("publisher"));
    let generator = EventGenerator::new(
        publisher,
        tracker.clone(),
        config.pipeline.clone(),
        config.exit_ratio,
        Logger::new("generator"),
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, exiting...");
        }
        signal.cancel();
    });

    let outcome = generator.run(config.interval, shutdown).await;

    tracker.store().close();
    if let Err(e) = broker.close().await {
        tracing::warn!(error = %e, "Failed to close broker connection");
    }

    fatal.enforce(outcome)?;
    Ok(())
}
