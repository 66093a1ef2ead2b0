//! # homewatchd — homewatch daemon
//!
//! Composition root that wires the adapters to the controller core and runs
//! it until a shutdown signal arrives.
//!
//! ## Responsibilities
//! - Load configuration (`homewatch.toml` + env vars) and initialise logging
//! - Resolve the broker address and base topic through the registry
//! - Open the single MQTT connection (fatal if it cannot be established)
//! - Start the rebalancer: first refresh, then the periodic one
//! - Serve the read-only status API
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use homewatch_adapter_http_axum::router;
use homewatch_adapter_http_axum::state::AppState;
use homewatch_adapter_registry_http::HttpRegistry;
use homewatch_app::ports::Registry;
use homewatch_app::rebalancer::Rebalancer;
use homewatch_domain::topic;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging.filter);

    // Registry
    let registry =
        Arc::new(HttpRegistry::new(&config.registry).context("failed to build registry client")?);

    let broker = match config.mqtt.broker_override() {
        Some(broker) => broker,
        None => registry
            .fetch_broker()
            .await
            .with_context(|| format!("failed to fetch broker address from {}", config.registry.url))?,
    };

    let base_topic = match registry.fetch_base_topic().await {
        Ok(topic) => topic,
        Err(err) => {
            tracing::warn!(
                error = %err,
                fallback = %config.mqtt.fallback_base_topic,
                "base topic unavailable, using fallback"
            );
            config.mqtt.fallback_base_topic.clone()
        }
    };

    if !topic::is_single_level(&base_topic) {
        tracing::warn!(
            %base_topic,
            "base topic is not a single level; sensor messages under it will be dropped as malformed"
        );
    }

    // Bus
    let (bus, connection) = match homewatch_adapter_mqtt::connect(&config.mqtt, &broker).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::error!(%broker, error = %err, "cannot connect to MQTT broker");
            return Err(err).with_context(|| format!("failed to connect to MQTT broker at {broker}"));
        }
    };
    let bus = Arc::new(bus);

    // Controller core
    let token = CancellationToken::new();
    let rebalancer = Arc::new(Rebalancer::new(
        config.rebalance_config()?,
        base_topic.as_str(),
        Arc::clone(&bus),
        Arc::clone(&registry),
        token.child_token(),
    ));
    let events = connection.spawn(Arc::clone(&rebalancer), token.clone());

    match rebalancer.start().await {
        Ok(outcome) => tracing::info!(?outcome, %base_topic, "initial topology applied"),
        Err(err) => tracing::warn!(error = %err, "initial topology refresh failed, retrying on next tick"),
    }

    // HTTP
    if config.server.enabled {
        let app = router::build(AppState::new(Arc::clone(&rebalancer)));
        let bind_addr = config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind status API on {bind_addr}"))?;
        tracing::info!("homewatchd status API listening on http://{bind_addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("status API server failed")?;
    } else {
        shutdown_signal().await;
    }

    // Shutdown
    rebalancer.shutdown().await;
    bus.disconnect().await;
    token.cancel();
    if let Err(err) = events.await {
        tracing::warn!(error = %err, "MQTT event loop ended abnormally");
    }
    tracing::info!("homewatchd stopped");

    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
