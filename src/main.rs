//! Kafka Connect Kubernetes Operator
//!
//! Main entry point for the operator. Loads configuration, connects to the
//! Kubernetes API server and runs the watches, the periodic reconciliation
//! timer and the dispatcher until a shutdown signal arrives.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kafka_connect_operator::{
    config::OperatorConfig,
    controllers::{self, Context},
    metrics,
};

/// Capacity of the event channel between event sources and the dispatcher
const EVENT_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = OperatorConfig::from_env()?;
    info!(
        namespaces = ?config.namespaces,
        supports_s2i = config.supports_s2i,
        "Starting Kafka Connect Operator"
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let context = Arc::new(Context::new(client.clone(), config.clone()).await?);
    let shutdown = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port, shutdown.clone()));
    info!("Metrics server starting on port {}", config.metrics_port);

    let dispatcher = tokio::spawn(controllers::run_dispatcher(
        context.clone(),
        events_rx,
        shutdown.clone(),
    ));
    let timer = controllers::run_timer(context.clone(), events_tx.clone(), shutdown.clone());
    let watchers = controllers::run_watchers(client, config, events_tx, shutdown.clone());

    tokio::select! {
        _ = timer => {
            error!("Periodic reconciliation exited unexpectedly");
        }
        _ = watchers => {
            error!("Watches exited unexpectedly");
        }
        result = metrics_handle => {
            error!(result = ?result, "Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    shutdown.cancel();
    metrics::OPERATOR_HEALTH.set(0.0);
    if let Err(e) = dispatcher.await {
        error!(error = %e, "Dispatcher task failed");
    }

    info!("Kafka Connect Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for SIGTERM or SIGINT
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
