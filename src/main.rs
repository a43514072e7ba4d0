//! Plan Executor - multi-step on-chain transaction execution
//!
//! Loads a plan of approval transactions followed by one main transaction
//! and submits them through a wallet provider, one explicit action at a time.
//! Progress is exposed over HTTP.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod chain;
mod config;
mod coordination;
mod error;
mod metrics;
mod plan;
mod tx;
mod wallet;

use config::Settings;
use coordination::ExecutionEngine;
use metrics::MetricsServer;
use plan::PlanRequest;
use tx::{FeeCalculator, TransactionSubmitter};
use wallet::{LocalWalletProvider, ReceiptPolicy, WalletProvider};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Plan Executor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let registry = Arc::new(settings.chain_registry());
    info!("Loaded configuration for {} chains", registry.chain_ids().len());

    // Initialize wallet
    let signer = wallet::load_signer(&settings.wallet)?;
    let receipts = ReceiptPolicy {
        await_receipt: settings.executor.await_receipt,
        timeout: Duration::from_secs(settings.executor.receipt_timeout_secs),
    };
    let local_wallet = Arc::new(LocalWalletProvider::new(
        signer,
        registry.clone(),
        settings.executor.default_chain_id,
        receipts,
    ));
    info!("Wallet {:?} ready", local_wallet.address());

    // Initialize execution engine
    let submitter = TransactionSubmitter::new(
        registry.clone(),
        FeeCalculator::new(&settings.executor),
    );
    let engine = Arc::new(ExecutionEngine::new(submitter));

    if let Some(path) = &settings.executor.plan_file {
        load_plan_file(&engine, local_wallet.as_ref(), path).await?;
    }

    // Initialize metrics server
    let metrics_server = if settings.metrics.enabled {
        Some(MetricsServer::new(settings.metrics.port))
    } else {
        None
    };

    // Start API server
    let api_handle = tokio::spawn({
        let state = api::AppState {
            engine: engine.clone(),
            wallet: local_wallet.clone(),
        };
        let config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = metrics_server.map(|server| {
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let local_wallet = local_wallet.clone();
        let interval = settings.executor.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(Duration::from_secs(interval)).await;

                for (chain_id, healthy) in local_wallet.health_check().await {
                    if !healthy {
                        warn!("Chain {} health check failed", chain_id);
                    }
                }
            }
        }
    });

    info!("Plan Executor is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Plan Executor stopped");
    Ok(())
}

/// Install the plan stored at `path` as the initial plan
async fn load_plan_file(
    engine: &ExecutionEngine,
    wallet: &dyn WalletProvider,
    path: &Path,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {:?}", path))?;
    let request: PlanRequest = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse plan file: {:?}", path))?;
    let plan = request.into_plan()?;
    engine.set_plan(Arc::new(plan), wallet).await;
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,plan_executor=debug,hyper=warn"));
    let json = std::env::var("EXECUTOR_LOG_FORMAT").map_or(false, |v| v == "json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true).with_thread_ids(true)))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
