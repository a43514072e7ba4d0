//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Plan loads and resets
//! - Submissions and failures per phase
//! - Fee estimation fallbacks and network switches
//! - Chain connection status

use crate::error::{ExecutorError, ExecutorResult};
use crate::tx::Phase;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram_vec, Counter,
    CounterVec, Encoder, GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref PLANS_LOADED: Counter = register_counter!(
        "executor_plans_loaded_total",
        "Total plans installed"
    ).unwrap();

    pub static ref PLAN_RESETS: Counter = register_counter!(
        "executor_plan_resets_total",
        "Total plans discarded by replacement or clearing"
    ).unwrap();

    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "executor_transactions_submitted_total",
        "Transactions accepted by the wallet provider",
        &["chain_id", "phase"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "executor_transactions_failed_total",
        "Failed submission attempts",
        &["phase", "kind"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "executor_submission_latency_seconds",
        "Time from submit request to provider response",
        &["phase"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    pub static ref ESTIMATION_FALLBACKS: CounterVec = register_counter_vec!(
        "executor_fee_estimation_fallbacks_total",
        "Submissions sent without fee overrides after estimation failed",
        &["chain_id"]
    ).unwrap();

    pub static ref NETWORK_SWITCHES: CounterVec = register_counter_vec!(
        "executor_network_switches_total",
        "Wallet network switches",
        &["chain_id"]
    ).unwrap();

    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "executor_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> ExecutorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ExecutorError::Internal(format!("metrics bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| ExecutorError::Internal(format!("metrics server: {}", e)))
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_plan_loaded() {
    PLANS_LOADED.inc();
}

pub fn record_plan_reset() {
    PLAN_RESETS.inc();
}

pub fn record_tx_submitted(chain_id: u64, phase: Phase) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string(), phase.label()])
        .inc();
}

pub fn record_tx_failed(phase: Phase, error: &ExecutorError) {
    TX_FAILED
        .with_label_values(&[phase.label(), error.kind()])
        .inc();
}

pub fn record_tx_latency(phase: Phase, latency_secs: f64) {
    TX_LATENCY
        .with_label_values(&[phase.label()])
        .observe(latency_secs);
}

pub fn record_estimation_fallback(chain_id: u64) {
    ESTIMATION_FALLBACKS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_network_switch(chain_id: u64) {
    NETWORK_SWITCHES
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_render() {
        record_estimation_fallback(42161);
        record_tx_failed(
            Phase::Approval(0),
            &ExecutorError::ProviderRejected("User rejected the request.".to_string()),
        );

        let body = metrics_handler().await.unwrap();
        assert!(body.contains("executor_fee_estimation_fallbacks_total{chain_id=\"42161\"}"));
        assert!(body.lines().any(|l| {
            l.starts_with("executor_transactions_failed_total{")
                && l.contains("kind=\"rejected\"")
                && l.contains("phase=\"approval\"")
        }));
    }
}
