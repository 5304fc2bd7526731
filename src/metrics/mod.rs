//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Swap state transitions
//! - Secret releases
//! - Escrow poll latency and failures
//! - Ledger inconsistencies

use crate::error::CoordinatorResult;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Swap lifecycle metrics
    pub static ref SWAP_TRANSITIONS: CounterVec = register_counter_vec!(
        "swap_coordinator_transitions_total",
        "Total swap state transitions by target state",
        &["state"]
    ).unwrap();

    pub static ref ACTIVE_SWAPS: GaugeVec = register_gauge_vec!(
        "swap_coordinator_active_swaps",
        "Swaps currently tracked in memory",
        &[]
    ).unwrap();

    // Secret metrics
    pub static ref SECRETS_RELEASED: CounterVec = register_counter_vec!(
        "swap_coordinator_secrets_released_total",
        "Total secrets forwarded to the order book",
        &[]
    ).unwrap();

    // Escrow monitor metrics
    pub static ref POLL_FAILURES: CounterVec = register_counter_vec!(
        "swap_coordinator_poll_failures_total",
        "Total escrow polls that exhausted their retries",
        &[]
    ).unwrap();

    pub static ref POLL_LATENCY: HistogramVec = register_histogram_vec!(
        "swap_coordinator_poll_latency_seconds",
        "Escrow poll latency",
        &[],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // Ledger metrics
    pub static ref LEDGER_INCONSISTENCIES: CounterVec = register_counter_vec!(
        "swap_coordinator_ledger_inconsistencies_total",
        "Swaps halted because their ledger record is inconsistent",
        &[]
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

    pub async fn run(&self) -> CoordinatorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::error::CoordinatorError::Internal(e.to_string()))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| crate::error::CoordinatorError::Internal(e.to_string()))?;

        Ok(())
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

pub fn record_transition(state: &str) {
    SWAP_TRANSITIONS.with_label_values(&[state]).inc();
}

pub fn set_active_swaps(count: usize) {
    ACTIVE_SWAPS.with_label_values(&[]).set(count as f64);
}

pub fn record_secret_released() {
    SECRETS_RELEASED.with_label_values(&[]).inc();
}

pub fn record_poll_failure() {
    POLL_FAILURES.with_label_values(&[]).inc();
}

pub fn record_poll_latency(latency_secs: f64) {
    POLL_LATENCY.with_label_values(&[]).observe(latency_secs);
}

pub fn record_ledger_inconsistency() {
    LEDGER_INCONSISTENCIES.with_label_values(&[]).inc();
}
