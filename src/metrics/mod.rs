//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction submission and nonce races
//! - Task dispatch
//! - Confirmation outcomes and latency

use crate::error::{AnchorError, AnchorResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, Encoder,
    HistogramVec, IntCounter, TextEncoder,
};
use std::future::Future;
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: IntCounter = register_int_counter!(
        "anchor_transactions_submitted_total",
        "Total transactions accepted by the node"
    ).unwrap();

    pub static ref TX_NONCE_RACES: IntCounter = register_int_counter!(
        "anchor_transaction_nonce_races_total",
        "Total submissions rejected because another transaction took the nonce"
    ).unwrap();

    pub static ref TX_FAILED: IntCounter = register_int_counter!(
        "anchor_transactions_failed_total",
        "Total submissions that gave up"
    ).unwrap();

    // Task metrics
    pub static ref TASKS_DISPATCHED: CounterVec = register_counter_vec!(
        "anchor_tasks_dispatched_total",
        "Total tasks dispatched by type",
        &["task"]
    ).unwrap();

    pub static ref TASKS_FINISHED: CounterVec = register_counter_vec!(
        "anchor_tasks_finished_total",
        "Total tasks finished by type and result",
        &["task", "result"]
    ).unwrap();

    // Confirmation metrics
    pub static ref CONFIRMATIONS: CounterVec = register_counter_vec!(
        "anchor_confirmations_total",
        "Confirmation waits by event and outcome",
        &["event", "outcome"]
    ).unwrap();

    pub static ref CONFIRMATION_LATENCY: HistogramVec = register_histogram_vec!(
        "anchor_confirmation_latency_seconds",
        "Time from first filter to the end of a confirmation wait",
        &["event"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
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

    pub async fn run<F>(&self, shutdown: F) -> AnchorResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(|| async { "OK" }));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AnchorError::Config(format!("failed to bind metrics port {}: {}", self.port, e)))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| AnchorError::Internal(format!("metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Text exposition of every registered metric
pub fn render() -> AnchorResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AnchorError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| AnchorError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_tx_submitted() {
    TX_SUBMITTED.inc();
}

pub fn record_nonce_race() {
    TX_NONCE_RACES.inc();
}

pub fn record_tx_failed() {
    TX_FAILED.inc();
}

pub fn record_task_dispatched(task: &str) {
    TASKS_DISPATCHED.with_label_values(&[task]).inc();
}

pub fn record_task_finished(task: &str, success: bool) {
    let result = if success { "ok" } else { "error" };
    TASKS_FINISHED.with_label_values(&[task, result]).inc();
}

pub fn record_confirmation(event: &str, outcome: &str) {
    CONFIRMATIONS.with_label_values(&[event, outcome]).inc();
}

pub fn record_confirmation_latency(event: &str, latency_secs: f64) {
    CONFIRMATION_LATENCY
        .with_label_values(&[event])
        .observe(latency_secs);
}
