//! Prometheus metrics for transitions and intent consumers.
//!
//! Recording goes through the `metrics` facade, so it is a no-op until a
//! recorder is installed. The server installs one with [`install_recorder`]
//! and serves [`PrometheusHandle::render`] at `GET /metrics`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

fn builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS)
        .map_err(|e| MetricsError::Build(e.to_string()))
}

/// Install the global Prometheus recorder and describe every metric.
///
/// # Errors
///
/// `Install` if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = builder()?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    register_metrics();
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
///
/// Renders an empty exposition; used where a handle is required but nothing
/// should be recorded, such as HTTP tests.
///
/// # Errors
///
/// `Build` if the exporter configuration is rejected.
pub fn detached_handle() -> Result<PrometheusHandle, MetricsError> {
    Ok(builder()?.build_recorder().handle())
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "booking_transitions_total",
        "Transition requests by action and outcome"
    );
    describe_counter!(
        "booking_transition_conflicts_total",
        "Compare-and-swap attempts lost to a concurrent writer"
    );
    describe_histogram!(
        "booking_transition_duration_seconds",
        "Time taken to handle a transition request, retries included"
    );
    describe_counter!(
        "booking_intents_applied_total",
        "Intents whose side effect was performed, by consumer"
    );
    describe_counter!(
        "booking_intent_failures_total",
        "Intents a consumer failed to process, by consumer"
    );
    describe_counter!(
        "ledger_duplicate_intents_total",
        "Ledger intents that were already recorded"
    );
}

/// Transition engine metrics recorder.
pub struct TransitionMetrics;

impl TransitionMetrics {
    /// Record the outcome of one `request_transition` call.
    ///
    /// `outcome` is `committed` or a lowercase error code.
    pub fn record(action: &'static str, outcome: &'static str, duration: Duration) {
        counter!("booking_transitions_total", "action" => action, "outcome" => outcome).increment(1);
        histogram!("booking_transition_duration_seconds", "action" => action)
            .record(duration.as_secs_f64());
    }

    /// Record a lost compare-and-swap.
    pub fn record_conflict() {
        counter!("booking_transition_conflicts_total").increment(1);
    }
}

/// Intent consumer metrics recorder.
pub struct IntentMetrics;

impl IntentMetrics {
    /// Record an intent marked applied.
    pub fn record_applied(consumer: &'static str) {
        counter!("booking_intents_applied_total", "consumer" => consumer).increment(1);
    }

    /// Record an intent the consumer could not process.
    pub fn record_failure(consumer: &'static str) {
        counter!("booking_intent_failures_total", "consumer" => consumer).increment(1);
    }

    /// Record a ledger intent that had already been recorded.
    pub fn record_duplicate() {
        counter!("ledger_duplicate_intents_total").increment(1);
    }
}
