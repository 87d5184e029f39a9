//! Observability infrastructure for the autoscale agent
//!
//! Provides:
//! - Prometheus metrics (cycle and collection latency, signal and dispatch counters)
//! - Structured JSON logging with tracing

use crate::models::ScalingSignal;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info};

/// Histogram buckets for cycle phases (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    cycle_latency_seconds: Histogram,
    collection_latency_seconds: Histogram,
    services_observed: IntGauge,
    signals_submitted: IntCounter,
    signals_dispatched: IntCounter,
    signals_dropped: IntCounter,
    dispatch_errors: IntCounter,
    services_skipped: IntCounterVec,
    cycle_errors: IntCounterVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "autoscale_agent_cycle_latency_seconds",
                "Time spent on the synchronous part of a polling cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            collection_latency_seconds: register_histogram!(
                "autoscale_agent_collection_latency_seconds",
                "Time spent collecting a container stats snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            services_observed: register_int_gauge!(
                "autoscale_agent_services_observed",
                "Number of autoscale services seen in the last cycle"
            )
            .expect("Failed to register services_observed"),

            signals_submitted: register_int_counter!(
                "autoscale_agent_signals_submitted_total",
                "Scaling signals queued for dispatch"
            )
            .expect("Failed to register signals_submitted"),

            signals_dispatched: register_int_counter!(
                "autoscale_agent_signals_dispatched_total",
                "Scaling signals accepted by the decision endpoint"
            )
            .expect("Failed to register signals_dispatched"),

            signals_dropped: register_int_counter!(
                "autoscale_agent_signals_dropped_total",
                "Scaling signals dropped because the dispatch queue was full"
            )
            .expect("Failed to register signals_dropped"),

            dispatch_errors: register_int_counter!(
                "autoscale_agent_dispatch_errors_total",
                "Scaling signals the decision endpoint rejected or never received"
            )
            .expect("Failed to register dispatch_errors"),

            services_skipped: register_int_counter_vec!(
                "autoscale_agent_services_skipped_total",
                "Services that produced no signal in a cycle",
                &["reason"]
            )
            .expect("Failed to register services_skipped"),

            cycle_errors: register_int_counter_vec!(
                "autoscale_agent_cycle_errors_total",
                "Polling cycles aborted before correlation",
                &["stage"]
            )
            .expect("Failed to register cycle_errors"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, elapsed: Duration) {
        self.inner().cycle_latency_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn observe_collection_latency(&self, elapsed: Duration) {
        self.inner()
            .collection_latency_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_services_observed(&self, count: usize) {
        self.inner().services_observed.set(count as i64);
    }

    pub fn inc_signals_submitted(&self) {
        self.inner().signals_submitted.inc();
    }

    pub fn inc_signals_dispatched(&self) {
        self.inner().signals_dispatched.inc();
    }

    pub fn inc_signals_dropped(&self) {
        self.inner().signals_dropped.inc();
    }

    pub fn inc_dispatch_errors(&self) {
        self.inner().dispatch_errors.inc();
    }

    /// Count a service skipped for `reason`
    pub fn inc_services_skipped(&self, reason: &str) {
        self.inner()
            .services_skipped
            .with_label_values(&[reason])
            .inc();
    }

    /// Count a cycle aborted at `stage`
    pub fn inc_cycle_errors(&self, stage: &str) {
        self.inner().cycle_errors.with_label_values(&[stage]).inc();
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted records for signals, cycles and
/// process lifecycle.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log a scaling signal about to be dispatched
    pub fn log_signal(&self, signal: &ScalingSignal) {
        info!(
            event = "signal_built",
            node = %self.node_name,
            service = %signal.service_name,
            service_id = %signal.service_id,
            cpu_percentage = signal.current.cpu_percentage,
            memory_percentage = signal.current.memory_percentage,
            replicas = signal.current.replicas,
            based_cpu_percentage = signal.based.cpu_percentage,
            based_memory_percentage = signal.based.memory_percentage,
            min = signal.based.min,
            max = signal.based.max,
            "Built scaling signal"
        );
    }

    /// Log a completed polling cycle
    pub fn log_cycle_completed(
        &self,
        services: usize,
        signals: usize,
        skipped: usize,
        elapsed: Duration,
    ) {
        info!(
            event = "cycle_completed",
            node = %self.node_name,
            services = services,
            signals = signals,
            skipped = skipped,
            elapsed_ms = elapsed.as_millis() as u64,
            "Polling cycle complete"
        );
    }

    /// Log a polling cycle aborted before correlation
    pub fn log_cycle_failed(&self, stage: &str, error: &dyn std::error::Error) {
        error!(
            event = "cycle_failed",
            node = %self.node_name,
            stage = %stage,
            error = %error,
            "Polling cycle failed"
        );
    }

    pub fn log_startup(&self, version: &str, dispatch_url: &str, schedule_at_secs: u64) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            dispatch_url = %dispatch_url,
            schedule_at_secs = schedule_at_secs,
            "Autoscale agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Autoscale agent shutting down"
        );
    }
}
