//! Observability infrastructure for the incident orchestrator
//!
//! Provides:
//! - Prometheus metrics (request counters, scan and analysis latency, stage failures, tickets)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for scan and analysis latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OrchestratorMetricsInner> = OnceLock::new();

struct OrchestratorMetricsInner {
    requests_total: IntCounterVec,
    errors_total: IntCounterVec,
    rate_limited_total: IntCounterVec,
    validation_errors_total: IntCounterVec,
    logs_scanned_total: IntCounterVec,
    scan_latency_seconds: HistogramVec,
    analysis_latency_seconds: HistogramVec,
    stage_failures_total: IntCounterVec,
    tickets_created_total: IntCounterVec,
    tickets_closed_total: IntCounterVec,
    jobs_pending: IntGauge,
}

impl OrchestratorMetricsInner {
    fn new() -> Self {
        Self {
            requests_total: register_int_counter_vec!(
                "incident_orchestrator_requests_total",
                "Total requests by endpoint",
                &["endpoint"]
            )
            .expect("Failed to register requests_total"),

            errors_total: register_int_counter_vec!(
                "incident_orchestrator_errors_total",
                "Total failed requests by endpoint",
                &["endpoint"]
            )
            .expect("Failed to register errors_total"),

            rate_limited_total: register_int_counter_vec!(
                "incident_orchestrator_rate_limited_total",
                "Total rate limited requests by endpoint",
                &["endpoint"]
            )
            .expect("Failed to register rate_limited_total"),

            validation_errors_total: register_int_counter_vec!(
                "incident_orchestrator_validation_errors_total",
                "Total rejected requests by endpoint",
                &["endpoint"]
            )
            .expect("Failed to register validation_errors_total"),

            logs_scanned_total: register_int_counter_vec!(
                "incident_orchestrator_logs_scanned_total",
                "Total filtered log lines collected",
                &["cluster", "namespace"]
            )
            .expect("Failed to register logs_scanned_total"),

            scan_latency_seconds: register_histogram_vec!(
                "incident_orchestrator_scan_latency_seconds",
                "End-to-end scan latency",
                &["endpoint"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register scan_latency_seconds"),

            analysis_latency_seconds: register_histogram_vec!(
                "incident_orchestrator_analysis_latency_seconds",
                "Latency of the four-stage analysis pipeline",
                &["endpoint"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),

            stage_failures_total: register_int_counter_vec!(
                "incident_orchestrator_stage_failures_total",
                "Analysis stage calls that degraded to an error",
                &["stage"]
            )
            .expect("Failed to register stage_failures_total"),

            tickets_created_total: register_int_counter_vec!(
                "incident_orchestrator_tickets_created_total",
                "Incident tickets created or found already open",
                &["outcome"]
            )
            .expect("Failed to register tickets_created_total"),

            tickets_closed_total: register_int_counter_vec!(
                "incident_orchestrator_tickets_closed_total",
                "Ticket transitions triggered by merged pull requests",
                &["outcome"]
            )
            .expect("Failed to register tickets_closed_total"),

            jobs_pending: register_int_gauge!(
                "incident_orchestrator_jobs_pending",
                "Async scan jobs not yet finished"
            )
            .expect("Failed to register jobs_pending"),
        }
    }
}

/// Orchestrator metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct OrchestratorMetrics {
    _private: (),
}

impl Default for OrchestratorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OrchestratorMetricsInner {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new)
    }

    pub fn inc_requests(&self, endpoint: &str) {
        self.inner()
            .requests_total
            .with_label_values(&[endpoint])
            .inc();
    }

    pub fn inc_errors(&self, endpoint: &str) {
        self.inner().errors_total.with_label_values(&[endpoint]).inc();
    }

    pub fn inc_rate_limited(&self, endpoint: &str) {
        self.inner()
            .rate_limited_total
            .with_label_values(&[endpoint])
            .inc();
    }

    pub fn inc_validation_errors(&self, endpoint: &str) {
        self.inner()
            .validation_errors_total
            .with_label_values(&[endpoint])
            .inc();
    }

    pub fn add_logs_scanned(&self, cluster: &str, namespace: &str, lines: u64) {
        self.inner()
            .logs_scanned_total
            .with_label_values(&[cluster, namespace])
            .inc_by(lines);
    }

    pub fn observe_scan_latency(&self, endpoint: &str, duration_secs: f64) {
        self.inner()
            .scan_latency_seconds
            .with_label_values(&[endpoint])
            .observe(duration_secs);
    }

    pub fn observe_analysis_latency(&self, endpoint: &str, duration_secs: f64) {
        self.inner()
            .analysis_latency_seconds
            .with_label_values(&[endpoint])
            .observe(duration_secs);
    }

    pub fn inc_stage_failures(&self, stage: &str) {
        self.inner()
            .stage_failures_total
            .with_label_values(&[stage])
            .inc();
    }

    /// `outcome` is "created" or "deduplicated"
    pub fn inc_tickets_created(&self, outcome: &str) {
        self.inner()
            .tickets_created_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// `outcome` is "closed" or "failed"
    pub fn inc_tickets_closed(&self, outcome: &str) {
        self.inner()
            .tickets_closed_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_jobs_pending(&self) {
        self.inner().jobs_pending.inc();
    }

    pub fn dec_jobs_pending(&self) {
        self.inner().jobs_pending.dec();
    }

    /// Render the default registry in Prometheus text format
    pub fn render(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            error!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Structured logger for orchestrator events
///
/// Provides consistent JSON-formatted logging for scans, escalations,
/// ticket lifecycle changes and process lifecycle.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a completed scan
    pub fn log_scan_completed(
        &self,
        cluster: &str,
        job_id: Option<&str>,
        total_logs: usize,
        pods_scanned: usize,
        errors: usize,
        duration_secs: f64,
    ) {
        info!(
            event = "scan_completed",
            instance = %self.instance,
            cluster = %cluster,
            job_id = ?job_id,
            total_logs = total_logs,
            pods_scanned = pods_scanned,
            errors = errors,
            duration_secs = duration_secs,
            "Log scan completed"
        );
    }

    /// Log an analysis stage that degraded to an error
    pub fn log_stage_failure(&self, stage: &str, error: &str) {
        warn!(
            event = "analysis_stage_failed",
            instance = %self.instance,
            stage = %stage,
            error = %error,
            "Analysis stage failed, continuing with error result"
        );
    }

    /// Log an escalation attempt for a critical root cause
    pub fn log_escalation(&self, root_cause: &str, outcome: Result<&str, &str>) {
        match outcome {
            Ok(ticket) => info!(
                event = "incident_escalated",
                instance = %self.instance,
                root_cause = %root_cause,
                ticket = %ticket,
                "Critical incident escalated"
            ),
            Err(error) => warn!(
                event = "incident_escalation_failed",
                instance = %self.instance,
                root_cause = %root_cause,
                error = %error,
                "Incident escalation failed"
            ),
        }
    }

    /// Log a ticket creation or dedup hit
    pub fn log_ticket_created(&self, ticket: &str, assignee: Option<&str>, deduplicated: bool) {
        info!(
            event = "ticket_created",
            instance = %self.instance,
            ticket = %ticket,
            assignee = ?assignee,
            deduplicated = deduplicated,
            "Incident ticket resolved"
        );
    }

    /// Log a ticket transitioned after a merge
    pub fn log_ticket_closed(&self, ticket: &str, pull_request: &str) {
        info!(
            event = "ticket_closed",
            instance = %self.instance,
            ticket = %ticket,
            pull_request = %pull_request,
            "Ticket closed by merged pull request"
        );
    }

    /// Log orchestrator startup
    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "orchestrator_started",
            instance = %self.instance,
            version = %version,
            port = port,
            "Incident orchestrator started"
        );
    }

    /// Log orchestrator shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "orchestrator_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Incident orchestrator shutting down"
        );
    }
}
