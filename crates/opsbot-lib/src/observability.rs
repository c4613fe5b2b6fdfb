//! Observability infrastructure for the remediation agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, anomalies, remediations, notifications, retries)
//! - Structured JSON logging with tracing, one named event per pipeline step

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec, Gauge,
    Histogram, IntCounter, IntCounterVec,
};
use std::fmt::Display;
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::models::{
    AnomalyReport, CycleResult, DiagnosisReport, NotificationResult, RemediationOutcome,
};

/// Histogram buckets for cycle duration (in seconds); cycles include a settling delay
const CYCLE_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 20.0, 30.0, 45.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles: IntCounter,
    healthy_cycles: IntCounter,
    cycle_failures: IntCounter,
    anomalies_detected: IntCounter,
    remediations: IntCounterVec,
    notifications: IntCounterVec,
    backend_retries: IntCounterVec,
    history_entries_written: IntCounter,
    last_cpu_usage_percent: Gauge,
    last_memory_usage_percent: Gauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "opsbot_cycle_duration_seconds",
                "Wall time of one sample/analyze/remediate/notify cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles: register_int_counter!("opsbot_cycles_total", "Total cycles completed")
                .expect("Failed to register cycles_total"),

            healthy_cycles: register_int_counter!(
                "opsbot_healthy_cycles_total",
                "Cycles that ended without an anomaly"
            )
            .expect("Failed to register healthy_cycles_total"),

            cycle_failures: register_int_counter!(
                "opsbot_cycle_failures_total",
                "Cycles aborted by an unexpected internal failure"
            )
            .expect("Failed to register cycle_failures_total"),

            anomalies_detected: register_int_counter!(
                "opsbot_anomalies_detected_total",
                "Total number of anomalies detected"
            )
            .expect("Failed to register anomalies_detected_total"),

            remediations: register_int_counter_vec!(
                "opsbot_remediations_total",
                "Remediation outcomes by result",
                &["outcome"]
            )
            .expect("Failed to register remediations_total"),

            notifications: register_int_counter_vec!(
                "opsbot_notifications_total",
                "Chat notifications by delivery status",
                &["status"]
            )
            .expect("Failed to register notifications_total"),

            backend_retries: register_int_counter_vec!(
                "opsbot_backend_retries_total",
                "Backend query attempts that failed and were retried",
                &["query"]
            )
            .expect("Failed to register backend_retries_total"),

            history_entries_written: register_int_counter!(
                "opsbot_history_entries_written_total",
                "History entries appended after confirmed delivery"
            )
            .expect("Failed to register history_entries_written_total"),

            last_cpu_usage_percent: register_gauge!(
                "opsbot_last_cpu_usage_percent",
                "CPU utilization from the most recent sample"
            )
            .expect("Failed to register last_cpu_usage_percent"),

            last_memory_usage_percent: register_gauge!(
                "opsbot_last_memory_usage_percent",
                "Memory utilization from the most recent sample"
            )
            .expect("Failed to register last_memory_usage_percent"),
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

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
        self.inner().cycles.inc();
    }

    pub fn inc_healthy_cycles(&self) {
        self.inner().healthy_cycles.inc();
    }

    pub fn inc_cycle_failures(&self) {
        self.inner().cycle_failures.inc();
    }

    pub fn record_sample(&self, report: &AnomalyReport) {
        self.inner().last_cpu_usage_percent.set(report.cpu_usage);
        self.inner().last_memory_usage_percent.set(report.memory_usage);
        if report.anomaly_detected {
            self.inner().anomalies_detected.inc();
        }
    }

    /// `outcome` is one of `restarted`, `failed`, `skipped`
    pub fn inc_remediation(&self, outcome: &str) {
        self.inner().remediations.with_label_values(&[outcome]).inc();
    }

    pub fn inc_notification(&self, result: &NotificationResult) {
        let status = result.status.to_string();
        self.inner()
            .notifications
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn inc_backend_retries(&self, query: &str) {
        self.inner().backend_retries.with_label_values(&[query]).inc();
    }

    pub fn inc_history_entries(&self) {
        self.inner().history_entries_written.inc();
    }
}

/// Structured logger for pipeline events
///
/// Created once at process start and handed to each component, so every
/// event carries the same agent identity.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    agent: String,
}

impl StructuredLogger {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Log a state machine transition
    pub fn log_stage(&self, cycle: u64, stage: impl Display) {
        info!(
            event = "cycle_stage",
            agent = %self.agent,
            cycle = cycle,
            stage = %stage,
            "Cycle stage transition"
        );
    }

    pub fn log_sample(&self, report: &AnomalyReport) {
        info!(
            event = "metrics_sampled",
            agent = %self.agent,
            cpu_usage = report.cpu_usage,
            memory_usage = report.memory_usage,
            timestamp = report.timestamp,
            "CPU Usage: {:.2}%, Memory Usage: {:.2}%",
            report.cpu_usage,
            report.memory_usage
        );
    }

    pub fn log_sample_unavailable(&self, reason: impl Display) {
        warn!(
            event = "metrics_unavailable",
            agent = %self.agent,
            reason = %reason,
            "Metrics backend unavailable, treating system as healthy"
        );
    }

    pub fn log_anomaly(&self, report: &AnomalyReport, threshold: f64) {
        warn!(
            event = "anomaly_detected",
            agent = %self.agent,
            cpu_usage = report.cpu_usage,
            memory_usage = report.memory_usage,
            threshold = threshold,
            timestamp = report.timestamp,
            "Anomaly detected"
        );
    }

    pub fn log_diagnosis(&self, diagnosis: &DiagnosisReport) {
        info!(
            event = "diagnosis_completed",
            agent = %self.agent,
            actionable = diagnosis.actionable,
            log_lines = diagnosis.logs.lines().count(),
            analysis = %diagnosis.analysis,
            "Log analysis completed"
        );
    }

    pub fn log_trend_unavailable(&self, err: impl Display) {
        error!(
            event = "memory_trend_failed",
            agent = %self.agent,
            error = %err,
            "Memory pattern analysis failed"
        );
    }

    pub fn log_remediation_skipped(&self, actionable: bool) {
        info!(
            event = "remediation_skipped",
            agent = %self.agent,
            actionable = actionable,
            "No actionable remediation identified"
        );
    }

    pub fn log_remediation(&self, outcome: &RemediationOutcome) {
        if outcome.stable {
            info!(
                event = "remediation",
                agent = %self.agent,
                action = %outcome.action,
                stable = true,
                "Remediation applied"
            );
        } else {
            warn!(
                event = "remediation",
                agent = %self.agent,
                action = %outcome.action,
                stable = false,
                "Remediation did not stabilize the system"
            );
        }
    }

    pub fn log_notification(&self, result: &NotificationResult) {
        if result.is_sent() {
            info!(
                event = "notification",
                agent = %self.agent,
                status = %result.status,
                detail = %result.detail,
                "Notification delivered"
            );
        } else {
            error!(
                event = "notification",
                agent = %self.agent,
                status = %result.status,
                detail = %result.detail,
                "Notification failed"
            );
        }
    }

    pub fn log_history_append(&self, path: impl Display, entries: usize) {
        info!(
            event = "history_appended",
            agent = %self.agent,
            path = %path,
            entries = entries,
            "Saved notification to history"
        );
    }

    pub fn log_history_error(&self, path: impl Display, err: impl Display) {
        error!(
            event = "history_write_failed",
            agent = %self.agent,
            path = %path,
            error = %err,
            "Failed to save notification to history"
        );
    }

    pub fn log_summary(&self, summary: &str) {
        info!(
            event = "summary",
            agent = %self.agent,
            summary = %summary,
            "Cycle summary"
        );
    }

    pub fn log_cycle_result(&self, cycle: u64, result: &CycleResult) {
        let rendered = serde_json::to_string(result).unwrap_or_else(|e| e.to_string());
        info!(
            event = "cycle_completed",
            agent = %self.agent,
            cycle = cycle,
            healthy = result.is_healthy(),
            result = %rendered,
            "Agent cycle result"
        );
    }

    pub fn log_cycle_failure(&self, cycle: u64, err: impl Display) {
        error!(
            event = "cycle_failed",
            agent = %self.agent,
            cycle = cycle,
            error = %err,
            "Cycle aborted by internal failure, retrying next cycle"
        );
    }

    pub fn log_startup(&self, version: &str, interval_secs: u64) {
        info!(
            event = "agent_started",
            agent = %self.agent,
            agent_version = %version,
            interval_secs = interval_secs,
            "Remediation agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            agent = %self.agent,
            reason = %reason,
            "Remediation agent shutting down"
        );
    }
}
