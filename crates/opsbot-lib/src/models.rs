//! Core data models for the remediation agent

use serde::{Deserialize, Serialize};

/// Default utilization threshold (percent) above which a sample is anomalous
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 80.0;

/// A single point read from the metrics backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

/// Point-in-time utilization reading produced once per cycle by the sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomaly_detected: bool,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub timestamp: i64,
}

impl AnomalyReport {
    /// Build a report, deriving `anomaly_detected` from the threshold
    pub fn classify(cpu_usage: f64, memory_usage: f64, timestamp: i64, threshold: f64) -> Self {
        Self {
            anomaly_detected: cpu_usage > threshold || memory_usage > threshold,
            cpu_usage,
            memory_usage,
            timestamp,
        }
    }
}

/// Diagnosis built from recent error logs and the memory trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisReport {
    /// Retrieved error log lines joined by newlines (empty when none)
    pub logs: String,
    pub analysis: String,
    /// True only when at least one log line corroborates the anomaly
    pub actionable: bool,
}

impl DiagnosisReport {
    pub fn not_actionable(analysis: impl Into<String>) -> Self {
        Self {
            logs: String::new(),
            analysis: analysis.into(),
            actionable: false,
        }
    }
}

/// What the remediator did, or why it did nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub action: String,
    /// True only when the corrective action exited with status 0
    pub stable: bool,
}

impl RemediationOutcome {
    pub const NO_ACTION: &'static str = "No action taken";

    pub fn no_action() -> Self {
        Self {
            action: Self::NO_ACTION.to_string(),
            stable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of delivering one cycle's message to the chat endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub status: NotificationStatus,
    pub detail: String,
}

impl NotificationResult {
    pub fn sent(detail: impl Into<String>) -> Self {
        Self {
            status: NotificationStatus::Sent,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: NotificationStatus::Failed,
            detail: detail.into(),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == NotificationStatus::Sent
    }
}

/// Persisted record of one notified cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub cpu_usage: f64,
    pub analysis: String,
    pub logs: String,
    pub remediation: String,
}

impl HistoryEntry {
    pub fn from_cycle(
        anomaly: &AnomalyReport,
        diagnosis: &DiagnosisReport,
        remediation: &RemediationOutcome,
    ) -> Self {
        Self {
            timestamp: anomaly.timestamp,
            cpu_usage: anomaly.cpu_usage,
            analysis: diagnosis.analysis.clone(),
            logs: diagnosis.logs.clone(),
            remediation: remediation.action.clone(),
        }
    }
}

/// Everything a cycle produced once an anomaly was found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub anomaly: AnomalyReport,
    pub diagnosis: DiagnosisReport,
    pub remediation: RemediationOutcome,
    pub notification: NotificationResult,
    pub summary: String,
}

/// Terminal result of one orchestrator cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleResult {
    Healthy {
        #[serde(skip_serializing_if = "Option::is_none")]
        anomaly: Option<AnomalyReport>,
    },
    Incident(Box<IncidentReport>),
}

impl CycleResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, CycleResult::Healthy { .. })
    }

    pub fn incident(&self) -> Option<&IncidentReport> {
        match self {
            CycleResult::Incident(report) => Some(report),
            CycleResult::Healthy { .. } => None,
        }
    }
}
