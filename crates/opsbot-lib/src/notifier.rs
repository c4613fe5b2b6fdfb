//! Chat notification for detected anomalies
//!
//! One message per anomalous cycle goes to the chat webhook. History is
//! appended only after the webhook confirms delivery, so a cycle is
//! recorded at most once and only when the operator was actually told.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backends::DEFAULT_REQUEST_TIMEOUT;
use crate::history::HistoryStore;
use crate::models::{
    AnomalyReport, DiagnosisReport, HistoryEntry, NotificationResult, RemediationOutcome,
};
use crate::observability::{AgentMetrics, StructuredLogger};

/// Webhook payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub username: String,
    pub icon_emoji: String,
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Incoming webhook URL; doubles as the endpoint credential
    pub webhook_url: Option<String>,
    pub username: String,
    pub icon: String,
    pub timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: "OpsBot".to_string(),
            icon: ":robot_face:".to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Reasons a cycle's reports cannot be turned into a message
fn incomplete_fields(
    anomaly: &AnomalyReport,
    diagnosis: &DiagnosisReport,
    remediation: &RemediationOutcome,
) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if anomaly.timestamp <= 0 {
        missing.push("anomaly.timestamp");
    }
    if diagnosis.analysis.trim().is_empty() {
        missing.push("diagnosis.analysis");
    }
    if remediation.action.trim().is_empty() {
        missing.push("remediation.action");
    }
    missing
}

/// Render the operator-facing message text
pub fn format_message(
    anomaly: &AnomalyReport,
    diagnosis: &DiagnosisReport,
    remediation: &RemediationOutcome,
) -> String {
    let logs = if diagnosis.logs.is_empty() {
        "No logs available"
    } else {
        diagnosis.logs.as_str()
    };
    format!(
        "*Anomaly Detected*\n\
         Details: {:.2}% CPU, {:.2}% memory usage at {}\n\
         *Analysis*\n{}\n\
         *Logs*\n{}\n\
         *Remediation*\n{}",
        anomaly.cpu_usage,
        anomaly.memory_usage,
        anomaly.timestamp,
        diagnosis.analysis,
        logs,
        remediation.action
    )
}

/// Outcome of one notification attempt
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub result: NotificationResult,
    /// `None` when delivery failed and history was not touched
    pub history_written: Option<bool>,
}

pub struct Notifier {
    client: reqwest::Client,
    config: NotifierConfig,
    history: HistoryStore,
    logger: StructuredLogger,
    metrics: AgentMetrics,
}

impl Notifier {
    pub fn new(
        config: NotifierConfig,
        history: HistoryStore,
        logger: StructuredLogger,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            config,
            history,
            logger,
            metrics: AgentMetrics::new(),
        })
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url().is_some()
    }

    fn webhook_url(&self) -> Option<&str> {
        self.config
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Deliver one message; on confirmed delivery also append to history
    pub async fn notify(
        &self,
        anomaly: &AnomalyReport,
        diagnosis: &DiagnosisReport,
        remediation: &RemediationOutcome,
    ) -> NotificationResult {
        self.dispatch(anomaly, diagnosis, remediation).await.result
    }

    /// Like [`Notifier::notify`], also reporting what happened to history
    pub async fn dispatch(
        &self,
        anomaly: &AnomalyReport,
        diagnosis: &DiagnosisReport,
        remediation: &RemediationOutcome,
    ) -> Dispatch {
        let result = self.deliver(anomaly, diagnosis, remediation).await;

        self.metrics.inc_notification(&result);
        self.logger.log_notification(&result);

        let history_written = if result.is_sent() {
            Some(self.record(anomaly, diagnosis, remediation).await)
        } else {
            None
        };
        Dispatch {
            result,
            history_written,
        }
    }

    /// Append this cycle to history; write failures are logged, not raised
    pub async fn record(
        &self,
        anomaly: &AnomalyReport,
        diagnosis: &DiagnosisReport,
        remediation: &RemediationOutcome,
    ) -> bool {
        let entry = HistoryEntry::from_cycle(anomaly, diagnosis, remediation);
        match self.history.append(entry).await {
            Ok(count) => {
                self.metrics.inc_history_entries();
                self.logger
                    .log_history_append(self.history.path().display(), count);
                true
            }
            Err(e) => {
                self.logger
                    .log_history_error(self.history.path().display(), format!("{e:#}"));
                false
            }
        }
    }

    async fn deliver(
        &self,
        anomaly: &AnomalyReport,
        diagnosis: &DiagnosisReport,
        remediation: &RemediationOutcome,
    ) -> NotificationResult {
        let missing = incomplete_fields(anomaly, diagnosis, remediation);
        if !missing.is_empty() {
            return NotificationResult::failed(format!(
                "Failed: incomplete report ({})",
                missing.join(", ")
            ));
        }

        let Some(url) = self.webhook_url() else {
            return NotificationResult::failed("Failed: chat webhook URL not configured");
        };

        let message = ChatMessage {
            text: format_message(anomaly, diagnosis, remediation),
            username: self.config.username.clone(),
            icon_emoji: self.config.icon.clone(),
        };
        debug!(bytes = message.text.len(), "Posting chat notification");

        let response = match self.client.post(url).json(&message).send().await {
            Ok(response) => response,
            Err(e) => return NotificationResult::failed(format!("Failed: {e}")),
        };

        let status = response.status();
        if status.is_success() {
            NotificationResult::sent("Sent to chat webhook")
        } else {
            let body = response.text().await.unwrap_or_default();
            NotificationResult::failed(format!("Failed: {} - {}", status.as_u16(), body))
        }
    }
}
