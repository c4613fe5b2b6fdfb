//! Automated remediation for diagnosed failures
//!
//! The remediator only acts on actionable diagnoses whose logs carry a known
//! failure signature. The corrective action runs at most once per cycle and a
//! failed run is reported, never retried.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::models::{DiagnosisReport, RemediationOutcome};
use crate::observability::{AgentMetrics, StructuredLogger};

/// Log substrings that justify restarting the service
pub const FAILURE_SIGNATURES: &[&str] = &["OutOfMemory", "Infinite loop"];

/// Upper bound on how long a restart may take
const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Exit status and captured stderr of a corrective action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutput {
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ActionOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// External corrective action
#[async_trait]
pub trait RemediationAction: Send + Sync {
    /// What the action acts on, e.g. `app container`
    fn target(&self) -> &str;

    /// Run the action once
    async fn execute(&self) -> Result<ActionOutput>;
}

/// Restarts a container through the container runtime CLI
pub struct ContainerRestart {
    runtime: String,
    container: String,
    target: String,
    timeout: Duration,
}

impl ContainerRestart {
    pub fn new(runtime: impl Into<String>, container: impl Into<String>) -> Self {
        let container = container.into();
        Self {
            runtime: runtime.into(),
            target: format!("{container} container"),
            container,
            timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RemediationAction for ContainerRestart {
    fn target(&self) -> &str {
        &self.target
    }

    async fn execute(&self) -> Result<ActionOutput> {
        debug!(runtime = %self.runtime, container = %self.container, "Restarting container");

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.runtime)
                .arg("restart")
                .arg(&self.container)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .with_context(|| format!("{} restart timed out after {:?}", self.runtime, self.timeout))?
        .with_context(|| format!("failed to run {}", self.runtime))?;

        Ok(ActionOutput {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Does `logs` contain a signature the remediator knows how to fix
pub fn matches_failure_signature(logs: &str) -> bool {
    FAILURE_SIGNATURES.iter().any(|sig| logs.contains(sig))
}

pub struct Remediator {
    action: Arc<dyn RemediationAction>,
    logger: StructuredLogger,
    metrics: AgentMetrics,
}

impl Remediator {
    pub fn new(action: Arc<dyn RemediationAction>, logger: StructuredLogger) -> Self {
        Self {
            action,
            logger,
            metrics: AgentMetrics::new(),
        }
    }

    pub async fn remediate(&self, diagnosis: &DiagnosisReport) -> RemediationOutcome {
        if !diagnosis.actionable || !matches_failure_signature(&diagnosis.logs) {
            self.logger.log_remediation_skipped(diagnosis.actionable);
            self.metrics.inc_remediation("skipped");
            return RemediationOutcome::no_action();
        }

        let target = self.action.target();
        let outcome = match self.action.execute().await {
            Ok(output) if output.succeeded() => RemediationOutcome {
                action: format!("Restarted {target}"),
                stable: true,
            },
            Ok(output) => RemediationOutcome {
                action: format!("Failed to restart {target}: {}", output.stderr),
                stable: false,
            },
            Err(e) => RemediationOutcome {
                action: format!("Remediation failed: {e:#}"),
                stable: false,
            },
        };

        self.metrics
            .inc_remediation(if outcome.stable { "restarted" } else { "failed" });
        self.logger.log_remediation(&outcome);
        outcome
    }
}
