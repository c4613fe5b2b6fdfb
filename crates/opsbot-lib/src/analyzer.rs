//! Pattern analysis: correlates an anomaly with the memory trend and recent error logs
//!
//! The diagnosis is only actionable when the log backend returned at least
//! one error line for the window around the anomaly. The memory trend is
//! descriptive and never affects actionability.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backends::{LogBackend, MetricsBackend};
use crate::models::DiagnosisReport;
use crate::observability::StructuredLogger;
use crate::retry::RetryPolicy;

/// Host memory used percentage over time
pub const MEMORY_TREND_QUERY: &str =
    "100 - (avg by(instance) (node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes) * 100)";

/// Latest memory reading above which the diagnosis recommends limits
const MEMORY_ADVISORY_PERCENT: f64 = 20.0;

const CAUSE_HYPOTHESIS: &str =
    "Possible causes for high CPU usage include an OutOfMemory error or infinite loop.";

const REMEDIATION_SUGGESTION: &str = "Suggested remediation: Restart the app container and investigate the application code for memory leaks or infinite loops.";

const NO_MEMORY_DATA: &str = "No memory usage data available from the metrics backend.";

/// Direction of memory usage across the trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTrend {
    Increasing,
    StableOrDecreasing,
}

impl MemoryTrend {
    /// Compare the first and last sample; fewer than two samples is stable
    pub fn from_values(values: &[f64]) -> Self {
        match (values.first(), values.last()) {
            (Some(first), Some(last)) if values.len() > 1 && last > first => {
                MemoryTrend::Increasing
            }
            _ => MemoryTrend::StableOrDecreasing,
        }
    }
}

impl fmt::Display for MemoryTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryTrend::Increasing => write!(f, "increasing"),
            MemoryTrend::StableOrDecreasing => write!(f, "stable or decreasing"),
        }
    }
}

/// Describe a window of memory readings, or the no-data sentinel
pub fn describe_memory(values: &[f64], current_usage: f64) -> String {
    let Some(&latest) = values.last() else {
        return NO_MEMORY_DATA.to_string();
    };

    let average = values.iter().sum::<f64>() / values.len() as f64;
    let mut text = format!(
        "Memory usage over the last hour: avg {:.2}%, current {:.2}%, trend: {}.",
        average,
        current_usage,
        MemoryTrend::from_values(values)
    );
    if latest > MEMORY_ADVISORY_PERCENT {
        text.push_str(" High memory usage detected. Suggest setting Docker memory limits and investigating memory leaks.");
    }
    text
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Retry policy for the log query
    pub retry: RetryPolicy,
    /// Trailing window for the memory trend
    pub trend_window: Duration,
    pub trend_step: Duration,
    /// Log search extends this far either side of the anomaly
    pub log_window: Duration,
    pub memory_query: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            trend_window: Duration::from_secs(3600),
            trend_step: Duration::from_secs(60),
            log_window: Duration::from_secs(300),
            memory_query: MEMORY_TREND_QUERY.to_string(),
        }
    }
}

/// Diagnosis plus whether the log backend could be reached at all
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub report: DiagnosisReport,
    pub log_backend_reachable: bool,
}

pub struct Analyzer {
    metrics: Arc<dyn MetricsBackend>,
    logs: Arc<dyn LogBackend>,
    config: AnalyzerConfig,
    logger: StructuredLogger,
}

impl Analyzer {
    pub fn new(
        metrics: Arc<dyn MetricsBackend>,
        logs: Arc<dyn LogBackend>,
        config: AnalyzerConfig,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            metrics,
            logs,
            config,
            logger,
        }
    }

    pub async fn analyze(&self, timestamp: i64, memory_usage: f64) -> DiagnosisReport {
        self.diagnose(timestamp, memory_usage).await.report
    }

    pub async fn diagnose(&self, timestamp: i64, memory_usage: f64) -> Diagnosis {
        let window = self.config.log_window.as_secs() as i64;
        let (start, end) = (timestamp - window, timestamp + window);
        let logs = &self.logs;

        let lines = match self
            .config
            .retry
            .run("log_errors", move || logs.error_lines(start, end))
            .await
        {
            Ok(lines) => lines,
            Err(e) => {
                let report = DiagnosisReport::not_actionable(format!(
                    "Failed to query the log backend: {e}"
                ));
                self.logger.log_diagnosis(&report);
                return Diagnosis {
                    report,
                    log_backend_reachable: false,
                };
            }
        };

        let report = if lines.is_empty() {
            DiagnosisReport::not_actionable(
                "No recent error logs available; check the log shipping configuration.",
            )
        } else {
            let memory = self.memory_patterns(timestamp, memory_usage).await;
            DiagnosisReport {
                logs: lines.join("\n"),
                analysis: format!("{CAUSE_HYPOTHESIS} {memory} {REMEDIATION_SUGGESTION}"),
                actionable: true,
            }
        };

        self.logger.log_diagnosis(&report);
        Diagnosis {
            report,
            log_backend_reachable: true,
        }
    }

    async fn memory_patterns(&self, timestamp: i64, memory_usage: f64) -> String {
        let start = timestamp - self.config.trend_window.as_secs() as i64;
        match self
            .metrics
            .range(&self.config.memory_query, start, timestamp, self.config.trend_step)
            .await
        {
            Ok(samples) => {
                let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
                describe_memory(&values, memory_usage)
            }
            Err(e) => {
                self.logger.log_trend_unavailable(&e);
                format!("Memory trend unavailable: {e}.")
            }
        }
    }
}
