//! The agent control loop
//!
//! One cycle walks `idle → sampling → (healthy | analyzing → remediating →
//! notifying → summarizing) → idle`. A cycle always ends with a
//! [`CycleResult`]; component failures are folded into their fallback
//! values, and a panic inside a cycle is caught by the loop and treated
//! like any other failed cycle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::analyzer::Analyzer;
use crate::health::{components, HealthRegistry};
use crate::models::{CycleResult, IncidentReport};
use crate::notifier::Notifier;
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::remediator::Remediator;
use crate::sampler::Sampler;
use crate::summarizer::{self, Summarizer, NO_SUMMARY};


pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(30);

/// State machine stages, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    Sampling,
    Healthy,
    Analyzing,
    Remediating,
    Notifying,
    Summarizing,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::Idle => "idle",
            CycleStage::Sampling => "sampling",
            CycleStage::Healthy => "healthy",
            CycleStage::Analyzing => "analyzing",
            CycleStage::Remediating => "remediating",
            CycleStage::Notifying => "notifying",
            CycleStage::Summarizing => "summarizing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Sleep between the end of one cycle and the start of the next
    pub interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CYCLE_INTERVAL,
        }
    }
}

pub struct Orchestrator {
    sampler: Sampler,
    analyzer: Analyzer,
    remediator: Remediator,
    notifier: Notifier,
    summarizer: Option<Arc<dyn Summarizer>>,
    config: OrchestratorConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: AgentMetrics,
    cycles: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        sampler: Sampler,
        analyzer: Analyzer,
        remediator: Remediator,
        notifier: Notifier,
        config: OrchestratorConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            sampler,
            analyzer,
            remediator,
            notifier,
            summarizer: None,
            config,
            health,
            logger,
            metrics: AgentMetrics::new(),
            cycles: AtomicU64::new(0),
        }
    }

    /// Attach a summarizer for incident recaps
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Number of cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Run cycles until a shutdown signal arrives
    ///
    /// Each cycle runs on its own task so a panic is reported as a failed
    /// cycle instead of taking the loop down. A signal during a cycle
    /// abandons it; a signal during the sleep ends the wait early.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        self.health.set_ready(true).await;
        self.logger
            .log_startup(env!("CARGO_PKG_VERSION"), self.config.interval.as_secs());

        loop {
            let worker = Arc::clone(&self);
            let mut cycle = tokio::spawn(async move { worker.run_cycle().await });

            tokio::select! {
                joined = &mut cycle => {
                    if let Err(e) = joined {
                        self.metrics.inc_cycle_failures();
                        self.logger.log_cycle_failure(self.cycles(), &e);
                    }
                }
                _ = shutdown.recv() => {
                    cycle.abort();
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.recv() => break,
            }
        }

        self.health.set_ready(false).await;
        self.logger.log_shutdown("shutdown signal received");
    }

    /// Run one full cycle and return its terminal result
    pub async fn run_cycle(&self) -> CycleResult {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let result = self.execute(cycle).await;

        self.metrics
            .observe_cycle_duration(started.elapsed().as_secs_f64());
        if result.is_healthy() {
            self.metrics.inc_healthy_cycles();
        }
        self.health.record_cycle(chrono::Utc::now().timestamp()).await;
        self.logger.log_cycle_result(cycle, &result);
        self.logger.log_stage(cycle, CycleStage::Idle);
        result
    }

    async fn execute(&self, cycle: u64) -> CycleResult {
        self.logger.log_stage(cycle, CycleStage::Sampling);
        let anomaly = match self.sampler.sample().await {
            Ok(report) => {
                self.health.set_healthy(components::METRICS_BACKEND).await;
                report
            }
            Err(e) => {
                self.logger.log_sample_unavailable(&e);
                self.health
                    .set_degraded(components::METRICS_BACKEND, e.to_string())
                    .await;
                self.logger.log_stage(cycle, CycleStage::Healthy);
                return CycleResult::Healthy { anomaly: None };
            }
        };

        if !anomaly.anomaly_detected {
            self.logger.log_stage(cycle, CycleStage::Healthy);
            return CycleResult::Healthy {
                anomaly: Some(anomaly),
            };
        }
        self.logger.log_anomaly(&anomaly, self.sampler.threshold());

        self.logger.log_stage(cycle, CycleStage::Analyzing);
        let diagnosis = self
            .analyzer
            .diagnose(anomaly.timestamp, anomaly.memory_usage)
            .await;
        if diagnosis.log_backend_reachable {
            self.health.set_healthy(components::LOG_BACKEND).await;
        } else {
            self.health
                .set_degraded(components::LOG_BACKEND, diagnosis.report.analysis.clone())
                .await;
        }
        let diagnosis = diagnosis.report;

        self.logger.log_stage(cycle, CycleStage::Remediating);
        let remediation = self.remediator.remediate(&diagnosis).await;

        self.logger.log_stage(cycle, CycleStage::Notifying);
        let dispatch = self
            .notifier
            .dispatch(&anomaly, &diagnosis, &remediation)
            .await;
        if dispatch.result.is_sent() {
            self.health.set_healthy(components::NOTIFIER).await;
        } else {
            self.health
                .set_degraded(components::NOTIFIER, dispatch.result.detail.clone())
                .await;
        }
        match dispatch.history_written {
            Some(true) => self.health.set_healthy(components::HISTORY).await,
            Some(false) => {
                self.health
                    .set_unhealthy(components::HISTORY, "Failed to write notification history")
                    .await
            }
            None => {}
        }

        let summary = match self.summarizer.as_ref().filter(|s| s.is_configured()) {
            Some(summarizer) => {
                self.logger.log_stage(cycle, CycleStage::Summarizing);
                let prompt = summarizer::build_prompt(&anomaly, &diagnosis, &remediation);
                match summarizer.summarize(&prompt).await {
                    Ok(summary) => summary,
                    Err(e) => summarizer::unavailable(&e),
                }
            }
            None => NO_SUMMARY.to_string(),
        };
        self.logger.log_summary(&summary);

        CycleResult::Incident(Box::new(IncidentReport {
            anomaly,
            diagnosis,
            remediation,
            notification: dispatch.result,
            summary,
        }))
    }
}
