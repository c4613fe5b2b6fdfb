//! Host utilization sampling and anomaly classification

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::backends::{BackendError, MetricsBackend};
use crate::models::{AnomalyReport, Sample, DEFAULT_ANOMALY_THRESHOLD};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::retry::RetryPolicy;

/// Host CPU busy percentage
pub const CPU_BUSY_QUERY: &str =
    r#"100 - (avg by(instance) (rate(node_cpu_seconds_total{mode="idle"}[1m])) * 100)"#;

/// Host memory used percentage
pub const MEMORY_USED_QUERY: &str =
    "100 * (1 - (node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes))";

/// Pause before sampling so a fresh spike reaches the backend's scrape interval
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub threshold: f64,
    pub settle_delay: Duration,
    pub retry: RetryPolicy,
    pub cpu_query: String,
    pub memory_query: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ANOMALY_THRESHOLD,
            settle_delay: DEFAULT_SETTLE_DELAY,
            retry: RetryPolicy::default(),
            cpu_query: CPU_BUSY_QUERY.to_string(),
            memory_query: MEMORY_USED_QUERY.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SampleError {
    /// Every attempt for one of the queries failed
    #[error("metrics backend unavailable for {query}: {source}")]
    Unavailable {
        query: &'static str,
        #[source]
        source: BackendError,
    },
}

/// Reads current CPU and memory utilization and flags threshold breaches
pub struct Sampler {
    backend: Arc<dyn MetricsBackend>,
    config: SamplerConfig,
    logger: StructuredLogger,
    metrics: AgentMetrics,
}

impl Sampler {
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        config: SamplerConfig,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            backend,
            config,
            logger,
            metrics: AgentMetrics::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Take one utilization reading
    ///
    /// An empty result set or a non-finite value reads as 0% (no data).
    /// The report is stamped with the CPU sample's time, or now when the
    /// CPU query had no data.
    pub async fn sample(&self) -> Result<AnomalyReport, SampleError> {
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let cpu = self
            .query("cpu_usage", &self.config.cpu_query)
            .await?
            .filter(|s| s.value.is_finite());
        let memory = self
            .query("memory_usage", &self.config.memory_query)
            .await?
            .filter(|s| s.value.is_finite());

        let timestamp = cpu
            .map(|s| s.timestamp)
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        let report = AnomalyReport::classify(
            cpu.map(|s| s.value).unwrap_or(0.0),
            memory.map(|s| s.value).unwrap_or(0.0),
            timestamp,
            self.config.threshold,
        );

        self.logger.log_sample(&report);
        self.metrics.record_sample(&report);
        Ok(report)
    }

    async fn query(&self, label: &'static str, query: &str) -> Result<Option<Sample>, SampleError> {
        let backend = &self.backend;
        self.config
            .retry
            .run(label, move || backend.instant(query))
            .await
            .map_err(|source| SampleError::Unavailable {
                query: label,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers the CPU and memory queries with fixed values
    struct FixedBackend {
        cpu: Option<f64>,
        memory: Option<f64>,
        failures_before_success: usize,
        calls: AtomicUsize,
    }

    impl FixedBackend {
        fn new(cpu: Option<f64>, memory: Option<f64>) -> Self {
            Self {
                cpu,
                memory,
                failures_before_success: 0,
                calls: AtomicUsize::new(0),
            }
        }

        fn flaky(mut self, failures: usize) -> Self {
            self.failures_before_success = failures;
            self
        }
    }

    #[async_trait]
    impl MetricsBackend for FixedBackend {
        async fn instant(&self, query: &str) -> Result<Option<Sample>, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(BackendError::Transport("connection refused".into()));
            }
            let value = if query == CPU_BUSY_QUERY { self.cpu } else { self.memory };
            Ok(value.map(|value| Sample {
                timestamp: 1_700_000_000,
                value,
            }))
        }

        async fn range(
            &self,
            _query: &str,
            _start: i64,
            _end: i64,
            _step: Duration,
        ) -> Result<Vec<Sample>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn fast_config() -> SamplerConfig {
        SamplerConfig {
            settle_delay: Duration::ZERO,
            retry: RetryPolicy::new(3, Duration::ZERO),
            ..Default::default()
        }
    }

    fn sampler(backend: Arc<FixedBackend>) -> Sampler {
        Sampler::new(backend, fast_config(), StructuredLogger::new("test"))
    }

    #[tokio::test]
    async fn test_anomaly_iff_either_metric_exceeds_threshold() {
        let cases = [
            (45.0, 30.0, false),
            (92.0, 40.0, true),
            (40.0, 92.0, true),
            (80.0, 80.0, false),
            (91.0, 91.0, true),
        ];

        for (cpu, memory, expected) in cases {
            let backend = Arc::new(FixedBackend::new(Some(cpu), Some(memory)));
            let report = sampler(backend).sample().await.unwrap();
            assert_eq!(report.anomaly_detected, expected, "cpu={cpu} memory={memory}");
            assert_eq!(report.cpu_usage, cpu);
            assert_eq!(report.memory_usage, memory);
            assert_eq!(report.timestamp, 1_700_000_000);
        }
    }

    #[tokio::test]
    async fn test_empty_results_read_as_zero() {
        let backend = Arc::new(FixedBackend::new(None, None));
        let report = sampler(backend).sample().await.unwrap();

        assert!(!report.anomaly_detected);
        assert_eq!(report.cpu_usage, 0.0);
        assert_eq!(report.memory_usage, 0.0);
        assert!(report.timestamp > 0);
    }

    #[tokio::test]
    async fn test_non_finite_reading_is_no_data() {
        let backend = Arc::new(FixedBackend::new(Some(f64::NAN), Some(91.0)));
        let report = sampler(backend).sample().await.unwrap();

        assert!(report.anomaly_detected);
        assert_eq!(report.cpu_usage, 0.0);
        assert_eq!(report.memory_usage, 91.0);
        assert!(report.timestamp > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_precedes_queries() {
        let backend = Arc::new(FixedBackend::new(Some(10.0), Some(10.0)));
        let config = SamplerConfig {
            retry: RetryPolicy::new(3, Duration::ZERO),
            ..Default::default()
        };
        let sampler = Sampler::new(backend.clone(), config, StructuredLogger::new("test"));

        let start = tokio::time::Instant::now();
        sampler.sample().await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= DEFAULT_SETTLE_DELAY);
        assert!(elapsed < DEFAULT_SETTLE_DELAY + Duration::from_secs(1));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(FixedBackend::new(Some(95.0), Some(10.0)).flaky(2));
        let report = sampler(backend.clone()).sample().await.unwrap();

        assert!(report.anomaly_detected);
        // two failures + cpu success + memory success
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhausted_retries_make_sample_unavailable() {
        let backend = Arc::new(FixedBackend::new(Some(95.0), Some(10.0)).flaky(usize::MAX));
        let err = sampler(backend.clone()).sample().await.unwrap_err();

        assert!(matches!(err, SampleError::Unavailable { query: "cpu_usage", .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_custom_threshold() {
        let backend = Arc::new(FixedBackend::new(Some(65.0), Some(10.0)));
        let config = SamplerConfig {
            threshold: 60.0,
            ..fast_config()
        };
        let sampler = Sampler::new(backend, config, StructuredLogger::new("test"));

        assert!(sampler.sample().await.unwrap().anomaly_detected);
    }
}
