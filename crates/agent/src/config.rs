//! Agent configuration

use std::time::Duration;

use anyhow::{Context, Result};
use opsbot_lib::analyzer::AnalyzerConfig;
use opsbot_lib::backends::DEFAULT_ERROR_SELECTOR;
use opsbot_lib::notifier::NotifierConfig;
use opsbot_lib::sampler::SamplerConfig;
use opsbot_lib::{OrchestratorConfig, RetryPolicy};
use serde::Deserialize;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "OPSBOT_CONFIG";

/// Webhook variable honoured when `chat_webhook_url` is unset
pub const WEBHOOK_FALLBACK_ENV: &str = "SLACK_WEBHOOK_URL";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Identity attached to every log event
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Prometheus-compatible query API
    #[serde(default = "default_metrics_url")]
    pub metrics_url: String,

    /// Loki-compatible query API
    #[serde(default = "default_logs_url")]
    pub logs_url: String,

    #[serde(default = "default_log_selector")]
    pub log_selector: String,

    #[serde(default = "default_log_limit")]
    pub log_limit: u32,

    /// Chat webhook; unset disables delivery
    #[serde(default)]
    pub chat_webhook_url: Option<String>,

    #[serde(default = "default_chat_username")]
    pub chat_username: String,

    #[serde(default = "default_chat_icon")]
    pub chat_icon: String,

    /// Ollama-compatible endpoint; unset disables summaries
    #[serde(default)]
    pub summarizer_url: Option<String>,

    #[serde(default = "default_summarizer_model")]
    pub summarizer_model: String,

    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_history_path")]
    pub history_path: String,

    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,

    /// Container restarted on a matching failure signature
    #[serde(default = "default_restart_container")]
    pub restart_container: String,
}

fn default_agent_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "opsbot".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_metrics_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_logs_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_log_selector() -> String {
    DEFAULT_ERROR_SELECTOR.to_string()
}

fn default_log_limit() -> u32 {
    100
}

fn default_chat_username() -> String {
    "OpsBot".to_string()
}

fn default_chat_icon() -> String {
    ":robot_face:".to_string()
}

fn default_summarizer_model() -> String {
    opsbot_lib::summarizer::DEFAULT_SUMMARIZER_MODEL.to_string()
}

fn default_cycle_interval() -> u64 {
    30
}

fn default_settle_delay() -> u64 {
    10
}

fn default_anomaly_threshold() -> f64 {
    opsbot_lib::DEFAULT_ANOMALY_THRESHOLD
}

fn default_request_timeout() -> u64 {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2
}

fn default_history_path() -> String {
    opsbot_lib::history::DEFAULT_HISTORY_PATH.to_string()
}

fn default_container_runtime() -> String {
    "docker".to_string()
}

fn default_restart_container() -> String {
    "app".to_string()
}

impl AgentConfig {
    /// Load configuration from the process environment and optional config file
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        let mut config = Self::from_sources(file.as_deref(), None)?;
        if config.chat_webhook_url.is_none() {
            config.chat_webhook_url = std::env::var(WEBHOOK_FALLBACK_ENV).ok();
        }
        config.validate()?;
        Ok(config)
    }

    /// Build from an optional file plus `OPSBOT_*` variables
    ///
    /// `env` replaces the process environment when given.
    pub fn from_sources(
        file: Option<&str>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("OPSBOT")
                .try_parsing(true)
                .source(env),
        );

        let config = builder.build().context("Failed to load configuration")?;
        let config: Self = config
            .try_deserialize()
            .context("Invalid agent configuration")?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        self.chat_webhook_url = self.chat_webhook_url.filter(|url| !url.trim().is_empty());
        self.summarizer_url = self.summarizer_url.filter(|url| !url.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.anomaly_threshold.is_finite() || self.anomaly_threshold < 0.0 {
            anyhow::bail!(
                "anomaly_threshold must be a non-negative number, got {}",
                self.anomaly_threshold
            );
        }
        if self.retry_attempts == 0 {
            anyhow::bail!("retry_attempts must be at least 1");
        }
        if self.cycle_interval_secs == 0 {
            anyhow::bail!("cycle_interval_secs must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_secs(self.retry_delay_secs),
        )
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            threshold: self.anomaly_threshold,
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            retry: self.retry_policy(),
            ..Default::default()
        }
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            retry: self.retry_policy(),
            ..Default::default()
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            webhook_url: self.chat_webhook_url.clone(),
            username: self.chat_username.clone(),
            icon: self.chat_icon.clone(),
            timeout: self.request_timeout(),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            interval: Duration::from_secs(self.cycle_interval_secs),
        }
    }
}
