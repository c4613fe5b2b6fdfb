//! Optional natural-language recap of an incident

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backends::DEFAULT_REQUEST_TIMEOUT;
use crate::models::{AnomalyReport, DiagnosisReport, RemediationOutcome};

/// Summary recorded when no summarizer is wired in
pub const NO_SUMMARY: &str = "No summary available";

pub const DEFAULT_SUMMARIZER_MODEL: &str = "llama2";

/// Prompt-in, text-out language model
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Whether the summarizer can be called at all
    fn is_configured(&self) -> bool {
        true
    }

    async fn summarize(&self, prompt: &str) -> Result<String>;
}

/// Placeholder summary for a failed summarizer call
pub fn unavailable(err: &anyhow::Error) -> String {
    format!("Summary unavailable: {err:#}")
}

/// Build the summarizer prompt for one incident
pub fn build_prompt(
    anomaly: &AnomalyReport,
    diagnosis: &DiagnosisReport,
    remediation: &RemediationOutcome,
) -> String {
    let anomaly_json = serde_json::to_string(anomaly).unwrap_or_else(|e| e.to_string());
    let logs = if diagnosis.logs.is_empty() {
        "No logs available"
    } else {
        diagnosis.logs.as_str()
    };

    format!(
        "You are a DevOps assistant. Given the following information, identify possible \
         causes for the detected anomaly and suggest remediation steps. Include analysis of \
         memory usage patterns if available.\n\n\
         Anomaly: {anomaly_json}\n\
         Logs: {logs}\n\
         Analysis: {}\n\
         Remediation: {}\n\n\
         If CPU usage is above 80%, recommend restarting the app container and investigating \
         the code for inefficiencies or memory leaks. If memory usage is increasing over time, \
         suggest setting container resource limits. If no logs are available, suggest checking \
         the log shipping configuration.",
        diagnosis.analysis, remediation.action
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-compatible `/api/generate` endpoint
pub struct OllamaSummarizer {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
}

impl OllamaSummarizer {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, model, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base = Url::parse(base_url).context("Invalid summarizer URL")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("api/generate").context("Invalid summarizer URL")?;

        Ok(Self {
            client,
            endpoint,
            model: model.into(),
        })
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .context("Failed to reach summarizer")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("summarizer error ({}): {}", status, body);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse summarizer response")?;
        Ok(body.response.trim().to_string())
    }
}
