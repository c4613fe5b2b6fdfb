//! HTTP client for the agent's health endpoints

use anyhow::{Context, Result};
use opsbot_lib::health::{HealthResponse, ReadinessResponse};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// Client for a running `opsbot` agent
pub struct AgentClient {
    client: Client,
    base_url: Url,
}

/// A probe response; 503 bodies are still meaningful
#[derive(Debug)]
pub struct Probe<T> {
    pub status: StatusCode,
    pub body: T,
}

impl AgentClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid agent URL")?;

        Ok(Self { client, base_url })
    }

    /// GET a probe endpoint, accepting 200 and 503 as answers
    async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<Probe<T>> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach agent")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Agent error ({}): {}", status, body);
        }

        let body = response.json().await.context("Failed to parse response")?;
        Ok(Probe { status, body })
    }

    pub async fn health(&self) -> Result<Probe<HealthResponse>> {
        self.probe("healthz").await
    }

    pub async fn readiness(&self) -> Result<Probe<ReadinessResponse>> {
        self.probe("readyz").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsbot_lib::ComponentStatus;

    #[tokio::test]
    async fn test_unhealthy_body_is_still_parsed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"unhealthy","components":{"history":{"status":"unhealthy","message":"disk full","last_check_timestamp":1}}}"#,
            )
            .create_async()
            .await;

        let client = AgentClient::new(&server.url()).unwrap();
        let probe = client.health().await.unwrap();

        assert_eq!(probe.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(probe.body.status, ComponentStatus::Unhealthy);
        assert_eq!(
            probe.body.components["history"].message.as_deref(),
            Some("disk full")
        );
    }

    #[tokio::test]
    async fn test_unexpected_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let client = AgentClient::new(&server.url()).unwrap();
        let err = client.readiness().await.unwrap_err();

        assert!(err.to_string().contains("404"));
    }
}
