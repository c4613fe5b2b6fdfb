//! Prometheus-compatible HTTP query client

use super::{check_status, endpoint, http_client, parse_base_url, BackendError, MetricsBackend};
use crate::models::Sample;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Query API response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusResponse {
    pub data: PrometheusData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusData {
    #[serde(default)]
    pub result: Vec<PrometheusSeries>,
}

/// One series; instant queries fill `value`, range queries fill `values`
#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusSeries {
    #[serde(default)]
    pub value: Option<(f64, String)>,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

/// Parse one `[timestamp, "value"]` point
///
/// `NaN` and `±Inf` are valid PromQL results (e.g. a division by a zero
/// total) but carry no reading, so they come back as `None`.
fn to_sample((timestamp, raw): &(f64, String)) -> Result<Option<Sample>, BackendError> {
    let value = raw
        .parse::<f64>()
        .map_err(|_| BackendError::Malformed(format!("non-numeric sample value {raw:?}")))?;
    if !value.is_finite() {
        return Ok(None);
    }
    Ok(Some(Sample {
        timestamp: *timestamp as i64,
        value,
    }))
}

impl PrometheusResponse {
    /// First series' instant value, `None` when the result set is empty
    pub fn instant_sample(&self) -> Result<Option<Sample>, BackendError> {
        let Some(series) = self.data.result.first() else {
            return Ok(None);
        };
        let point = series
            .value
            .as_ref()
            .ok_or_else(|| BackendError::Malformed("instant result without value".to_string()))?;
        to_sample(point)
    }

    /// First series' finite samples, empty when the result set is empty
    pub fn range_samples(&self) -> Result<Vec<Sample>, BackendError> {
        let Some(series) = self.data.result.first() else {
            return Ok(Vec::new());
        };
        let mut samples = Vec::with_capacity(series.values.len());
        for point in &series.values {
            if let Some(sample) = to_sample(point)? {
                samples.push(sample);
            }
        }
        Ok(samples)
    }
}

/// Client for `/api/v1/query` and `/api/v1/query_range`
pub struct PrometheusClient {
    client: reqwest::Client,
    base_url: Url,
}

impl PrometheusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: parse_base_url(base_url)?,
        })
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<PrometheusResponse, BackendError> {
        let url = endpoint(&self.base_url, path)?;
        debug!(url = %url, "Querying metrics backend");

        let response = self.client.get(url).query(params).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<PrometheusResponse>().await?)
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn instant(&self, query: &str) -> Result<Option<Sample>, BackendError> {
        self.get("api/v1/query", &[("query", query.to_string())])
            .await?
            .instant_sample()
    }

    async fn range(
        &self,
        query: &str,
        start: i64,
        end: i64,
        step: Duration,
    ) -> Result<Vec<Sample>, BackendError> {
        let params = [
            ("query", query.to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
            ("step", format!("{}s", step.as_secs().max(1))),
        ];
        self.get("api/v1/query_range", &params).await?.range_samples()
    }
}
