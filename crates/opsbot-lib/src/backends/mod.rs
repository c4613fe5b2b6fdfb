//! Clients for the external time-series and log query services
//!
//! The sampler and analyzer only see the [`MetricsBackend`] and
//! [`LogBackend`] traits. Production wiring uses the Prometheus-compatible
//! and Loki-compatible HTTP clients in this module.

mod loki;
mod prom;

pub use loki::{LokiClient, LokiResponse, DEFAULT_ERROR_SELECTOR, DEFAULT_LINE_LIMIT};
pub use prom::{PrometheusClient, PrometheusResponse};

use crate::models::Sample;
use crate::retry::Transient;
use std::time::Duration;
use thiserror::Error;

pub use async_trait::async_trait;

/// Default per-request timeout for backend calls
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure talking to a backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection, DNS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Request could not be built from configuration
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Transient for BackendError {
    /// Network failures, throttling and server-side errors may clear up;
    /// a response we cannot parse or a request we cannot build will not
    fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Status { status, .. } => *status >= 500 || *status == 429,
            BackendError::Malformed(_) | BackendError::InvalidRequest(_) => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Malformed(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

/// Time-series query service
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Evaluate `query` at the current instant
    ///
    /// Returns `Ok(None)` when the query matched no series.
    async fn instant(&self, query: &str) -> Result<Option<Sample>, BackendError>;

    /// Evaluate `query` over `[start, end]` at the given resolution
    ///
    /// Returns the first matching series, or an empty vector for no data.
    async fn range(
        &self,
        query: &str,
        start: i64,
        end: i64,
        step: Duration,
    ) -> Result<Vec<Sample>, BackendError>;
}

/// Log query service
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Fetch error-level lines logged within `[start, end]` (epoch seconds)
    async fn error_lines(&self, start: i64, end: i64) -> Result<Vec<String>, BackendError>;
}

/// Build the shared HTTP client used by backend clients
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::InvalidRequest(format!("failed to create HTTP client: {e}")))
}

/// Turn a non-success response into a [`BackendError::Status`]
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status { status, body })
}

/// Join an API path onto a configured base URL, keeping any base path prefix
pub(crate) fn endpoint(base: &url::Url, path: &str) -> Result<url::Url, BackendError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| BackendError::InvalidRequest(format!("invalid endpoint {path}: {e}")))
}

/// Parse a configured base URL
pub(crate) fn parse_base_url(raw: &str) -> Result<url::Url, BackendError> {
    url::Url::parse(raw).map_err(|e| BackendError::InvalidRequest(format!("invalid URL {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_prefix() {
        let base = parse_base_url("http://monitor:9090/prometheus").unwrap();
        let url = endpoint(&base, "/api/v1/query").unwrap();
        assert_eq!(url.as_str(), "http://monitor:9090/prometheus/api/v1/query");
    }

    #[test]
    fn test_endpoint_on_bare_host() {
        let base = parse_base_url("http://localhost:3100").unwrap();
        let url = endpoint(&base, "loki/api/v1/query_range").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3100/loki/api/v1/query_range");
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Transport("timed out".into()).is_transient());
        assert!(BackendError::Status { status: 502, body: String::new() }.is_transient());
        assert!(BackendError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!BackendError::Status { status: 400, body: String::new() }.is_transient());
        assert!(!BackendError::Malformed("no data".into()).is_transient());
        assert!(!BackendError::InvalidRequest("bad url".into()).is_transient());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(BackendError::InvalidRequest(_))
        ));
    }
}
