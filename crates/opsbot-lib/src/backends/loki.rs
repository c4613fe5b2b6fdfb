//! Loki-compatible log query client

use super::{check_status, endpoint, http_client, parse_base_url, BackendError, LogBackend};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default stream selector and line filter for error-level entries
pub const DEFAULT_ERROR_SELECTOR: &str = r#"{job="varlogs"} |= "ERROR""#;

/// Default maximum number of lines per query
pub const DEFAULT_LINE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct LokiResponse {
    pub data: LokiData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LokiData {
    #[serde(default)]
    pub result: Vec<LokiStream>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LokiStream {
    /// `[timestamp, line]` pairs; the timestamp form varies by backend
    #[serde(default)]
    pub values: Vec<(serde_json::Value, String)>,
}

impl LokiResponse {
    /// All lines across all streams, in response order
    pub fn lines(self) -> Vec<String> {
        self.data
            .result
            .into_iter()
            .flat_map(|stream| stream.values.into_iter().map(|(_, line)| line))
            .collect()
    }
}

/// Client for `/loki/api/v1/query_range`
pub struct LokiClient {
    client: reqwest::Client,
    base_url: Url,
    selector: String,
    limit: u32,
}

impl LokiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: parse_base_url(base_url)?,
            selector: DEFAULT_ERROR_SELECTOR.to_string(),
            limit: DEFAULT_LINE_LIMIT,
        })
    }

    /// Override the LogQL selector used to find error entries
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl LogBackend for LokiClient {
    async fn error_lines(&self, start: i64, end: i64) -> Result<Vec<String>, BackendError> {
        let url = endpoint(&self.base_url, "loki/api/v1/query_range")?;
        debug!(url = %url, selector = %self.selector, start, end, "Querying log backend");

        let params = [
            ("query", self.selector.clone()),
            ("start", start.to_string()),
            ("end", end.to_string()),
            ("limit", self.limit.to_string()),
        ];
        let response = self.client.get(url).query(&params).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<LokiResponse>().await?.lines())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_lines_flattened_across_streams() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/loki/api/v1/query_range")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), DEFAULT_ERROR_SELECTOR.into()),
                Matcher::UrlEncoded("start".into(), "700".into()),
                Matcher::UrlEncoded("end".into(), "1300".into()),
                Matcher::UrlEncoded("limit".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"status":"success","data":{"resultType":"streams","result":[
                    {"stream":{"job":"varlogs"},"values":[["1700000000000000000","OutOfMemory in app"]]},
                    {"stream":{"job":"varlogs"},"values":[["1700000001000000000","Infinite loop detected in app"]]}
                ]}}"#,
            )
            .create_async()
            .await;

        let client = LokiClient::new(&server.url(), Duration::from_secs(2)).unwrap();
        let lines = client.error_lines(700, 1300).await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            lines,
            vec!["OutOfMemory in app", "Infinite loop detected in app"]
        );
    }

    #[tokio::test]
    async fn test_empty_result_is_no_logs() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/loki/api/v1/query_range")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":{"result":[]}}"#)
            .create_async()
            .await;

        let client = LokiClient::new(&server.url(), Duration::from_secs(2)).unwrap();
        assert!(client.error_lines(0, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_selector_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/loki/api/v1/query_range")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                r#"{app="api"} |= "panic""#.into(),
            ))
            .with_status(200)
            .with_body(r#"{"data":{"result":[]}}"#)
            .create_async()
            .await;

        let client = LokiClient::new(&server.url(), Duration::from_secs(2))
            .unwrap()
            .with_selector(r#"{app="api"} |= "panic""#);
        client.error_lines(0, 1).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_gateway_is_status_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/loki/api/v1/query_range")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let client = LokiClient::new(&server.url(), Duration::from_secs(2)).unwrap();
        let err = client.error_lines(0, 1).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 502, .. }));
    }
}
