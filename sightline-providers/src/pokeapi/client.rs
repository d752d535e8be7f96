//! PokeAPI HTTP data source

use super::types::{EntitySummary, PokemonResponse};
use crate::DataSource;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sightline_core::constants::{DATA_SOURCE_USER_AGENT, DEFAULT_DATA_SOURCE_BASE_URL};
use sightline_core::{DataSourceError, EnrichmentPayload, EntityId};
use std::time::Duration;

/// Enrichment source backed by a PokeAPI-compatible REST API.
///
/// Fetches `GET {base_url}/pokemon/{id}` and reduces the response to an
/// [`EntitySummary`]. Retries and breaking are layered on by the caller.
pub struct HttpEntitySource {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpEntitySource {
    /// Create a source against `base_url` with a per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, DataSourceError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(DATA_SOURCE_USER_AGENT)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| DataSourceError::Transient {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    /// Source against the public PokeAPI.
    pub fn public(request_timeout: Duration) -> Result<Self, DataSourceError> {
        Self::new(DEFAULT_DATA_SOURCE_BASE_URL, request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn entity_url(&self, entity_id: EntityId) -> String {
        format!("{}/pokemon/{}", self.base_url, entity_id)
    }

    async fn fetch_summary(&self, entity_id: EntityId) -> Result<EntitySummary, DataSourceError> {
        if entity_id <= 0 {
            return Err(DataSourceError::NotFound { entity_id });
        }

        let url = self.entity_url(entity_id);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DataSourceError::NotFound { entity_id });
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DataSourceError::RequestFailed {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let body: PokemonResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                DataSourceError::InvalidResponse {
                    reason: format!("Failed to parse response: {}", e),
                }
            }
        })?;

        Ok(EntitySummary::from(body))
    }

    fn transport_error(&self, e: reqwest::Error) -> DataSourceError {
        if e.is_timeout() {
            DataSourceError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            DataSourceError::Transient {
                reason: format!("HTTP request failed: {}", e),
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[async_trait]
impl DataSource for HttpEntitySource {
    async fn fetch(&self, entity_id: EntityId) -> Result<EnrichmentPayload, DataSourceError> {
        let summary = self.fetch_summary(entity_id).await?;
        let value = serde_json::to_value(&summary).map_err(|e| DataSourceError::InvalidResponse {
            reason: format!("Failed to encode summary: {}", e),
        })?;
        tracing::debug!(entity_id, name = %summary.name, "Fetched entity from data source");
        Ok(EnrichmentPayload::new(value))
    }

    fn source_id(&self) -> &str {
        "pokeapi"
    }
}

impl std::fmt::Debug for HttpEntitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEntitySource")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port and return the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_entity_url_trims_trailing_slash() {
        let source = HttpEntitySource::new("https://pokeapi.co/api/v2/", Duration::from_secs(5)).unwrap();
        assert_eq!(source.base_url(), "https://pokeapi.co/api/v2");
        assert_eq!(source.entity_url(25), "https://pokeapi.co/api/v2/pokemon/25");
    }

    #[tokio::test]
    async fn test_non_positive_id_is_not_found_without_request() {
        // Nothing listens here; a request would fail as Transient
        let source = HttpEntitySource::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert_eq!(
            source.fetch(0).await.unwrap_err(),
            DataSourceError::NotFound { entity_id: 0 }
        );
        assert_eq!(
            source.fetch(-3).await.unwrap_err(),
            DataSourceError::NotFound { entity_id: -3 }
        );
    }

    #[tokio::test]
    async fn test_404_maps_to_not_found() {
        let base = serve_once("404 Not Found", "Not Found").await;
        let source = HttpEntitySource::new(base, Duration::from_secs(5)).unwrap();
        let err = source.fetch(99999).await.unwrap_err();
        assert_eq!(err, DataSourceError::NotFound { entity_id: 99999 });
        assert!(!err.counts_as_failure());
    }

    #[tokio::test]
    async fn test_503_maps_to_request_failed() {
        let base = serve_once("503 Service Unavailable", "{\"detail\":\"down\"}").await;
        let source = HttpEntitySource::new(base, Duration::from_secs(5)).unwrap();
        let err = source.fetch(25).await.unwrap_err();
        assert!(matches!(err, DataSourceError::RequestFailed { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_success_yields_summary_payload() {
        let base = serve_once(
            "200 OK",
            r#"{"id": 25, "name": "pikachu", "height": 4, "weight": 60,
                "types": [{"slot": 1, "type": {"name": "electric", "url": "x"}}]}"#,
        )
        .await;
        let source = HttpEntitySource::new(base, Duration::from_secs(5)).unwrap();
        let payload = source.fetch(25).await.unwrap();
        assert_eq!(payload.as_json()["name"], "pikachu");
        assert_eq!(payload.as_json()["types"][0], "electric");
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let base = serve_once("200 OK", "{\"id\": \"not a number\"}").await;
        let source = HttpEntitySource::new(base, Duration::from_secs(5)).unwrap();
        let err = source.fetch(25).await.unwrap_err();
        assert!(matches!(err, DataSourceError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpEntitySource::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        let err = source.fetch(25).await.unwrap_err();
        assert!(matches!(err, DataSourceError::Transient { .. }));
        assert!(err.counts_as_failure());
    }
}
