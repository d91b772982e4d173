//! One HTTP exchange with the platform's management API.
//!
//! [`PlatformClient`](super::PlatformClient) owns retries and error
//! classification; a transport only sends a request and reports what came
//! back, so tests can script responses without a server.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde_json::Value;

use crate::config::PlatformConfig;
use crate::error::PlatformError;

/// A creation call against a management API collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformRequest {
    /// Collection path relative to the API prefix, e.g. `/surveys`.
    pub path: String,
    /// JSON body of the POST.
    pub body: Value,
}

impl PlatformRequest {
    pub fn new(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            body,
        }
    }
}

/// Status, `Retry-After` header and body of one response.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a single request. Only connection-level failures are errors
/// (`PlatformError::Network`); every HTTP status comes back as a response.
#[async_trait]
pub trait PlatformTransport: Send + Sync {
    async fn send(&self, request: &PlatformRequest) -> Result<RawResponse, PlatformError>;
}

/// reqwest-backed transport with bearer authentication.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(config: &PlatformConfig, api_key: String) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                config.api_prefix.trim_end_matches('/')
            ),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PlatformTransport for HttpTransport {
    async fn send(&self, request: &PlatformRequest) -> Result<RawResponse, PlatformError> {
        let url = format!("{}{}", self.endpoint, request.path);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("x-api-key", &self.api_key)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Network(format!("Failed to read response body: {e}")))?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_joins_base_and_prefix() {
        let config = PlatformConfig {
            base_url: "http://localhost:3000/".to_string(),
            ..Default::default()
        };
        let transport = HttpTransport::new(&config, "key".to_string()).unwrap();
        assert_eq!(
            transport.endpoint(),
            "http://localhost:3000/api/v1/management"
        );
    }

    #[test]
    fn test_raw_response_success_range() {
        assert!(RawResponse::new(201, "{}").is_success());
        assert!(!RawResponse::new(302, "").is_success());
        assert!(!RawResponse::new(503, "").is_success());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let config = PlatformConfig {
            base_url: "http://localhost:65535".to_string(),
            ..Default::default()
        };
        let transport = HttpTransport::new(&config, "key".to_string()).unwrap();
        let result = transport
            .send(&PlatformRequest::new("/workspaces", json!({"name": "x"})))
            .await;
        assert!(matches!(result, Err(PlatformError::Network(_))));
    }
}
