//! HTTP transport for provider requests.

use super::provider::{HttpMethod, ProviderRequest};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;
use thiserror::Error;

/// Errors raised before a provider produced a response
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request exceeded the configured timeout
    #[error("request timed out after {0}s")]
    Timeout(u64),
    /// Connection, TLS or body read failure
    #[error("request failed: {0}")]
    Network(String),
}

/// Raw provider response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

/// Sends provider requests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the status and body
    async fn send(&self, request: ProviderRequest) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport with a per-request timeout
pub struct HttpTransport {
    client: HttpClient,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport whose requests time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self { client, timeout }
    }

    /// The request URL can carry a query credential, so it is dropped from
    /// the message.
    fn map_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout.as_secs())
        } else {
            TransportError::Network(error.without_url().to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ProviderRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_error(e))?;

        Ok(TransportResponse { status, body })
    }
}
