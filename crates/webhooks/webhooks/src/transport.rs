//! HTTP transport used by the delivery executor.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::record::DeliveryFailure;

/// A single signed POST, fully prepared by the executor.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Target URL.
    pub url: String,
    /// Headers in send order.
    pub headers: Vec<(String, String)>,
    /// Exact body bytes that were signed.
    pub body: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl OutboundRequest {
    /// Returns the first header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response of the endpoint, whatever its status.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Error type for transport operations. Never escapes the executor.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Request timeout.
    #[error("Request timeout")]
    Timeout,

    /// Connection could not be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Any other request error.
    #[error("Request failed: {0}")]
    Request(String),
}

impl From<TransportError> for DeliveryFailure {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => DeliveryFailure::Timeout,
            TransportError::Connection(message) => DeliveryFailure::Connection { message },
            TransportError::Request(message) => DeliveryFailure::Request { message },
        }
    }
}

#[cfg(feature = "http-client")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Sends prepared webhook requests.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Sends one request. Non-2xx statuses are responses, not errors.
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[cfg(feature = "http-client")]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http-client")]
impl HttpTransport {
    /// Creates a transport that identifies itself with `user_agent`.
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            // Endpoints must not bounce deliveries to other hosts
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self { client })
    }
}

#[cfg(feature = "http-client")]
#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        Ok(TransportResponse {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}
