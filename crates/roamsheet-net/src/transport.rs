//! HTTP transport primitive.
//!
//! The resilience layer never talks to the network directly; everything goes
//! through the [`HttpTransport`] trait so the retry controller, interception
//! agent, and diagnostics battery can be driven against any conforming
//! implementation. The default implementation wraps `reqwest` with:
//! - Per-request timeouts mapped to [`NetError::Timeout`]
//! - Cooperative cancellation via [`CancellationToken`]
//! - User-agent management

use crate::cancel::CancellationToken;
use crate::config::TransportConfig;
use crate::error::{NetError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// HTTP method subset used by the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub method: Method,
    /// Upper bound on the whole request, including connect time.
    pub timeout: Duration,
    /// Attempt-scoped cancellation token.
    pub cancel: CancellationToken,
    /// Optional request body (API calls).
    pub body: Option<Bytes>,
}

impl TransportRequest {
    /// Build a GET request with the default timeout and a fresh token.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            timeout: TransportConfig::REQUEST_TIMEOUT,
            cancel: CancellationToken::new(),
            body: None,
        }
    }

    /// Build a HEAD request with the quick timeout.
    pub fn head(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Head,
            timeout: TransportConfig::QUICK_REQUEST_TIMEOUT,
            cancel: CancellationToken::new(),
            body: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A completed response with the body fully read.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    /// Convert a non-2xx response into an [`NetError::HttpStatus`].
    pub fn require_success(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(NetError::HttpStatus {
                code: self.status,
                url: url.to_string(),
            })
        }
    }
}

/// Check if an HTTP status code indicates a transient server-side error.
///
/// Client errors (4xx) cannot succeed on retry and are excluded.
pub fn is_retryable_status(status: u16) -> bool {
    (500..=599).contains(&status)
}

/// The "perform HTTP request" primitive.
///
/// Implementations must honor `timeout` and observe `cancel`; they report
/// transport-level failures as errors and deliver every HTTP status
/// (including errors) as an ordinary response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Default transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(TransportConfig::USER_AGENT)
            .build()
            .map_err(|e| NetError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

/// Resolves once the token is cancelled. Cooperative: polls the flag on a
/// short interval, matching the token's atomic-only design.
async fn cancelled(token: &CancellationToken) {
    while !token.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        request.cancel.check()?;

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Head => self.client.head(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        builder = builder.timeout(request.timeout);
        if let Some(body) = request.body.clone() {
            builder = builder.body(body);
        }

        let fetch = async {
            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    NetError::Timeout(request.timeout)
                } else {
                    NetError::from(e)
                }
            })?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(NetError::from)?;
            debug!("{:?} {} -> {}", request.method, request.url, status);
            Ok(TransportResponse { status, body })
        };

        tokio::select! {
            result = fetch => result,
            _ = cancelled(&request.cancel) => Err(NetError::Cancelled),
        }
    }
}
