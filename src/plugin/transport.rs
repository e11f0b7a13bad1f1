//! Outgoing HTTP transport used by output and alert plugins.
//!
//! Plugins build an [`HttpRequest`] and hand it to an [`HttpTransport`].
//! [`ReqwestTransport`] performs real blocking requests; [`MemoryTransport`]
//! records requests and replays canned responses.

use std::collections::VecDeque;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{retry_if, RetryConfig, RetryResult};

/// HTTP method accepted by webhook outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
    Patch,
}

impl HttpMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }
}

/// A single outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: String,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Create a JSON POST request.
    pub fn post_json(url: impl Into<String>, body: String, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
            timeout,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// Response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok() -> Self {
        Self { status: 200, body: String::new() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Request could not be sent.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// Request exceeded its timeout.
    #[error("HTTP request timed out after {0:?}")]
    Timeout(Duration),

    /// Endpoint answered with a non-success status.
    #[error("Webhook error: {status} - {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// Whether retrying the same request can help.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
        }
    }
}

/// Something that can deliver an [`HttpRequest`].
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Send `request`, treating non-2xx answers as errors and retrying
/// transient failures according to `retry`.
pub fn deliver(
    transport: &dyn HttpTransport,
    request: &HttpRequest,
    retry: &RetryConfig,
) -> RetryResult<HttpResponse, TransportError> {
    retry_if(
        retry,
        || {
            let response = transport.send(request)?;
            if response.is_success() {
                Ok(response)
            } else {
                Err(TransportError::Status { status: response.status, body: response.body })
            }
        },
        TransportError::is_retryable,
    )
}

/// Blocking reqwest transport. The client is built on first use.
#[derive(Default)]
pub struct ReqwestTransport {
    client: OnceCell<reqwest::blocking::Client>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, TransportError> {
        self.client.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .user_agent(format!("obsflow/{}", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| TransportError::Request(e.to_string()))
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = self.client()?;

        let mut builder = match request.method {
            HttpMethod::Post => client.post(&request.url),
            HttpMethod::Put => client.put(&request.url),
            HttpMethod::Patch => client.patch(&request.url),
        };

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response =
            builder.timeout(request.timeout).body(request.body.clone()).send().map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(request.timeout)
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();

        Ok(HttpResponse { status, body })
    }
}

/// In-memory transport that records every request.
///
/// Queued responses are returned first; afterwards every request gets
/// the fallback response.
pub struct MemoryTransport {
    requests: Mutex<Vec<HttpRequest>>,
    queued: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    fallback: Result<HttpResponse, TransportError>,
}

impl MemoryTransport {
    /// Transport that answers 200 to everything.
    pub fn new() -> Self {
        Self::with_fallback(Ok(HttpResponse::ok()))
    }

    /// Transport that answers `status` to everything.
    pub fn with_status(status: u16) -> Self {
        Self::with_fallback(Ok(HttpResponse { status, body: format!("status {status}") }))
    }

    /// Transport whose requests never reach the endpoint.
    pub fn unreachable() -> Self {
        Self::with_fallback(Err(TransportError::Request("connection refused".to_string())))
    }

    fn with_fallback(fallback: Result<HttpResponse, TransportError>) -> Self {
        Self { requests: Mutex::new(Vec::new()), queued: Mutex::new(VecDeque::new()), fallback }
    }

    /// Queue a response for the next request.
    pub fn push_response(&self, response: Result<HttpResponse, TransportError>) {
        self.queued.lock().push_back(response);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for MemoryTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        self.queued.lock().pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}
