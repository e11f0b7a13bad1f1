//! Generic webhook output plugin.
//!
//! Sends events as JSON to an HTTP endpoint, one request per chunk of at most
//! `batch_size` events, retrying transient failures.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::core::RetryConfig;
use crate::plugin::schema::{self, ConfigField, FieldType};
use crate::plugin::transport::{self, HttpMethod, HttpRequest, HttpTransport, ReqwestTransport};
use crate::plugin::{
    BatchResult, Event, HealthReport, HealthStatus, OutputPlugin, Plugin, PluginCategory,
    PluginConfig, PluginError, PluginMetadata, PluginResult, Pricing,
};

/// Header carrying the body signature when a signing secret is configured.
pub const SIGNATURE_HEADER: &str = "X-Obsflow-Signature";

/// Longest accepted request timeout.
const MAX_TIMEOUT_SECONDS: f64 = 300.0;

/// Most retries accepted per request.
const MAX_RETRY_COUNT: i64 = 10;

/// Validated webhook configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub auth_header: Option<String>,
    #[serde(default)]
    pub custom_headers: Option<String>,
    #[serde(default)]
    pub signing_secret: Option<String>,
    pub batch_size: i64,
    pub timeout_seconds: f64,
    pub retry_count: i64,
}

impl WebhookSettings {
    fn check(&self) -> Result<(), String> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err("URL must start with http:// or https://".to_string());
        }
        if !(1..=10000).contains(&self.batch_size) {
            return Err("Batch size must be between 1 and 10000".to_string());
        }
        if !(self.timeout_seconds.is_finite() && self.timeout_seconds > 0.0) {
            return Err("Timeout must be greater than 0".to_string());
        }
        if self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(format!("Timeout cannot exceed {MAX_TIMEOUT_SECONDS} seconds"));
        }
        if self.retry_count < 0 {
            return Err("Retry count cannot be negative".to_string());
        }
        if self.retry_count > MAX_RETRY_COUNT {
            return Err(format!("Retry count cannot exceed {MAX_RETRY_COUNT}"));
        }
        self.parsed_headers().map(|_| ())
    }

    /// Custom headers, parsed from their JSON object form.
    fn parsed_headers(&self) -> Result<BTreeMap<String, String>, String> {
        match self.custom_headers.as_deref().map(str::trim) {
            None | Some("") => Ok(BTreeMap::new()),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|_| "Custom headers must be a JSON object of string values".to_string()),
        }
    }
}

/// Ready-to-use state derived from validated settings.
#[derive(Debug)]
struct Endpoint {
    url: String,
    method: HttpMethod,
    authorization: Option<String>,
    headers: BTreeMap<String, String>,
    signing_secret: Option<String>,
    batch_size: usize,
    timeout: Duration,
    retry: RetryConfig,
}

impl Endpoint {
    fn from_settings(settings: WebhookSettings) -> PluginResult<Self> {
        let headers = settings.parsed_headers().map_err(PluginError::Validation)?;
        let retries = u32::try_from(settings.retry_count.clamp(0, MAX_RETRY_COUNT)).unwrap_or(0);
        let timeout = Duration::try_from_secs_f64(settings.timeout_seconds)
            .map_err(|e| PluginError::Validation(format!("Invalid timeout: {e}")))?;

        Ok(Self {
            authorization: settings
                .auth_header
                .filter(|h| !h.trim().is_empty())
                .map(|h| authorization_value(&h)),
            signing_secret: settings.signing_secret.filter(|s| !s.is_empty()),
            url: settings.url,
            method: settings.method,
            headers,
            batch_size: usize::try_from(settings.batch_size).unwrap_or(1).max(1),
            timeout,
            retry: RetryConfig::with_retries(retries),
        })
    }

    fn request(&self, chunk: &[Event]) -> PluginResult<HttpRequest> {
        let body = serde_json::to_string(&json!({
            "events": chunk,
            "count": chunk.len(),
            "sent_at": chrono::Utc::now().to_rfc3339(),
            "source": "obsflow",
        }))?;

        let mut request = HttpRequest::post_json(&self.url, body, self.timeout);
        request.method = self.method;

        if let Some(ref auth) = self.authorization {
            request = request.header("Authorization", auth);
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(ref secret) = self.signing_secret {
            let signature = compute_signature(secret, &request.body);
            request = request.header(SIGNATURE_HEADER, signature);
        }

        Ok(request)
    }
}

/// Bare tokens become bearer credentials; values with a scheme pass through.
fn authorization_value(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains(' ') {
        raw.to_string()
    } else {
        format!("Bearer {raw}")
    }
}

/// Keyed SHA-256 digest of `secret` followed by the body. Not an HMAC.
fn compute_signature(secret: &str, body: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body.as_bytes());
    let result = hasher.finalize();

    format!("sha256={:x}", result)
}

/// Webhook output plugin.
pub struct WebhookOutput {
    transport: Arc<dyn HttpTransport>,
    endpoint: Option<Endpoint>,
    success_count: u64,
    error_count: u64,
}

impl WebhookOutput {
    /// Output that delivers over real HTTP.
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    /// Output that delivers through `transport`.
    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport, endpoint: None, success_count: 0, error_count: 0 }
    }

    fn settings(&self, config: &PluginConfig) -> PluginResult<WebhookSettings> {
        schema::parse_settings(&self.config_schema(), config, WebhookSettings::check)
    }

    /// Percentage of delivered events, 100 before anything was sent.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            100.0
        } else {
            self.success_count as f64 / total as f64 * 100.0
        }
    }
}

impl Default for WebhookOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for WebhookOutput {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "Webhook".to_string(),
            version: "1.0.0".to_string(),
            author: "obsflow".to_string(),
            description: "Send events to any HTTP endpoint via webhook".to_string(),
            category: PluginCategory::Output,
            documentation_url: "https://docs.obsflow.dev/plugins/webhook".to_string(),
            icon_url: "https://docs.obsflow.dev/icons/webhook.svg".to_string(),
            tags: ["webhook", "http", "api", "integration"].map(String::from).to_vec(),
            pricing: Pricing::Free,
        }
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new("url", FieldType::String, "Webhook URL", "HTTP endpoint to send events to")
                .required()
                .placeholder("https://api.example.com/webhook"),
            ConfigField::new("method", FieldType::Select, "HTTP Method", "HTTP method to use")
                .default_value("POST")
                .options(&["POST", "PUT", "PATCH"]),
            ConfigField::new(
                "auth_header",
                FieldType::Secret,
                "Authorization Header",
                "Authorization header value (a bare token is sent as a bearer token)",
            )
            .placeholder("Bearer your-token-here"),
            ConfigField::new(
                "custom_headers",
                FieldType::String,
                "Custom Headers",
                "Additional headers as a JSON object",
            )
            .placeholder(r#"{"X-Custom-Header": "value"}"#),
            ConfigField::new(
                "signing_secret",
                FieldType::Secret,
                "Signing Secret",
                "Secret used to sign request bodies (optional)",
            ),
            ConfigField::new("batch_size", FieldType::Number, "Batch Size", "Events per request")
                .default_value(100),
            ConfigField::new(
                "timeout_seconds",
                FieldType::Number,
                "Timeout (seconds)",
                "Request timeout",
            )
            .default_value(30),
            ConfigField::new("retry_count", FieldType::Number, "Retry Count", "Retries on failure")
                .default_value(3),
        ]
    }

    fn validate_config(&self, config: &PluginConfig) -> PluginResult<()> {
        self.settings(config).map(|_| ())
    }

    fn initialize(&mut self, config: &PluginConfig) -> PluginResult<()> {
        let endpoint = Endpoint::from_settings(self.settings(config)?)?;
        tracing::info!(url = %endpoint.url, method = endpoint.method.as_str(), "Webhook output initialized");
        self.endpoint = Some(endpoint);
        Ok(())
    }

    fn health_check(&self) -> HealthReport {
        let rate = self.success_rate();
        let status = if rate > 95.0 {
            HealthStatus::Healthy
        } else if rate > 50.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        let endpoint = self.endpoint.as_ref().map(|e| e.url.clone()).unwrap_or_default();
        HealthReport::new(status, format!("Success rate: {rate:.1}%"))
            .metric("success_count", self.success_count)
            .metric("error_count", self.error_count)
            .metric("success_rate", rate)
            .metric("endpoint", endpoint)
    }

    fn test_connection(&self) -> PluginResult<String> {
        let endpoint =
            self.endpoint.as_ref().ok_or_else(|| PluginError::NotInitialized(self.metadata().name))?;
        Ok(format!("Webhook configured for {} {}", endpoint.method.as_str(), endpoint.url))
    }
}

impl OutputPlugin for WebhookOutput {
    fn send_batch(&mut self, events: &[Event]) -> BatchResult {
        let Some(endpoint) = self.endpoint.as_ref() else {
            return BatchResult::failed(events.len(), "Webhook output is not initialized");
        };

        let mut result = BatchResult::default();
        for chunk in events.chunks(endpoint.batch_size) {
            let outcome = endpoint.request(chunk).and_then(|request| {
                transport::deliver(self.transport.as_ref(), &request, &endpoint.retry)
                    .into_result()
                    .map_err(PluginError::from)
            });

            match outcome {
                Ok(_) => result.merge(BatchResult::delivered(chunk.len())),
                Err(e) => {
                    tracing::warn!(url = %endpoint.url, events = chunk.len(), error = %e, "Webhook delivery failed");
                    result.merge(BatchResult::failed(chunk.len(), e.to_string()));
                }
            }
        }

        self.success_count += result.success_count as u64;
        self.error_count += result.failed_count as u64;
        result
    }
}
