//! HTTP endpoint input plugin.
//!
//! The plugin does not listen on a socket itself. An external receiver hands
//! request bodies to its [`LogReceiver`] side, and pipelines drain the buffer
//! through [`InputPlugin::collect`] once a full batch is available.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::plugin::schema::{self, ConfigField, FieldType};
use crate::plugin::{
    Event, HealthReport, HealthStatus, InputPlugin, LogReceiver, Plugin, PluginCategory,
    PluginConfig, PluginError, PluginMetadata, PluginResult, Pricing,
};

/// Value of the `source` key on every event this input produces.
pub const EVENT_SOURCE: &str = "http_endpoint";

const PORT_PATTERN: &str = r"^(102[4-9]|10[3-9]\d|1[1-9]\d{2}|[2-9]\d{3}|[1-5]\d{4}|6[0-4]\d{3}|65[0-4]\d{2}|655[0-2]\d|6553[0-5])$";

/// How raw request bodies are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    /// Body must be valid JSON.
    Json,
    /// Body is kept as a string.
    Text,
    /// JSON when it parses, text otherwise.
    Auto,
}

/// Validated endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpInputSettings {
    pub port: i64,
    pub path: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub format: BodyFormat,
    pub batch_size: i64,
}

impl HttpInputSettings {
    fn check(&self) -> Result<(), String> {
        if !(1024..=65535).contains(&self.port) {
            return Err("Port must be between 1024 and 65535".to_string());
        }
        if !self.path.starts_with('/') {
            return Err("Path must start with /".to_string());
        }
        if !(1..=10000).contains(&self.batch_size) {
            return Err("Batch size must be between 1 and 10000".to_string());
        }
        Ok(())
    }
}

/// Buffered HTTP input.
#[derive(Debug, Default)]
pub struct HttpInput {
    settings: Option<HttpInputSettings>,
    buffer: Vec<Event>,
    total_received: u64,
    rejected: u64,
}

impl HttpInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self, config: &PluginConfig) -> PluginResult<HttpInputSettings> {
        schema::parse_settings(&self.config_schema(), config, HttpInputSettings::check)
    }

    /// Number of events waiting to be collected.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn reject(&mut self, reason: &str) -> bool {
        self.rejected += 1;
        tracing::warn!(reason, "Rejected HTTP input body");
        false
    }
}

impl Plugin for HttpInput {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "HTTP Endpoint".to_string(),
            version: "1.0.0".to_string(),
            author: "obsflow".to_string(),
            description: "Receive logs via HTTP POST requests".to_string(),
            category: PluginCategory::Input,
            documentation_url: "https://docs.obsflow.dev/plugins/http-input".to_string(),
            icon_url: "https://docs.obsflow.dev/icons/http.svg".to_string(),
            tags: ["http", "api", "webhook", "rest"].map(String::from).to_vec(),
            pricing: Pricing::Free,
        }
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new("port", FieldType::Number, "Port", "Port to listen on")
                .required()
                .default_value(8080)
                .validation(PORT_PATTERN),
            ConfigField::new("path", FieldType::String, "Endpoint Path", "URL path for receiving logs")
                .required()
                .default_value("/logs")
                .placeholder("/api/logs"),
            ConfigField::new(
                "auth_token",
                FieldType::Secret,
                "Authentication Token",
                "Bearer token required from senders (optional)",
            ),
            ConfigField::new("format", FieldType::Select, "Log Format", "Expected log format")
                .required()
                .default_value("json")
                .options(&["json", "text", "auto"]),
            ConfigField::new(
                "batch_size",
                FieldType::Number,
                "Batch Size",
                "Number of logs to buffer before a collect returns them",
            )
            .default_value(100),
        ]
    }

    fn validate_config(&self, config: &PluginConfig) -> PluginResult<()> {
        self.settings(config).map(|_| ())
    }

    fn initialize(&mut self, config: &PluginConfig) -> PluginResult<()> {
        let settings = self.settings(config)?;
        tracing::info!(port = settings.port, path = %settings.path, "HTTP input initialized");
        self.settings = Some(settings);
        Ok(())
    }

    fn health_check(&self) -> HealthReport {
        let Some(settings) = &self.settings else {
            return HealthReport::new(HealthStatus::Unhealthy, "HTTP endpoint is not initialized");
        };

        HealthReport::new(
            HealthStatus::Healthy,
            format!("HTTP endpoint listening on :{}{}", settings.port, settings.path),
        )
        .metric("total_received", self.total_received)
        .metric("buffer_size", self.buffer.len())
        .metric("rejected", self.rejected)
        .metric("port", settings.port)
    }

    fn test_connection(&self) -> PluginResult<String> {
        let settings =
            self.settings.as_ref().ok_or_else(|| PluginError::NotInitialized(self.metadata().name))?;
        Ok(format!("HTTP endpoint ready at :{}{}", settings.port, settings.path))
    }
}

impl InputPlugin for HttpInput {
    fn collect(&mut self) -> PluginResult<Vec<Event>> {
        let settings =
            self.settings.as_ref().ok_or_else(|| PluginError::NotInitialized(self.metadata().name))?;

        if (self.buffer.len() as i64) < settings.batch_size {
            return Ok(Vec::new());
        }
        Ok(std::mem::take(&mut self.buffer))
    }

    fn receiver(&mut self) -> Option<&mut dyn LogReceiver> {
        Some(self)
    }
}

impl LogReceiver for HttpInput {
    fn receive_log(&mut self, body: Value) -> bool {
        let Some(settings) = &self.settings else {
            return self.reject("not initialized");
        };

        let timestamp = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let event = json!({
            "timestamp": timestamp,
            "source": EVENT_SOURCE,
            "data": body,
            "metadata": {"port": settings.port, "path": settings.path},
        });

        if let Value::Object(event) = event {
            self.buffer.push(event);
        }
        self.total_received += 1;
        true
    }

    fn receive_raw(&mut self, body: &str) -> bool {
        let Some(format) = self.settings.as_ref().map(|s| s.format) else {
            return self.reject("not initialized");
        };

        let value = match (format, serde_json::from_str::<Value>(body)) {
            (BodyFormat::Json | BodyFormat::Auto, Ok(value)) => value,
            (BodyFormat::Json, Err(_)) => return self.reject("body is not valid JSON"),
            (BodyFormat::Text, _) | (BodyFormat::Auto, Err(_)) => Value::String(body.to_string()),
        };

        self.receive_log(value)
    }

    fn authorize(&self, authorization: Option<&str>) -> bool {
        match self.settings.as_ref().and_then(|s| s.auth_token.as_deref()) {
            Some(token) if !token.is_empty() => {
                authorization.is_some_and(|header| header == format!("Bearer {token}"))
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn input(config: Value) -> HttpInput {
        let mut input = HttpInput::new();
        input.initialize(config.as_object().unwrap()).unwrap();
        input
    }

    fn validation_error(config: Value) -> String {
        HttpInput::new().validate_config(config.as_object().unwrap()).unwrap_err().to_string()
    }

    #[test]
    fn test_defaults_validate() {
        assert!(HttpInput::new().validate_config(&Map::new()).is_ok());
    }

    #[test]
    fn test_port_range() {
        assert_eq!(validation_error(json!({"port": 80})), "Port must be between 1024 and 65535");
        assert_eq!(validation_error(json!({"port": 70000})), "Port must be between 1024 and 65535");
        assert!(HttpInput::new().validate_config(json!({"port": 1024}).as_object().unwrap()).is_ok());
    }

    #[test]
    fn test_path_and_batch_size_rules() {
        assert_eq!(validation_error(json!({"path": "logs"})), "Path must start with /");
        assert_eq!(
            validation_error(json!({"batch_size": 0})),
            "Batch size must be between 1 and 10000"
        );
    }

    #[test]
    fn test_collect_waits_for_full_batch() {
        let mut input = input(json!({"batch_size": 3}));
        assert!(input.receive_log(json!({"msg": 1})));
        assert!(input.receive_log(json!({"msg": 2})));
        assert!(input.collect().unwrap().is_empty());

        input.receive_log(json!({"msg": 3}));
        let events = input.collect().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["source"], EVENT_SOURCE);
        assert_eq!(events[0]["data"], json!({"msg": 1}));
        assert_eq!(events[0]["metadata"], json!({"port": 8080, "path": "/logs"}));
        assert!(events[0]["timestamp"].is_f64());

        assert_eq!(input.buffered(), 0);
        assert!(input.collect().unwrap().is_empty());
    }

    #[test]
    fn test_collect_before_initialize() {
        let err = HttpInput::new().collect().unwrap_err();
        assert!(matches!(err, PluginError::NotInitialized(_)));
    }

    #[test]
    fn test_receive_raw_formats() {
        let mut strict = input(json!({"batch_size": 1}));
        assert!(strict.receive_raw(r#"{"a": 1}"#));
        assert!(!strict.receive_raw("plain text"));

        let mut auto = input(json!({"format": "auto", "batch_size": 1}));
        assert!(auto.receive_raw("plain text"));
        assert!(auto.receive_raw("[1, 2]"));
        let events = auto.collect().unwrap();
        assert_eq!(events[0]["data"], "plain text");
        assert_eq!(events[1]["data"], json!([1, 2]));

        let mut text = input(json!({"format": "text", "batch_size": 1}));
        assert!(text.receive_raw("{}"));
        assert_eq!(text.collect().unwrap()[0]["data"], "{}");
    }

    #[test]
    fn test_authorize_with_token() {
        let secured = input(json!({"auth_token": "s3cret"}));
        assert!(secured.authorize(Some("Bearer s3cret")));
        assert!(!secured.authorize(Some("Bearer nope")));
        assert!(!secured.authorize(None));

        assert!(input(json!({})).authorize(None));
    }

    #[test]
    fn test_health_reports_endpoint() {
        let mut input = input(json!({"port": 9000, "path": "/ingest"}));
        input.receive_log(json!("x"));

        let report = input.health_check();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.message, "HTTP endpoint listening on :9000/ingest");
        assert_eq!(report.metrics["total_received"], 1);
        assert_eq!(report.metrics["buffer_size"], 1);
    }

    #[test]
    fn test_exposes_receiver() {
        let mut input = input(json!({"batch_size": 1}));
        input.receiver().unwrap().receive_log(json!({"k": "v"}));
        assert_eq!(input.collect().unwrap().len(), 1);
    }
}
