//! JSON parser processing plugin.
//!
//! Parses a JSON document held in one event field and merges its keys into
//! the event, either at the root or under a target field.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::plugin::schema::{self, ConfigField, FieldType};
use crate::plugin::{
    Event, HealthReport, HealthStatus, Plugin, PluginCategory, PluginConfig, PluginMetadata,
    PluginResult, Pricing, ProcessingPlugin,
};

/// Marker written to `_parser` on failed events.
pub const PARSER_MARKER: &str = "json_parser";

/// Error counter beyond which the parser reports itself unhealthy.
const UNHEALTHY_ERROR_COUNT: u64 = 1000;

/// What to do with an event whose source field is not a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    Keep,
    Drop,
    Mark,
}

/// Validated parser configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonParserSettings {
    pub source_field: String,
    #[serde(default)]
    pub target_field: String,
    pub flatten: bool,
    #[serde(default)]
    pub prefix: String,
    pub keep_original: bool,
    pub on_error: OnError,
}

/// Processing plugin that expands JSON strings into event fields.
#[derive(Debug, Default)]
pub struct JsonParser {
    settings: Option<JsonParserSettings>,
    parse_success: u64,
    parse_errors: u64,
}

impl JsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self, config: &PluginConfig) -> PluginResult<JsonParserSettings> {
        schema::parse_settings(&self.config_schema(), config, |s: &JsonParserSettings| {
            if s.source_field.trim().is_empty() {
                return Err("Source field is required".to_string());
            }
            Ok(())
        })
    }

    /// Percentage of successfully parsed events, `None` before the first one.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.parse_success + self.parse_errors;
        (total > 0).then(|| self.parse_success as f64 / total as f64 * 100.0)
    }
}

/// Extract the object to merge from the source value.
fn parse_source(source: &Value) -> Result<Map<String, Value>, String> {
    match source {
        Value::Object(map) => Ok(map.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err("Expected a JSON object".to_string()),
            Err(e) => Err(e.to_string()),
        },
        _ => Err("Not valid JSON".to_string()),
    }
}

/// Collapse nested objects into dot-separated keys. Arrays are leaves.
pub fn flatten(map: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into("", map, &mut out);
    out
}

fn flatten_into(prefix: &str, map: Map<String, Value>, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let key = if prefix.is_empty() { key } else { format!("{prefix}.{key}") };
        match value {
            Value::Object(inner) => flatten_into(&key, inner, out),
            leaf => {
                out.insert(key, leaf);
            }
        }
    }
}

impl Plugin for JsonParser {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "JSON Parser".to_string(),
            version: "1.0.0".to_string(),
            author: "obsflow".to_string(),
            description: "Parse JSON strings into structured event fields".to_string(),
            category: PluginCategory::Processing,
            documentation_url: "https://docs.obsflow.dev/plugins/json-parser".to_string(),
            icon_url: "https://docs.obsflow.dev/icons/json.svg".to_string(),
            tags: ["parser", "json", "transform"].map(String::from).to_vec(),
            pricing: Pricing::Free,
        }
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "source_field",
                FieldType::String,
                "Source Field",
                "Field containing the JSON string",
            )
            .required()
            .default_value("message")
            .placeholder("message"),
            ConfigField::new(
                "target_field",
                FieldType::String,
                "Target Field",
                "Field to store parsed data (empty merges into the event root)",
            )
            .default_value("")
            .placeholder("parsed"),
            ConfigField::new(
                "flatten",
                FieldType::Boolean,
                "Flatten Nested Objects",
                "Flatten nested objects into dot notation",
            )
            .default_value(false),
            ConfigField::new("prefix", FieldType::String, "Field Prefix", "Prefix for parsed field names")
                .default_value("")
                .placeholder("json_"),
            ConfigField::new(
                "keep_original",
                FieldType::Boolean,
                "Keep Original Field",
                "Keep the original JSON string field",
            )
            .default_value(true),
            ConfigField::new(
                "on_error",
                FieldType::Select,
                "On Parse Error",
                "Action to take when parsing fails",
            )
            .required()
            .default_value("keep")
            .options(&["keep", "drop", "mark"]),
        ]
    }

    fn validate_config(&self, config: &PluginConfig) -> PluginResult<()> {
        self.settings(config).map(|_| ())
    }

    fn initialize(&mut self, config: &PluginConfig) -> PluginResult<()> {
        let settings = self.settings(config)?;
        tracing::debug!(source = %settings.source_field, "JSON parser initialized");
        self.settings = Some(settings);
        Ok(())
    }

    fn health_check(&self) -> HealthReport {
        // Nothing parsed yet counts as 0 %.
        let rate = self.success_rate().unwrap_or(0.0);

        let status = if self.parse_errors > UNHEALTHY_ERROR_COUNT {
            HealthStatus::Unhealthy
        } else if rate < 50.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport::new(status, format!("Parse success rate: {rate:.1}%"))
            .metric("parse_success", self.parse_success)
            .metric("parse_errors", self.parse_errors)
            .metric("success_rate", rate)
    }
}

impl ProcessingPlugin for JsonParser {
    fn process(&mut self, mut event: Event) -> Option<Event> {
        let Some(settings) = self.settings.as_ref() else {
            return Some(event);
        };

        if !event.contains_key(&settings.source_field) {
            return Some(event);
        }
        let parsed = parse_source(&event[&settings.source_field]);

        match parsed {
            Ok(mut fields) => {
                if settings.flatten {
                    fields = flatten(fields);
                }
                if !settings.prefix.is_empty() {
                    fields = fields
                        .into_iter()
                        .map(|(key, value)| (format!("{}{key}", settings.prefix), value))
                        .collect();
                }

                if settings.target_field.is_empty() {
                    event.extend(fields);
                } else {
                    event.insert(settings.target_field.clone(), Value::Object(fields));
                }

                if !settings.keep_original {
                    event.remove(&settings.source_field);
                }

                self.parse_success += 1;
                Some(event)
            }
            Err(message) => {
                self.parse_errors += 1;
                tracing::debug!(field = %settings.source_field, error = %message, "JSON parse failed");

                match settings.on_error {
                    OnError::Drop => None,
                    OnError::Mark => {
                        event.insert("_parse_error".to_string(), Value::String(message));
                        event.insert("_parser".to_string(), Value::String(PARSER_MARKER.to_string()));
                        Some(event)
                    }
                    OnError::Keep => Some(event),
                }
            }
        }
    }
}
