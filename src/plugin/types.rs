//! Core plugin types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A log event flowing through a pipeline.
pub type Event = Map<String, Value>;

/// Configuration mapping for one plugin instance.
pub type PluginConfig = Map<String, Value>;

/// Category of plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginCategory {
    /// Input plugin - data source.
    Input,
    /// Processing plugin - event transformation.
    Processing,
    /// Output plugin - data sink.
    Output,
    /// Alert plugin - notification channel.
    Alert,
    /// Analytics plugin.
    Analytics,
}

impl PluginCategory {
    /// All categories, in listing order.
    pub const ALL: [Self; 5] =
        [Self::Input, Self::Processing, Self::Output, Self::Alert, Self::Analytics];

    /// Identifier used in plugin ids and config files.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Processing => "processing",
            Self::Output => "output",
            Self::Alert => "alert",
            Self::Analytics => "analytics",
        }
    }

    /// Get the display name for this category.
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Processing => "Processing",
            Self::Output => "Output",
            Self::Alert => "Alert",
            Self::Analytics => "Analytics",
        }
    }

    /// Parse a category from its identifier (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl std::fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Pricing tier advertised in the plugin catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pricing {
    Free,
    Paid,
    Enterprise,
}

/// Descriptor of a plugin type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin name.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Plugin author.
    pub author: String,
    /// Plugin description.
    pub description: String,
    /// Plugin category.
    pub category: PluginCategory,
    /// Documentation URL.
    pub documentation_url: String,
    /// Icon URL.
    pub icon_url: String,
    /// Tags for search and grouping.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Pricing tier.
    pub pricing: Pricing,
}

impl PluginMetadata {
    /// Registry id of the plugin type, `"{category}:{name}"`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.category.as_str(), self.name)
    }
}

/// Health status reported by a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by a plugin health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Human readable summary.
    pub message: String,
    /// Plugin-specific metrics.
    #[serde(default)]
    pub metrics: Map<String, Value>,
}

impl HealthReport {
    /// Create a report without metrics.
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), metrics: Map::new() }
    }

    /// Add a metric to the report.
    pub fn metric(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(name.to_string(), value.into());
        self
    }
}

/// Outcome of delivering a batch of events to an output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Events delivered.
    pub success_count: usize,
    /// Events that could not be delivered.
    pub failed_count: usize,
    /// Error messages collected during delivery.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl BatchResult {
    /// All events in the batch were delivered.
    pub fn delivered(count: usize) -> Self {
        Self { success_count: count, failed_count: 0, errors: Vec::new() }
    }

    /// No event in the batch was delivered.
    pub fn failed(count: usize, error: impl Into<String>) -> Self {
        Self { success_count: 0, failed_count: count, errors: vec![error.into()] }
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: Self) {
        self.success_count += other.success_count;
        self.failed_count += other.failed_count;
        self.errors.extend(other.errors);
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Alert payload delivered to alert plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_alert_title")]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

fn default_alert_title() -> String {
    "Alert".to_string()
}

impl Alert {
    pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity, title: title.into(), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(category: PluginCategory) -> PluginMetadata {
        PluginMetadata {
            name: "HTTP Endpoint".to_string(),
            version: "1.0.0".to_string(),
            author: "tests".to_string(),
            description: "test plugin".to_string(),
            category,
            documentation_url: String::new(),
            icon_url: String::new(),
            tags: vec!["http".to_string()],
            pricing: Pricing::Free,
        }
    }

    #[test]
    fn test_plugin_id_uses_category_and_name() {
        assert_eq!(metadata(PluginCategory::Input).id(), "input:HTTP Endpoint");
        assert_eq!(metadata(PluginCategory::Alert).id(), "alert:HTTP Endpoint");
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(PluginCategory::parse("INPUT"), Some(PluginCategory::Input));
        assert_eq!(PluginCategory::parse(" processing "), Some(PluginCategory::Processing));
        assert_eq!(PluginCategory::parse("sink"), None);
    }

    #[test]
    fn test_metadata_serializes_category_lowercase() {
        let json = serde_json::to_value(metadata(PluginCategory::Output)).unwrap();
        assert_eq!(json["category"], "output");
        assert_eq!(json["pricing"], "free");
    }

    #[test]
    fn test_batch_result_merge() {
        let mut total = BatchResult::delivered(3);
        total.merge(BatchResult::failed(2, "HTTP 500"));

        assert_eq!(total.success_count, 3);
        assert_eq!(total.failed_count, 2);
        assert_eq!(total.errors, vec!["HTTP 500".to_string()]);
    }

    #[test]
    fn test_alert_defaults() {
        let alert: Alert = serde_json::from_str(r#"{"message": "disk full"}"#).unwrap();
        assert_eq!(alert.severity, Severity::Info);
        assert_eq!(alert.title, "Alert");
    }

    #[test]
    fn test_health_report_metrics() {
        let report = HealthReport::new(HealthStatus::Degraded, "slow").metric("errors", 4);
        assert_eq!(report.metrics["errors"], 4);
        assert_eq!(report.status.to_string(), "degraded");
    }
}
