//! Slack alert plugin.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::RetryConfig;
use crate::plugin::schema::{self, ConfigField, FieldType};
use crate::plugin::transport::{self, HttpRequest, HttpTransport, ReqwestTransport};
use crate::plugin::{
    Alert, AlertPlugin, HealthReport, HealthStatus, Plugin, PluginCategory, PluginConfig,
    PluginError, PluginMetadata, PluginResult, Pricing, Severity,
};

/// Every incoming webhook URL starts with this prefix.
pub const SLACK_WEBHOOK_PREFIX: &str = "https://hooks.slack.com/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Validated Slack configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackSettings {
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
    pub username: String,
    pub icon_emoji: String,
    #[serde(default)]
    pub mention_users: Option<String>,
    pub severity_colors: bool,
}

impl SlackSettings {
    fn check(&self) -> Result<(), String> {
        if !self.webhook_url.starts_with(SLACK_WEBHOOK_PREFIX) {
            return Err("Invalid Slack webhook URL format".to_string());
        }
        Ok(())
    }

    fn channel(&self) -> Option<&str> {
        self.channel.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

/// Attachment color for a severity.
pub const fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "danger",
        Severity::Warning => "warning",
        Severity::Info => "good",
    }
}

/// Alert plugin posting to a Slack incoming webhook.
pub struct SlackAlert {
    transport: Arc<dyn HttpTransport>,
    settings: Option<SlackSettings>,
    alerts_sent: u64,
    alerts_failed: u64,
}

impl SlackAlert {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport, settings: None, alerts_sent: 0, alerts_failed: 0 }
    }

    fn settings(&self, config: &PluginConfig) -> PluginResult<SlackSettings> {
        schema::parse_settings(&self.config_schema(), config, SlackSettings::check)
    }

    /// Message payload for `alert`, or `None` before initialization.
    pub fn build_payload(&self, alert: &Alert) -> Option<Value> {
        let settings = self.settings.as_ref()?;

        let mut text = format!("*{}*\n{}", alert.title, alert.message);
        if alert.severity == Severity::Critical {
            if let Some(mentions) = settings.mention_users.as_deref().filter(|m| !m.trim().is_empty())
            {
                text = format!("{mentions}\n{text}");
            }
        }

        let mut payload = json!({
            "username": settings.username,
            "icon_emoji": settings.icon_emoji,
            "text": text,
        });

        if settings.severity_colors {
            payload["attachments"] = json!([{
                "color": severity_color(alert.severity),
                "text": alert.message,
            }]);
        }
        if let Some(channel) = settings.channel() {
            payload["channel"] = json!(channel);
        }

        Some(payload)
    }

    fn request_for(&self, alert: &Alert) -> Option<HttpRequest> {
        let settings = self.settings.as_ref()?;
        let payload = self.build_payload(alert)?;
        Some(HttpRequest::post_json(&settings.webhook_url, payload.to_string(), REQUEST_TIMEOUT))
    }
}

impl Default for SlackAlert {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for SlackAlert {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "Slack Notifications".to_string(),
            version: "1.0.0".to_string(),
            author: "obsflow".to_string(),
            description: "Send alerts to Slack channels".to_string(),
            category: PluginCategory::Alert,
            documentation_url: "https://docs.obsflow.dev/plugins/slack".to_string(),
            icon_url: "https://docs.obsflow.dev/icons/slack.svg".to_string(),
            tags: ["slack", "alerts", "notifications", "chat"].map(String::from).to_vec(),
            pricing: Pricing::Free,
        }
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "webhook_url",
                FieldType::Secret,
                "Slack Webhook URL",
                "Incoming webhook URL from Slack",
            )
            .required()
            .placeholder("https://hooks.slack.com/services/..."),
            ConfigField::new(
                "channel",
                FieldType::String,
                "Channel Override",
                "Override the default channel (optional)",
            )
            .placeholder("#alerts"),
            ConfigField::new("username", FieldType::String, "Bot Username", "Display name for the bot")
                .default_value("Obsflow Alerts"),
            ConfigField::new("icon_emoji", FieldType::String, "Icon Emoji", "Emoji for the bot icon")
                .default_value(":robot_face:"),
            ConfigField::new(
                "mention_users",
                FieldType::String,
                "Mention Users",
                "Mentions prepended to critical alerts",
            )
            .placeholder("<@U123> <!here>"),
            ConfigField::new(
                "severity_colors",
                FieldType::Boolean,
                "Use Severity Colors",
                "Color-code messages by severity",
            )
            .default_value(true),
        ]
    }

    fn validate_config(&self, config: &PluginConfig) -> PluginResult<()> {
        self.settings(config).map(|_| ())
    }

    fn initialize(&mut self, config: &PluginConfig) -> PluginResult<()> {
        let settings = self.settings(config)?;
        tracing::info!(channel = settings.channel().unwrap_or("default"), "Slack alerts initialized");
        self.settings = Some(settings);
        Ok(())
    }

    fn health_check(&self) -> HealthReport {
        let channel =
            self.settings.as_ref().and_then(SlackSettings::channel).unwrap_or("default channel");

        HealthReport::new(HealthStatus::Healthy, format!("Slack alerts configured for {channel}"))
            .metric("alerts_sent", self.alerts_sent)
            .metric("alerts_failed", self.alerts_failed)
            .metric("webhook_configured", self.settings.is_some())
    }

    fn test_connection(&self) -> PluginResult<String> {
        let settings =
            self.settings.as_ref().ok_or_else(|| PluginError::NotInitialized(self.metadata().name))?;
        Ok(format!(
            "Slack webhook configured for {}",
            settings.channel().unwrap_or("default channel")
        ))
    }
}

impl AlertPlugin for SlackAlert {
    fn send_alert(&mut self, alert: &Alert) -> bool {
        let Some(request) = self.request_for(alert) else {
            tracing::warn!("Slack alert dropped: plugin is not initialized");
            self.alerts_failed += 1;
            return false;
        };

        let result = transport::deliver(self.transport.as_ref(), &request, &RetryConfig::quick());

        match result.result {
            Ok(_) => {
                self.alerts_sent += 1;
                true
            }
            Err(e) => {
                tracing::warn!(severity = alert.severity.as_str(), error = %e, "Slack alert failed");
                self.alerts_failed += 1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::transport::MemoryTransport;

    const HOOK: &str = "https://hooks.slack.com/services/T000/B000/XXXX";

    fn slack(transport: &Arc<MemoryTransport>, config: Value) -> SlackAlert {
        let mut slack = SlackAlert::with_transport(transport.clone());
        slack.initialize(config.as_object().unwrap()).unwrap();
        slack
    }

    #[test]
    fn test_rejects_non_slack_url() {
        let err = SlackAlert::with_transport(Arc::new(MemoryTransport::new()))
            .validate_config(json!({"webhook_url": "https://example.com/hook"}).as_object().unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid Slack webhook URL format");
    }

    #[test]
    fn test_payload_formatting() {
        let transport = Arc::new(MemoryTransport::new());
        let s = slack(&transport, json!({"webhook_url": HOOK, "mention_users": "<!here>"}));

        let payload = s
            .build_payload(&Alert::new(Severity::Critical, "Disk", "Disk is full"))
            .unwrap();
        assert_eq!(payload["text"], "<!here>\n*Disk*\nDisk is full");
        assert_eq!(payload["attachments"][0]["color"], "danger");
        assert_eq!(payload["attachments"][0]["text"], "Disk is full");
        assert_eq!(payload["icon_emoji"], ":robot_face:");
        assert!(payload.get("channel").is_none());

        let payload = s.build_payload(&Alert::new(Severity::Warning, "Lag", "Slow")).unwrap();
        assert_eq!(payload["text"], "*Lag*\nSlow");
        assert_eq!(payload["attachments"][0]["color"], "warning");
    }

    #[test]
    fn test_payload_without_colors_has_channel() {
        let transport = Arc::new(MemoryTransport::new());
        let s = slack(
            &transport,
            json!({"webhook_url": HOOK, "severity_colors": false, "channel": "#ops"}),
        );

        let payload = s.build_payload(&Alert::new(Severity::Info, "t", "m")).unwrap();
        assert!(payload.get("attachments").is_none());
        assert_eq!(payload["channel"], "#ops");
    }

    #[test]
    fn test_send_alert_posts_payload() {
        let transport = Arc::new(MemoryTransport::new());
        let mut s = slack(&transport, json!({"webhook_url": HOOK}));

        assert!(s.send_alert(&Alert::new(Severity::Info, "Deploy", "done")));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, HOOK);
        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["attachments"][0]["color"], "good");
        assert_eq!(s.health_check().metrics["alerts_sent"], 1);
    }

    #[test]
    fn test_send_alert_failure() {
        let transport = Arc::new(MemoryTransport::with_status(403));
        let mut s = slack(&transport, json!({"webhook_url": HOOK}));

        assert!(!s.send_alert(&Alert::new(Severity::Info, "t", "m")));
        assert_eq!(s.health_check().metrics["alerts_failed"], 1);
    }

    #[test]
    fn test_health_message() {
        let transport = Arc::new(MemoryTransport::new());
        let s = slack(&transport, json!({"webhook_url": HOOK, "channel": "#ops"}));
        let report = s.health_check();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.message, "Slack alerts configured for #ops");
        assert_eq!(report.metrics["webhook_configured"], true);
    }
}
