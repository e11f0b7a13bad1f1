//! Reference plugins shipped with obsflow.
//!
//! The catalog maps a stable implementation key to a factory. Discovery
//! manifests name one of these keys in their `implementation` field.

mod http_input;
mod json_parser;
mod slack;
mod webhook;

pub use http_input::{BodyFormat, HttpInput, HttpInputSettings, EVENT_SOURCE};
pub use json_parser::{flatten, JsonParser, JsonParserSettings, OnError, PARSER_MARKER};
pub use slack::{severity_color, SlackAlert, SlackSettings, SLACK_WEBHOOK_PREFIX};
pub use webhook::{WebhookOutput, WebhookSettings, SIGNATURE_HEADER};

use super::{PluginInstance, PluginResult};

/// Factory producing a fresh, uninitialized plugin object.
pub type BuiltinFactory = fn() -> PluginResult<PluginInstance>;

/// A compiled plugin implementation.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinPlugin {
    /// Key used by discovery manifests.
    pub key: &'static str,
    pub factory: BuiltinFactory,
}

const CATALOG: &[BuiltinPlugin] = &[
    BuiltinPlugin { key: "http_input", factory: || Ok(PluginInstance::Input(Box::new(HttpInput::new()))) },
    BuiltinPlugin {
        key: "json_parser",
        factory: || Ok(PluginInstance::Processing(Box::new(JsonParser::new()))),
    },
    BuiltinPlugin {
        key: "webhook_output",
        factory: || Ok(PluginInstance::Output(Box::new(WebhookOutput::new()))),
    },
    BuiltinPlugin { key: "slack_alert", factory: || Ok(PluginInstance::Alert(Box::new(SlackAlert::new()))) },
];

/// All compiled implementations, in registration order.
pub fn catalog() -> &'static [BuiltinPlugin] {
    CATALOG
}

/// Look up an implementation by key.
pub fn find(key: &str) -> Option<&'static BuiltinPlugin> {
    CATALOG.iter().find(|p| p.key == key.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginCategory;

    #[test]
    fn test_catalog_keys_unique() {
        let mut keys: Vec<_> = catalog().iter().map(|p| p.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), catalog().len());
    }

    #[test]
    fn test_factories_produce_expected_categories() {
        let categories: Vec<_> =
            catalog().iter().map(|p| (p.factory)().unwrap().category()).collect();
        assert_eq!(
            categories,
            vec![
                PluginCategory::Input,
                PluginCategory::Processing,
                PluginCategory::Output,
                PluginCategory::Alert
            ]
        );
    }

    #[test]
    fn test_find() {
        assert_eq!(find("json_parser").unwrap().key, "json_parser");
        assert!(find("kafka").is_none());
    }
}
