//! Declarative configuration schema.
//!
//! Every plugin describes its parameters as an ordered list of [`ConfigField`]s.
//! The same list drives form rendering, the `plugins schema` CLI output and
//! configuration validation: defaults are filled in, required fields and
//! declared types are checked, and the result is deserialized into the
//! plugin's typed settings record.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{PluginConfig, PluginError, PluginResult};

/// Declared type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Select,
    Multiselect,
    /// String value that must not be echoed back in listings.
    Secret,
}

impl FieldType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Select => "select",
            Self::Multiselect => "multiselect",
            Self::Secret => "secret",
        }
    }
}

/// One configurable parameter of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    /// Key in the configuration mapping.
    pub name: String,
    /// Declared value type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Human readable label.
    pub label: String,
    /// Help text.
    pub description: String,
    /// Whether a value must be supplied (or defaulted).
    #[serde(default)]
    pub required: bool,
    /// Value used when the field is absent.
    #[serde(default)]
    pub default: Option<Value>,
    /// Allowed values for select/multiselect fields.
    #[serde(default)]
    pub options: Option<Vec<String>>,
    /// Regular expression the textual value must match.
    #[serde(default)]
    pub validation: Option<String>,
    /// Input hint.
    #[serde(default)]
    pub placeholder: Option<String>,
}

impl ConfigField {
    /// Create an optional field with no default.
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            label: label.into(),
            description: description.into(),
            required: false,
            default: None,
            options: None,
            validation: None,
            placeholder: None,
        }
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the allowed options.
    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = Some(options.iter().map(|o| (*o).to_string()).collect());
        self
    }

    /// Set the validation pattern.
    pub fn validation(mut self, pattern: impl Into<String>) -> Self {
        self.validation = Some(pattern.into());
        self
    }

    /// Set the placeholder.
    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    fn allows(&self, option: &str) -> bool {
        self.options.as_ref().map_or(true, |opts| opts.iter().any(|o| o == option))
    }

    fn check_type(&self, value: &Value) -> Result<(), String> {
        let ok = match self.field_type {
            FieldType::String | FieldType::Secret => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Select => {
                let Some(choice) = value.as_str() else {
                    return Err(format!("{} must be a {}", self.name, self.field_type.as_str()));
                };
                if !self.allows(choice) {
                    return Err(format!(
                        "{} must be one of: {}",
                        self.name,
                        self.options.as_deref().unwrap_or_default().join(", ")
                    ));
                }
                true
            }
            FieldType::Multiselect => {
                let Some(items) = value.as_array() else {
                    return Err(format!("{} must be a list", self.name));
                };
                for item in items {
                    match item.as_str() {
                        Some(choice) if self.allows(choice) => {}
                        _ => {
                            return Err(format!(
                                "{} contains an unsupported value: {}",
                                self.name, item
                            ))
                        }
                    }
                }
                true
            }
        };

        if ok {
            Ok(())
        } else {
            Err(format!("{} must be a {}", self.name, self.field_type.as_str()))
        }
    }
}

/// Fill in defaults and check required fields, types and options.
///
/// Keys not described by the schema are kept as-is. `null` counts as absent.
pub fn normalize(fields: &[ConfigField], config: &PluginConfig) -> PluginResult<PluginConfig> {
    let mut normalized = config.clone();

    for field in fields {
        match config.get(&field.name).filter(|v| !v.is_null()) {
            Some(value) => field.check_type(value).map_err(PluginError::Validation)?,
            None => {
                if let Some(ref default) = field.default {
                    normalized.insert(field.name.clone(), default.clone());
                } else if field.required {
                    return Err(PluginError::Validation(format!("{} is required", field.label)));
                } else {
                    normalized.remove(&field.name);
                }
            }
        }
    }

    Ok(normalized)
}

/// Check every field's validation pattern against its textual value.
pub fn check_patterns(fields: &[ConfigField], config: &PluginConfig) -> PluginResult<()> {
    for field in fields {
        let (Some(pattern), Some(value)) = (&field.validation, config.get(&field.name)) else {
            continue;
        };

        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null => continue,
            other => other.to_string(),
        };

        let re = Regex::new(pattern).map_err(|e| {
            PluginError::Validation(format!("{} has an invalid validation pattern: {e}", field.label))
        })?;

        if !re.is_match(&text) {
            return Err(PluginError::Validation(format!("{} has an invalid format", field.label)));
        }
    }

    Ok(())
}

/// Validate a configuration and deserialize it into a typed settings record.
///
/// Order: defaults and types, deserialization, the plugin's business `rules`,
/// then validation patterns.
pub fn parse_settings<T, F>(fields: &[ConfigField], config: &PluginConfig, rules: F) -> PluginResult<T>
where
    T: DeserializeOwned,
    F: FnOnce(&T) -> Result<(), String>,
{
    let normalized = normalize(fields, config)?;

    let settings: T = serde_json::from_value(Value::Object(normalized.clone()))
        .map_err(|e| PluginError::Validation(format!("Invalid configuration: {e}")))?;

    rules(&settings).map_err(PluginError::Validation)?;
    check_patterns(fields, &normalized)?;

    Ok(settings)
}

/// Copy of `config` with every secret field masked, for listings.
pub fn redact(fields: &[ConfigField], config: &PluginConfig) -> PluginConfig {
    let mut redacted = config.clone();
    for field in fields.iter().filter(|f| f.field_type == FieldType::Secret) {
        if let Some(value) = redacted.get_mut(&field.name) {
            if value.as_str().is_some_and(|s| !s.is_empty()) {
                *value = Value::String("********".to_string());
            }
        }
    }
    redacted
}
