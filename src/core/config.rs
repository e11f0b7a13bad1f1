//! Configuration management for obsflow.
//!
//! Handles loading and saving the portal configuration from TOML files.
//! String values inside instance configurations may reference environment
//! variables as `${NAME}`; they are expanded when the file is loaded.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::PipelineDefinition;
use crate::plugin::InstanceRecord;

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "obsflow.toml";

/// Portal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// General settings
    pub general: GeneralConfig,

    /// Pass scheduling
    pub scheduler: SchedulerConfig,

    /// Plugin instances to create at startup
    pub instances: Vec<InstanceRecord>,

    /// Pipelines over those instances
    pub pipelines: Vec<PipelineDefinition>,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Register the reference plugins
    pub builtins: bool,

    /// Directory scanned for `plugin.toml` manifests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { builtins: true, plugin_dir: None }
    }
}

/// Pass scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between passes, in milliseconds
    pub interval_ms: u64,

    /// Stop after this many passes (runs until interrupted when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_passes: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, max_passes: None }
    }
}

impl PortalConfig {
    /// Load configuration from the local file, then the global one, then defaults.
    pub fn load() -> anyhow::Result<Self> {
        // Try local config first
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        // Try global config
        if let Some(global_config) = Self::global_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        // Return defaults
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse configuration text and expand environment references.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Save configuration to the global config file.
    pub fn save(&self) -> anyhow::Result<()> {
        let path =
            Self::global_path().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&path)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("obsflow"))
    }

    fn global_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Expand `${NAME}` references in instance configuration strings.
    pub fn expand_env(&mut self) -> anyhow::Result<()> {
        for record in &mut self.instances {
            for (key, value) in record.config.iter_mut() {
                expand_value(value).with_context(|| {
                    format!("Instance '{}' field '{key}' references an unset variable", record.id)
                })?;
            }
        }
        Ok(())
    }
}

fn expand_value(value: &mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(text) if text.contains("${") => {
            let expanded = shellexpand::env(text.as_str()).map_err(|e| anyhow::anyhow!("{e}"))?;
            *text = expanded.into_owned();
        }
        Value::Array(items) => {
            for item in items {
                expand_value(item)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                expand_value(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}
