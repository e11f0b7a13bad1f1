//! Discovery manifest parsing and validation.
//!
//! A manifest is a `plugin.toml` file that enables one compiled plugin
//! implementation and describes where it came from.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{PluginError, PluginResult};

/// File name discovery looks for.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Plugin API version this build implements.
pub const PLUGIN_API_VERSION: &str = "1.0.0";

/// Contents of a `plugin.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin section.
    pub plugin: ManifestPlugin,
}

/// The `[plugin]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPlugin {
    /// Manifest name (unique within a plugin directory).
    pub name: String,
    /// Manifest version (semver).
    pub version: String,
    /// Key of the compiled implementation, e.g. `json_parser`.
    pub implementation: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    /// Disabled manifests are skipped by discovery.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum API version required.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_enabled() -> bool {
    true
}

fn default_api_version() -> String {
    PLUGIN_API_VERSION.to_string()
}

impl PluginManifest {
    /// Parse a manifest from a TOML string. `path` is only used in errors.
    pub fn from_toml(content: &str, path: &Path) -> PluginResult<Self> {
        toml::from_str(content).map_err(|e| PluginError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string().trim().to_string(),
        })
    }

    /// Parse a manifest from a file.
    pub fn from_file(path: &Path) -> PluginResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content, path)
    }

    /// Validate the manifest.
    pub fn validate(&self, path: &Path) -> PluginResult<()> {
        let invalid = |message: &str| PluginError::Manifest {
            path: path.to_path_buf(),
            message: message.to_string(),
        };

        if self.plugin.name.is_empty() {
            return Err(invalid("Plugin name is required"));
        }

        if !self.plugin.name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(invalid(
                "Plugin name must contain only alphanumeric characters, hyphens, and underscores",
            ));
        }

        if self.plugin.version.split('.').count() < 2 {
            return Err(invalid("Version must be in semver format (e.g., 1.0.0)"));
        }

        if self.plugin.implementation.trim().is_empty() {
            return Err(invalid("Plugin implementation is required"));
        }

        if !self.is_compatible_with(PLUGIN_API_VERSION) {
            return Err(invalid(&format!(
                "Requires plugin API {}, this build provides {PLUGIN_API_VERSION}",
                self.plugin.api_version
            )));
        }

        Ok(())
    }

    /// Major versions must match and the host minor must be at least the required one.
    pub fn is_compatible_with(&self, host_api_version: &str) -> bool {
        let required: Vec<u32> =
            self.plugin.api_version.split('.').filter_map(|s| s.parse().ok()).collect();
        let available: Vec<u32> =
            host_api_version.split('.').filter_map(|s| s.parse().ok()).collect();

        if required.is_empty() || available.is_empty() {
            return false;
        }

        required[0] == available[0]
            && (available.len() < 2 || required.len() < 2 || available[1] >= required[1])
    }
}
