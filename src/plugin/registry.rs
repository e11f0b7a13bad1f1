//! Registry of plugin types.
//!
//! Plugin types are registered by factory. The registry calls a factory once
//! to read the plugin's metadata, keys it by `"{category}:{name}"` and keeps
//! registration order for listings. Directories of `plugin.toml` manifests can
//! be scanned to enable compiled implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use super::builtin;
use super::isolation::guarded_result;
use super::manifest::{PluginManifest, MANIFEST_FILE};
use super::{PluginCategory, PluginError, PluginInstance, PluginMetadata, PluginResult};

/// Creates fresh, uninitialized plugin objects.
pub type PluginFactory = Arc<dyn Fn() -> PluginResult<PluginInstance> + Send + Sync>;

struct RegisteredPlugin {
    id: String,
    metadata: PluginMetadata,
    factory: PluginFactory,
}

/// A registered plugin type, as returned by [`PluginRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginListing {
    pub id: String,
    #[serde(flatten)]
    pub metadata: PluginMetadata,
}

/// A manifest that could not be turned into a registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of scanning a plugin directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Ids registered from manifests, in scan order.
    pub registered: Vec<String>,
    /// Manifests skipped because they are disabled.
    pub disabled: Vec<PathBuf>,
    pub failures: Vec<DiscoveryFailure>,
}

impl DiscoveryReport {
    fn fail(&mut self, path: &Path, error: impl ToString) {
        let error = error.to_string();
        tracing::error!(path = %path.display(), error = %error, "Skipping plugin manifest");
        self.failures.push(DiscoveryFailure { path: path.to_path_buf(), error });
    }
}

/// Maps plugin ids to factories and metadata.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
    index: HashMap<String, usize>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the reference plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Register a plugin type.
    ///
    /// The factory is invoked once to read metadata. A failing or panicking
    /// factory yields [`PluginError::Registration`] and leaves the registry
    /// unchanged. Registering an existing id replaces it in place.
    pub fn register<F>(&mut self, factory: F) -> PluginResult<String>
    where
        F: Fn() -> PluginResult<PluginInstance> + Send + Sync + 'static,
    {
        let factory: PluginFactory = Arc::new(factory);

        let metadata = guarded_result("registry", || factory().map(|plugin| plugin.metadata()))
            .map_err(|e| PluginError::Registration(e.to_string()))?;
        let id = metadata.id();

        let entry = RegisteredPlugin { id: id.clone(), metadata, factory };
        match self.index.get(&id) {
            Some(&position) => {
                tracing::debug!(plugin = %id, "Replacing registered plugin");
                self.plugins[position] = entry;
            }
            None => {
                self.index.insert(id.clone(), self.plugins.len());
                self.plugins.push(entry);
            }
        }

        tracing::debug!(plugin = %id, "Registered plugin");
        Ok(id)
    }

    /// Register the reference plugins. Returns the registered ids.
    pub fn register_builtins(&mut self) -> Vec<String> {
        builtin::catalog()
            .iter()
            .filter_map(|plugin| match self.register(plugin.factory) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::error!(implementation = plugin.key, error = %e, "Failed to register builtin plugin");
                    None
                }
            })
            .collect()
    }

    /// Factory for a plugin id.
    pub fn get(&self, id: &str) -> Option<PluginFactory> {
        self.entry(id).map(|p| Arc::clone(&p.factory))
    }

    /// Metadata for a plugin id.
    pub fn metadata(&self, id: &str) -> Option<&PluginMetadata> {
        self.entry(id).map(|p| &p.metadata)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Create a fresh object of the given plugin type.
    pub fn create(&self, id: &str) -> PluginResult<PluginInstance> {
        let factory = self.get(id).ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        guarded_result(id, || factory())
    }

    /// Registered plugins in registration order, optionally filtered by category.
    pub fn list(&self, category: Option<PluginCategory>) -> Vec<PluginListing> {
        self.plugins
            .iter()
            .filter(|p| category.map_or(true, |c| p.metadata.category == c))
            .map(|p| PluginListing { id: p.id.clone(), metadata: p.metadata.clone() })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn entry(&self, id: &str) -> Option<&RegisteredPlugin> {
        self.index.get(id).map(|&position| &self.plugins[position])
    }

    /// Scan `dir` for `plugin.toml` manifests and register what they enable.
    ///
    /// Directories and files starting with `_` or `.` are ignored. Bad
    /// manifests are reported and skipped; they never abort the scan.
    pub fn discover(&mut self, dir: &Path) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        if !dir.is_dir() {
            tracing::warn!(path = %dir.display(), "Plugin directory does not exist");
            return report;
        }

        let walker = WalkDir::new(dir).sort_by_file_name().into_iter().filter_entry(is_visible);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(dir).to_path_buf();
                    report.fail(&path, e);
                    continue;
                }
            };

            if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE {
                self.register_manifest(entry.path(), &mut report);
            }
        }

        tracing::info!(
            path = %dir.display(),
            registered = report.registered.len(),
            failed = report.failures.len(),
            "Plugin discovery finished"
        );
        report
    }

    fn register_manifest(&mut self, path: &Path, report: &mut DiscoveryReport) {
        let manifest = match PluginManifest::from_file(path).and_then(|m| {
            m.validate(path)?;
            Ok(m)
        }) {
            Ok(manifest) => manifest,
            Err(e) => return report.fail(path, e),
        };

        if !manifest.plugin.enabled {
            tracing::debug!(path = %path.display(), "Plugin manifest disabled");
            report.disabled.push(path.to_path_buf());
            return;
        }

        let Some(implementation) = builtin::find(&manifest.plugin.implementation) else {
            return report.fail(
                path,
                format!("Unknown implementation '{}'", manifest.plugin.implementation),
            );
        };

        match self.register(implementation.factory) {
            Ok(id) => {
                tracing::info!(manifest = %manifest.plugin.name, plugin = %id, "Discovered plugin");
                report.registered.push(id);
            }
            Err(e) => report.fail(path, e),
        }
    }
}

fn is_visible(entry: &DirEntry) -> bool {
    entry.depth() == 0
        || !entry.file_name().to_str().is_some_and(|name| name.starts_with('_') || name.starts_with('.'))
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.iter().map(|p| p.id.as_str()).collect::<Vec<_>>())
            .finish()
    }
}
