//! Plugin instance manager.
//!
//! Owns configured, initialized plugin instances keyed by a caller-chosen
//! instance id. Only instances whose configuration validated and whose
//! `initialize` succeeded are ever stored.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::isolation::{guarded, guarded_result};
use super::schema::{self, ConfigField};
use super::{
    HealthReport, HealthStatus, PluginCategory, PluginConfig, PluginError, PluginInstance,
    PluginRegistry, PluginResult,
};

/// An instance shared between the manager and running pipelines.
pub type SharedInstance = Arc<Mutex<PluginInstance>>;

struct ManagedInstance {
    plugin_id: String,
    config: PluginConfig,
    schema: Vec<ConfigField>,
    instance: SharedInstance,
}

/// Listing entry for one instance. Secret fields are masked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSummary {
    pub id: String,
    pub plugin: String,
    pub name: String,
    pub category: PluginCategory,
    pub status: HealthStatus,
    pub config: PluginConfig,
}

/// Plain record of an instance, for export and import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    pub plugin: String,
    #[serde(default)]
    pub config: PluginConfig,
}

/// Manages plugin instances and their configuration.
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
    instances: RwLock<HashMap<String, ManagedInstance>>,
}

impl PluginManager {
    /// Create a manager creating instances from `registry`.
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry, instances: RwLock::new(HashMap::new()) }
    }

    /// The registry instances are created from.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Create, validate and initialize an instance of `plugin_id`.
    ///
    /// On success any previous instance under `instance_id` is replaced.
    /// On failure the previous instance, if any, is kept.
    pub fn create_instance(
        &self,
        plugin_id: &str,
        instance_id: &str,
        config: PluginConfig,
    ) -> PluginResult<()> {
        let factory =
            self.registry.get(plugin_id).ok_or_else(|| PluginError::NotFound(plugin_id.to_string()))?;

        let (instance, schema) = guarded_result(plugin_id, || {
            let mut instance = factory()?;
            instance.validate_config(&config)?;
            instance.initialize(&config)?;
            let schema = instance.config_schema();
            Ok((instance, schema))
        })
        .inspect_err(|e| {
            tracing::warn!(plugin = plugin_id, instance = instance_id, error = %e, "Failed to create plugin instance");
        })?;

        let managed = ManagedInstance {
            plugin_id: plugin_id.to_string(),
            config,
            schema,
            instance: Arc::new(Mutex::new(instance)),
        };

        let replaced = self.instances.write().insert(instance_id.to_string(), managed).is_some();
        tracing::info!(plugin = plugin_id, instance = instance_id, replaced, "Created plugin instance");
        Ok(())
    }

    /// Instance by id.
    pub fn get_instance(&self, instance_id: &str) -> Option<SharedInstance> {
        self.instances.read().get(instance_id).map(|m| Arc::clone(&m.instance))
    }

    /// Configuration an instance was created with.
    pub fn instance_config(&self, instance_id: &str) -> Option<PluginConfig> {
        self.instances.read().get(instance_id).map(|m| m.config.clone())
    }

    /// Remove an instance. Returns whether it existed.
    pub fn remove_instance(&self, instance_id: &str) -> bool {
        let removed = self.instances.write().remove(instance_id).is_some();
        if removed {
            tracing::info!(instance = instance_id, "Removed plugin instance");
        }
        removed
    }

    /// Health of an instance, `None` for unknown ids.
    pub fn health_check(&self, instance_id: &str) -> Option<HealthReport> {
        let instance = self.get_instance(instance_id)?;
        Some(checked_health(instance_id, &instance))
    }

    /// All instances, sorted by id.
    pub fn list_instances(&self) -> Vec<InstanceSummary> {
        let snapshot: Vec<_> = self
            .instances
            .read()
            .iter()
            .map(|(id, m)| {
                (
                    id.clone(),
                    m.plugin_id.clone(),
                    schema::redact(&m.schema, &m.config),
                    Arc::clone(&m.instance),
                )
            })
            .collect();

        let mut summaries: Vec<_> = snapshot
            .into_iter()
            .map(|(id, plugin, config, instance)| {
                let status = checked_health(&id, &instance).status;
                let (name, category) = {
                    let guard = instance.lock();
                    (guard.metadata().name, guard.category())
                };
                InstanceSummary { id, plugin, name, category, status, config }
            })
            .collect();

        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Instance ids, sorted.
    pub fn instance_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.instances.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Plain records of every instance, sorted by id. Secrets are included.
    pub fn export_instances(&self) -> Vec<InstanceRecord> {
        let mut records: Vec<_> = self
            .instances
            .read()
            .iter()
            .map(|(id, m)| InstanceRecord {
                id: id.clone(),
                plugin: m.plugin_id.clone(),
                config: m.config.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Create an instance for every record.
    ///
    /// Failing records are skipped; their errors are returned.
    pub fn import_instances(&self, records: &[InstanceRecord]) -> Vec<(String, PluginError)> {
        records
            .iter()
            .filter_map(|record| {
                self.create_instance(&record.plugin, &record.id, record.config.clone())
                    .err()
                    .map(|e| (record.id.clone(), e))
            })
            .collect()
    }
}

/// Health check that survives a panicking plugin.
fn checked_health(instance_id: &str, instance: &SharedInstance) -> HealthReport {
    let guard = instance.lock();
    guarded(instance_id, || guard.health_check()).unwrap_or_else(|e| {
        HealthReport::new(HealthStatus::Unhealthy, format!("Health check failed: {e}"))
    })
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("registry", &self.registry)
            .field("instances", &self.instance_ids())
            .finish()
    }
}
