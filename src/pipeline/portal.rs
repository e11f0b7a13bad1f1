//! Composition root.
//!
//! Builds the registry, the instance manager and the configured pipelines
//! from a [`PortalConfig`] and runs passes over them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::{Pipeline, PipelineDefinition, PipelineStats};
use crate::core::{CancelFlag, PortalConfig, SchedulerConfig};
use crate::plugin::{PluginError, PluginManager, PluginRegistry, PluginResult};

/// Statistics of one pipeline within a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRun {
    pub pipeline: String,
    pub stats: PipelineStats,
}

/// Registry, manager and pipelines of one deployment.
#[derive(Debug)]
pub struct Portal {
    manager: Arc<PluginManager>,
    pipelines: Vec<Pipeline>,
    scheduler: SchedulerConfig,
}

impl Portal {
    /// Portal over `registry` with no instances or pipelines.
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            manager: Arc::new(PluginManager::new(Arc::new(registry))),
            pipelines: Vec::new(),
            scheduler: SchedulerConfig::default(),
        }
    }

    /// Build everything a configuration describes.
    ///
    /// Any instance that fails to validate or initialize is an error, as is a
    /// duplicated pipeline name. Pipelines referencing unknown instances are
    /// accepted; those ids are skipped at execution time.
    pub fn from_config(config: &PortalConfig) -> PluginResult<Self> {
        let mut registry =
            if config.general.builtins { PluginRegistry::with_builtins() } else { PluginRegistry::new() };

        if let Some(ref dir) = config.general.plugin_dir {
            let report = registry.discover(dir);
            if !report.failures.is_empty() {
                tracing::warn!(
                    path = %dir.display(),
                    failures = report.failures.len(),
                    "Some plugin manifests were skipped"
                );
            }
        }

        let mut portal = Self::new(registry);
        portal.scheduler = config.scheduler.clone();

        for record in &config.instances {
            portal
                .manager
                .create_instance(&record.plugin, &record.id, record.config.clone())
                .map_err(|e| PluginError::Config(format!("Instance '{}': {e}", record.id)))?;
        }

        for definition in &config.pipelines {
            portal.add_pipeline(Pipeline::from_definition(definition.clone(), portal.manager.clone()))?;
        }

        Ok(portal)
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn scheduler(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    pub fn set_scheduler(&mut self, scheduler: SchedulerConfig) {
        self.scheduler = scheduler;
    }

    /// Add a pipeline. Names must be unique.
    pub fn add_pipeline(&mut self, pipeline: Pipeline) -> PluginResult<()> {
        if self.pipelines.iter().any(|p| p.name() == pipeline.name()) {
            return Err(PluginError::Config(format!(
                "Pipeline '{}' is defined more than once",
                pipeline.name()
            )));
        }

        let known: HashSet<_> = self.manager.instance_ids().into_iter().collect();
        for id in pipeline.to_definition().instance_ids().filter(|id| !known.contains(*id)) {
            tracing::warn!(pipeline = %pipeline.name(), instance = id, "Pipeline references an unknown instance");
        }

        self.pipelines.push(pipeline);
        Ok(())
    }

    /// Hand a raw request body to an input instance.
    ///
    /// Returns whether the input accepted it.
    pub fn deliver(&self, instance_id: &str, body: &str) -> PluginResult<bool> {
        let instance = self
            .manager
            .get_instance(instance_id)
            .ok_or_else(|| PluginError::InstanceNotFound(instance_id.to_string()))?;

        let mut plugin = instance.lock();
        match plugin.receiver() {
            Some(receiver) => Ok(receiver.receive_raw(body)),
            None => Err(PluginError::Config(format!(
                "Instance '{instance_id}' does not accept pushed data"
            ))),
        }
    }

    /// Run one pass over every pipeline, in definition order.
    pub fn run_once(&self, cancel: &CancelFlag) -> Vec<PipelineRun> {
        let mut runs = Vec::with_capacity(self.pipelines.len());

        for pipeline in &self.pipelines {
            if cancel.is_cancelled() {
                break;
            }
            runs.push(PipelineRun {
                pipeline: pipeline.name().to_string(),
                stats: pipeline.execute_with_cancel(cancel),
            });
        }

        runs
    }

    /// Run passes until cancelled or the scheduler's pass limit is hit.
    ///
    /// `on_pass` receives the pass number (from 1) and its results. Returns
    /// the number of passes run.
    pub fn run_loop<F>(&self, cancel: &CancelFlag, mut on_pass: F) -> usize
    where
        F: FnMut(usize, &[PipelineRun]),
    {
        let interval = Duration::from_millis(self.scheduler.interval_ms);
        let mut passes = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let runs = self.run_once(cancel);
            passes += 1;
            on_pass(passes, &runs);

            if self.scheduler.max_passes.is_some_and(|max| passes >= max) {
                break;
            }
            if !cancel.sleep(interval) {
                break;
            }
        }

        tracing::info!(passes, "Scheduler stopped");
        passes
    }

    /// Stored form of every pipeline.
    pub fn export_definitions(&self) -> Vec<PipelineDefinition> {
        self.pipelines.iter().map(Pipeline::to_definition).collect()
    }

    /// Configuration reproducing this portal's instances and pipelines.
    pub fn to_config(&self) -> PortalConfig {
        PortalConfig {
            scheduler: self.scheduler.clone(),
            instances: self.manager.export_instances(),
            pipelines: self.export_definitions(),
            ..PortalConfig::default()
        }
    }
}
