//! Linear pipeline execution.
//!
//! A pass pulls from every input, threads the working set through every
//! processor, delivers it to every output and, when something went wrong,
//! notifies the alert instances. Failures are recorded in [`PipelineStats`]
//! and never escape a pass.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::PipelineDefinition;
use crate::core::CancelFlag;
use crate::plugin::{
    guarded, guarded_result, Alert, Event, PluginCategory, PluginManager, Severity, SharedInstance,
};

/// Result summary of one pipeline pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Events produced by all inputs.
    pub events_collected: usize,
    /// Working-set size after all processors.
    pub events_processed: usize,
    /// Events delivered, summed over outputs.
    pub events_sent: usize,
    /// Events not delivered, summed over outputs.
    pub events_failed: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    /// The pass stopped early because cancellation was requested.
    pub cancelled: bool,
}

impl PipelineStats {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn record(&mut self, pipeline: &str, error: String) {
        tracing::error!(pipeline, error = %error, "Pipeline stage failed");
        self.errors.push(error);
    }
}

/// An ordered composition of plugin instances.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    enabled: bool,
    inputs: Vec<String>,
    processors: Vec<String>,
    outputs: Vec<String>,
    alerts: Vec<String>,
    manager: Arc<PluginManager>,
}

impl Pipeline {
    /// Create an enabled pipeline with no stages.
    pub fn new(name: impl Into<String>, manager: Arc<PluginManager>) -> Self {
        Self::from_definition(PipelineDefinition::new(name), manager)
    }

    /// Build a pipeline from its stored form.
    pub fn from_definition(definition: PipelineDefinition, manager: Arc<PluginManager>) -> Self {
        Self {
            name: definition.name,
            enabled: definition.enabled,
            inputs: definition.inputs,
            processors: definition.processors,
            outputs: definition.outputs,
            alerts: definition.alerts,
            manager,
        }
    }

    /// Stored form of this pipeline.
    pub fn to_definition(&self) -> PipelineDefinition {
        PipelineDefinition {
            name: self.name.clone(),
            enabled: self.enabled,
            inputs: self.inputs.clone(),
            processors: self.processors.clone(),
            outputs: self.outputs.clone(),
            alerts: self.alerts.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn add_input(&mut self, instance_id: impl Into<String>) -> &mut Self {
        self.inputs.push(instance_id.into());
        self
    }

    pub fn add_processor(&mut self, instance_id: impl Into<String>) -> &mut Self {
        self.processors.push(instance_id.into());
        self
    }

    pub fn add_output(&mut self, instance_id: impl Into<String>) -> &mut Self {
        self.outputs.push(instance_id.into());
        self
    }

    pub fn add_alert(&mut self, instance_id: impl Into<String>) -> &mut Self {
        self.alerts.push(instance_id.into());
        self
    }

    /// Run one pass.
    pub fn execute(&self) -> PipelineStats {
        self.execute_with_cancel(&CancelFlag::new())
    }

    /// Run one pass, stopping between stages once `cancel` is set.
    pub fn execute_with_cancel(&self, cancel: &CancelFlag) -> PipelineStats {
        let mut stats = PipelineStats::default();
        if !self.enabled {
            tracing::debug!(pipeline = %self.name, "Pipeline disabled, skipping pass");
            return stats;
        }

        let start = Instant::now();
        self.run_stages(cancel, &mut stats);

        if stats.has_errors() && !self.alerts.is_empty() {
            self.notify(&mut stats);
        }

        stats.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            pipeline = %self.name,
            collected = stats.events_collected,
            processed = stats.events_processed,
            sent = stats.events_sent,
            failed = stats.events_failed,
            errors = stats.errors.len(),
            "Pipeline pass finished"
        );
        stats
    }

    fn run_stages(&self, cancel: &CancelFlag, stats: &mut PipelineStats) {
        let events = self.collect(stats);
        stats.events_collected = events.len();

        if self.stop_requested(cancel, stats) {
            return;
        }

        let Some(events) = self.process(events, stats) else {
            return;
        };
        stats.events_processed = events.len();

        if self.stop_requested(cancel, stats) {
            return;
        }

        self.deliver(&events, stats);
    }

    fn stop_requested(&self, cancel: &CancelFlag, stats: &mut PipelineStats) -> bool {
        if cancel.is_cancelled() {
            tracing::info!(pipeline = %self.name, "Pipeline pass cancelled");
            stats.cancelled = true;
        }
        stats.cancelled
    }

    fn instance(&self, instance_id: &str) -> Option<SharedInstance> {
        let instance = self.manager.get_instance(instance_id);
        if instance.is_none() {
            tracing::debug!(pipeline = %self.name, instance = instance_id, "Skipping missing plugin instance");
        }
        instance
    }

    fn collect(&self, stats: &mut PipelineStats) -> Vec<Event> {
        let mut events = Vec::new();

        for id in &self.inputs {
            let Some(instance) = self.instance(id) else { continue };
            let mut plugin = instance.lock();

            match guarded_result(id, || plugin.collect()) {
                Ok(batch) => events.extend(batch),
                Err(e) => stats.record(&self.name, format!("Input {id} failed: {e}")),
            }
        }

        events
    }

    /// Returns `None` when a processor failure lost the working set.
    fn process(&self, mut events: Vec<Event>, stats: &mut PipelineStats) -> Option<Vec<Event>> {
        for id in &self.processors {
            let Some(instance) = self.instance(id) else { continue };
            let mut plugin = instance.lock();

            if plugin.category() != PluginCategory::Processing {
                let name = plugin.metadata().name;
                stats.record(
                    &self.name,
                    format!("Processor {id} failed: Plugin '{name}' cannot be used in the Processing stage"),
                );
                continue;
            }

            match guarded_result(id, || plugin.process_batch(events)) {
                Ok(processed) => events = processed,
                Err(e) => {
                    stats.record(&self.name, format!("Processor {id} failed: {e}"));
                    return None;
                }
            }
        }

        Some(events)
    }

    fn deliver(&self, events: &[Event], stats: &mut PipelineStats) {
        for id in &self.outputs {
            let Some(instance) = self.instance(id) else { continue };
            let mut plugin = instance.lock();

            match guarded_result(id, || plugin.send_batch(events)) {
                Ok(result) => {
                    stats.events_sent += result.success_count;
                    stats.events_failed += result.failed_count;
                    stats.errors.extend(result.errors.into_iter().map(|e| format!("Output {id}: {e}")));
                }
                Err(e) => stats.record(&self.name, format!("Output {id} failed: {e}")),
            }
        }
    }

    fn notify(&self, stats: &mut PipelineStats) {
        let alert = Alert::new(
            Severity::Warning,
            format!("Pipeline '{}' reported errors", self.name),
            stats.errors.join("\n"),
        );

        for id in &self.alerts {
            let Some(instance) = self.instance(id) else { continue };
            let mut plugin = instance.lock();

            let sent = guarded(id, || plugin.send_alert(&alert));
            match sent {
                Ok(Ok(true)) => tracing::debug!(pipeline = %self.name, instance = %id, "Alert sent"),
                Ok(Ok(false)) => {
                    tracing::warn!(pipeline = %self.name, instance = %id, "Alert was not delivered");
                    stats.errors.push(format!("Alert {id} was not delivered"));
                }
                Ok(Err(e)) | Err(e) => stats.record(&self.name, format!("Alert {id} failed: {e}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::builtin::WebhookOutput;
    use crate::plugin::{
        BatchResult, ConfigField, HealthReport, HealthStatus, InputPlugin, MemoryTransport,
        OutputPlugin, Plugin, PluginConfig, PluginInstance, PluginMetadata, PluginRegistry,
        PluginResult, Pricing, ProcessingPlugin,
    };
    use serde_json::{json, Map};

    /// Stage that panics whenever it is run.
    struct Exploding {
        category: PluginCategory,
    }

    impl Plugin for Exploding {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata {
                name: "Exploding".to_string(),
                version: "0.0.1".to_string(),
                author: "tests".to_string(),
                description: String::new(),
                category: self.category,
                documentation_url: String::new(),
                icon_url: String::new(),
                tags: Vec::new(),
                pricing: Pricing::Free,
            }
        }

        fn config_schema(&self) -> Vec<ConfigField> {
            Vec::new()
        }

        fn validate_config(&self, _config: &PluginConfig) -> PluginResult<()> {
            Ok(())
        }

        fn initialize(&mut self, _config: &PluginConfig) -> PluginResult<()> {
            Ok(())
        }

        fn health_check(&self) -> HealthReport {
            HealthReport::new(HealthStatus::Healthy, "ok")
        }
    }

    impl InputPlugin for Exploding {
        fn collect(&mut self) -> PluginResult<Vec<Event>> {
            panic!("input exploded")
        }
    }

    impl ProcessingPlugin for Exploding {
        fn process(&mut self, _event: Event) -> Option<Event> {
            panic!("processor exploded")
        }
    }

    impl OutputPlugin for Exploding {
        fn send_batch(&mut self, _events: &[Event]) -> BatchResult {
            panic!("output exploded")
        }
    }

    fn exploding(category: PluginCategory) -> Exploding {
        Exploding { category }
    }

    fn manager() -> Arc<PluginManager> {
        manager_with_sink(Arc::new(MemoryTransport::new()))
    }

    /// Builtins plus exploding stages, with the webhook posting to `sink`.
    fn manager_with_sink(sink: Arc<MemoryTransport>) -> Arc<PluginManager> {
        let mut registry = PluginRegistry::with_builtins();
        registry
            .register(|| Ok(PluginInstance::Input(Box::new(exploding(PluginCategory::Input)))))
            .unwrap();
        registry
            .register(|| Ok(PluginInstance::Processing(Box::new(exploding(PluginCategory::Processing)))))
            .unwrap();
        registry
            .register(|| Ok(PluginInstance::Output(Box::new(exploding(PluginCategory::Output)))))
            .unwrap();
        registry
            .register(move || Ok(PluginInstance::Output(Box::new(WebhookOutput::with_transport(sink.clone())))))
            .unwrap();

        let manager = PluginManager::new(Arc::new(registry));
        manager
            .create_instance(
                "input:HTTP Endpoint",
                "ingest",
                json!({"batch_size": 2}).as_object().cloned().unwrap(),
            )
            .unwrap();
        manager.create_instance("processing:JSON Parser", "parse", Map::new()).unwrap();
        manager.create_instance("processing:Exploding", "boom", Map::new()).unwrap();
        manager.create_instance("input:Exploding", "broken-in", Map::new()).unwrap();
        manager.create_instance("output:Exploding", "broken-out", Map::new()).unwrap();
        manager
            .create_instance(
                "output:Webhook",
                "sink",
                json!({"url": "https://collector.example.com/ingest", "retry_count": 0})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .unwrap();
        Arc::new(manager)
    }

    fn feed(manager: &PluginManager, bodies: &[&str]) {
        let instance = manager.get_instance("ingest").unwrap();
        let mut plugin = instance.lock();
        let receiver = plugin.receiver().unwrap();
        for body in bodies {
            assert!(receiver.receive_raw(body));
        }
    }

    #[test]
    fn test_disabled_pipeline_is_noop() {
        let manager = manager();
        feed(&manager, &[r#"{"a":1}"#, r#"{"a":2}"#]);

        let mut pipeline = Pipeline::new("off", manager.clone());
        pipeline.add_input("ingest");
        pipeline.set_enabled(false);

        assert_eq!(pipeline.execute(), PipelineStats::default());
        assert_eq!(manager.health_check("ingest").unwrap().metrics["buffer_size"], 2);
    }

    #[test]
    fn test_missing_instances_skipped() {
        let manager = manager();
        feed(&manager, &[r#"{"a":1}"#, r#"{"a":2}"#]);

        let mut pipeline = Pipeline::new("p", manager);
        pipeline.add_input("ingest").add_input("ghost").add_processor("nope").add_output("void");

        let stats = pipeline.execute();
        assert_eq!(stats.events_collected, 2);
        assert_eq!(stats.events_processed, 2);
        assert_eq!(stats.events_sent, 0);
        assert!(stats.errors.is_empty());
    }

    #[test]
    fn test_processor_panic_ends_pass() {
        let manager = manager();
        feed(&manager, &["{}", "{}"]);

        let mut pipeline = Pipeline::new("p", manager);
        pipeline.add_input("ingest").add_processor("boom");

        let stats = pipeline.execute();
        assert_eq!(stats.events_collected, 2);
        assert_eq!(stats.events_processed, 0);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("processor exploded"));
    }

    #[test]
    fn test_input_panic_leaves_other_inputs_running() {
        let manager = manager();
        feed(&manager, &["{}", "{}"]);

        let mut pipeline = Pipeline::new("p", manager);
        pipeline.add_input("broken-in").add_input("ingest");

        let stats = pipeline.execute();
        assert_eq!(stats.events_collected, 2);
        assert_eq!(stats.events_processed, 2);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with("Input broken-in failed: "));
        assert!(stats.errors[0].contains("input exploded"));
    }

    #[test]
    fn test_output_failure_leaves_other_outputs_running() {
        let sink = Arc::new(MemoryTransport::new());
        let manager = manager_with_sink(sink.clone());
        feed(&manager, &["{}", "{}"]);

        let mut pipeline = Pipeline::new("p", manager);
        pipeline.add_input("ingest").add_output("broken-out").add_output("sink");

        let stats = pipeline.execute();
        assert_eq!(stats.events_sent, 2);
        assert_eq!(stats.events_failed, 0);
        assert_eq!(sink.request_count(), 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with("Output broken-out failed: "));
        assert!(stats.errors[0].contains("output exploded"));
    }

    #[test]
    fn test_wrong_category_keeps_working_set() {
        let manager = manager();
        feed(&manager, &[r#"{"message":"{\"k\":1}"}"#, "{}"]);

        let mut pipeline = Pipeline::new("p", manager);
        pipeline.add_input("ingest").add_processor("ingest").add_processor("parse");

        let stats = pipeline.execute();
        assert_eq!(stats.events_processed, 2);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("Processing stage"));
    }

    #[test]
    fn test_cancelled_before_processing() {
        let manager = manager();
        feed(&manager, &["{}", "{}"]);

        let mut pipeline = Pipeline::new("p", manager);
        pipeline.add_input("ingest").add_processor("boom");

        let cancel = CancelFlag::new();
        cancel.cancel();
        let stats = pipeline.execute_with_cancel(&cancel);

        assert!(stats.cancelled);
        assert_eq!(stats.events_collected, 2);
        assert!(stats.errors.is_empty());
    }

    #[test]
    fn test_definition_round_trip() {
        let mut pipeline = Pipeline::new("p", manager());
        pipeline.add_input("ingest").add_processor("parse").add_output("out").add_alert("pager");

        let def = pipeline.to_definition();
        let json = serde_json::to_string(&def).unwrap();
        let back: PipelineDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
        assert_eq!(back.alerts, vec!["pager".to_string()]);
    }
}
