//! Serializable pipeline definitions.

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// A pipeline as stored in configuration files and exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Input instance ids, collected in order.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Processing instance ids, applied in order.
    #[serde(default)]
    pub processors: Vec<String>,
    /// Output instance ids, delivered to in order.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Alert instance ids notified when a pass records errors.
    #[serde(default)]
    pub alerts: Vec<String>,
}

impl PipelineDefinition {
    /// An enabled pipeline with no stages.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            inputs: Vec::new(),
            processors: Vec::new(),
            outputs: Vec::new(),
            alerts: Vec::new(),
        }
    }

    /// Every instance id the pipeline references, in stage order.
    pub fn instance_ids(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .chain(&self.processors)
            .chain(&self.outputs)
            .chain(&self.alerts)
            .map(String::as_str)
    }
}
