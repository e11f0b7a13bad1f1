//! The plugin contract.
//!
//! Every plugin implements [`Plugin`] plus exactly one capability trait.
//! [`PluginInstance`] is the tagged union the registry and manager work with.

use serde_json::Value;

use super::{
    Alert, BatchResult, ConfigField, Event, HealthReport, PluginCategory, PluginConfig,
    PluginError, PluginMetadata, PluginResult,
};

/// Behavior shared by every plugin.
pub trait Plugin: Send {
    /// Descriptor of this plugin type.
    fn metadata(&self) -> PluginMetadata;

    /// Parameters this plugin accepts.
    fn config_schema(&self) -> Vec<ConfigField>;

    /// Check a configuration without changing any state.
    fn validate_config(&self, config: &PluginConfig) -> PluginResult<()>;

    /// Bind the plugin to a configuration. Called once, after validation.
    fn initialize(&mut self, config: &PluginConfig) -> PluginResult<()>;

    /// Current health snapshot.
    fn health_check(&self) -> HealthReport;

    /// Check that the plugin can reach whatever it talks to.
    fn test_connection(&self) -> PluginResult<String> {
        Ok(format!("{} ready", self.metadata().name))
    }
}

/// Push side of an input that receives data from an external listener.
pub trait LogReceiver {
    /// Accept an already-parsed body.
    fn receive_log(&mut self, body: Value) -> bool;

    /// Accept a raw body, parsing it according to the input's format.
    fn receive_raw(&mut self, body: &str) -> bool;

    /// Check an `Authorization` header value.
    fn authorize(&self, _authorization: Option<&str>) -> bool {
        true
    }
}

/// Data source.
pub trait InputPlugin: Plugin {
    /// Drain a finite batch of events. Never blocks; returns an empty batch
    /// when not enough data is buffered.
    fn collect(&mut self) -> PluginResult<Vec<Event>>;

    /// Push interface, for inputs fed by an external receiver.
    fn receiver(&mut self) -> Option<&mut dyn LogReceiver> {
        None
    }
}

/// Event transformation.
pub trait ProcessingPlugin: Plugin {
    /// Transform one event. `None` drops it.
    fn process(&mut self, event: Event) -> Option<Event>;

    /// Transform events in order, omitting dropped ones.
    fn process_batch(&mut self, events: Vec<Event>) -> Vec<Event> {
        events.into_iter().filter_map(|event| self.process(event)).collect()
    }
}

/// Data sink.
pub trait OutputPlugin: Plugin {
    /// Deliver a batch of events.
    fn send_batch(&mut self, events: &[Event]) -> BatchResult;

    /// Deliver a single event.
    fn send(&mut self, event: &Event) -> bool {
        self.send_batch(std::slice::from_ref(event)).success_count == 1
    }
}

/// Notification channel.
pub trait AlertPlugin: Plugin {
    fn send_alert(&mut self, alert: &Alert) -> bool;
}

/// A plugin object tagged with its capability.
pub enum PluginInstance {
    Input(Box<dyn InputPlugin>),
    Processing(Box<dyn ProcessingPlugin>),
    Output(Box<dyn OutputPlugin>),
    Alert(Box<dyn AlertPlugin>),
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $call:expr) => {
        match $self {
            PluginInstance::Input($p) => $call,
            PluginInstance::Processing($p) => $call,
            PluginInstance::Output($p) => $call,
            PluginInstance::Alert($p) => $call,
        }
    };
}

impl PluginInstance {
    pub fn metadata(&self) -> PluginMetadata {
        dispatch!(self, p => p.metadata())
    }

    pub fn config_schema(&self) -> Vec<ConfigField> {
        dispatch!(self, p => p.config_schema())
    }

    pub fn validate_config(&self, config: &PluginConfig) -> PluginResult<()> {
        dispatch!(self, p => p.validate_config(config))
    }

    pub fn initialize(&mut self, config: &PluginConfig) -> PluginResult<()> {
        dispatch!(self, p => p.initialize(config))
    }

    pub fn health_check(&self) -> HealthReport {
        dispatch!(self, p => p.health_check())
    }

    pub fn test_connection(&self) -> PluginResult<String> {
        dispatch!(self, p => p.test_connection())
    }

    /// Stage this instance can be used in.
    pub const fn category(&self) -> PluginCategory {
        match self {
            Self::Input(_) => PluginCategory::Input,
            Self::Processing(_) => PluginCategory::Processing,
            Self::Output(_) => PluginCategory::Output,
            Self::Alert(_) => PluginCategory::Alert,
        }
    }

    fn wrong_category(&self, expected: PluginCategory) -> PluginError {
        PluginError::WrongCategory { name: self.metadata().name, expected }
    }

    pub fn collect(&mut self) -> PluginResult<Vec<Event>> {
        match self {
            Self::Input(p) => p.collect(),
            _ => Err(self.wrong_category(PluginCategory::Input)),
        }
    }

    /// Push interface of an input plugin, if it has one.
    pub fn receiver(&mut self) -> Option<&mut dyn LogReceiver> {
        match self {
            Self::Input(p) => p.receiver(),
            _ => None,
        }
    }

    pub fn process(&mut self, event: Event) -> PluginResult<Option<Event>> {
        match self {
            Self::Processing(p) => Ok(p.process(event)),
            _ => Err(self.wrong_category(PluginCategory::Processing)),
        }
    }

    pub fn process_batch(&mut self, events: Vec<Event>) -> PluginResult<Vec<Event>> {
        match self {
            Self::Processing(p) => Ok(p.process_batch(events)),
            _ => Err(self.wrong_category(PluginCategory::Processing)),
        }
    }

    pub fn send(&mut self, event: &Event) -> PluginResult<bool> {
        match self {
            Self::Output(p) => Ok(p.send(event)),
            _ => Err(self.wrong_category(PluginCategory::Output)),
        }
    }

    pub fn send_batch(&mut self, events: &[Event]) -> PluginResult<BatchResult> {
        match self {
            Self::Output(p) => Ok(p.send_batch(events)),
            _ => Err(self.wrong_category(PluginCategory::Output)),
        }
    }

    pub fn send_alert(&mut self, alert: &Alert) -> PluginResult<bool> {
        match self {
            Self::Alert(p) => Ok(p.send_alert(alert)),
            _ => Err(self.wrong_category(PluginCategory::Alert)),
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("category", &self.category())
            .field("name", &self.metadata().name)
            .finish()
    }
}
