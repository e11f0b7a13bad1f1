//! Pipelines chaining plugin instances.
//!
//! A [`Pipeline`] references instances owned by a
//! [`PluginManager`](crate::plugin::PluginManager) by id, so the same instance
//! can feed several pipelines. [`Portal`] wires configuration, registry,
//! manager and pipelines together and schedules passes.

mod definition;
mod executor;
mod portal;

pub use definition::PipelineDefinition;
pub use executor::{Pipeline, PipelineStats};
pub use portal::{PipelineRun, Portal};
