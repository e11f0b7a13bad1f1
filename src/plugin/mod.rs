//! Plugin system for obsflow.
//!
//! Plugins are compiled into the binary and exposed through a registry of
//! factories. Each plugin implements [`Plugin`] plus one capability trait:
//!
//! - **Input plugins**: produce events ([`InputPlugin`])
//! - **Processing plugins**: transform events ([`ProcessingPlugin`])
//! - **Output plugins**: deliver events ([`OutputPlugin`])
//! - **Alert plugins**: send notifications ([`AlertPlugin`])
//!
//! The [`PluginManager`] turns registered plugin types into configured,
//! initialized instances that pipelines reference by id.
//!
//! # Example Manifest
//!
//! Directories scanned by [`PluginRegistry::discover`] contain manifests
//! enabling compiled implementations:
//!
//! ```toml
//! [plugin]
//! name = "edge-parser"
//! version = "1.0.0"
//! implementation = "json_parser"
//! ```

pub mod builtin;
mod error;
mod isolation;
mod manager;
mod manifest;
mod registry;
pub mod schema;
mod traits;
pub mod transport;
mod types;

pub use error::{PluginError, PluginResult};
pub use isolation::{guarded, guarded_result};
pub use manager::{InstanceRecord, InstanceSummary, PluginManager, SharedInstance};
pub use manifest::{ManifestPlugin, PluginManifest, MANIFEST_FILE, PLUGIN_API_VERSION};
pub use registry::{DiscoveryFailure, DiscoveryReport, PluginFactory, PluginListing, PluginRegistry};
pub use schema::{ConfigField, FieldType};
pub use traits::{
    AlertPlugin, InputPlugin, LogReceiver, OutputPlugin, Plugin, PluginInstance, ProcessingPlugin,
};
pub use transport::{HttpTransport, MemoryTransport, ReqwestTransport};
pub use types::{
    Alert, BatchResult, Event, HealthReport, HealthStatus, PluginCategory, PluginConfig,
    PluginMetadata, Pricing, Severity,
};
