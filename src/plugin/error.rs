//! Plugin system error types.

use std::path::PathBuf;
use thiserror::Error;

use super::transport::TransportError;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur during plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Unknown plugin type id.
    #[error("Plugin {0} not found")]
    NotFound(String),

    /// Unknown plugin instance id.
    #[error("Plugin instance '{0}' not found")]
    InstanceNotFound(String),

    /// Configuration rejected by the schema or the plugin's own rules.
    #[error("{0}")]
    Validation(String),

    /// Plugin setup failed.
    #[error("Failed to initialize plugin: {0}")]
    Initialization(String),

    /// Plugin type could not be registered.
    #[error("Failed to register plugin: {0}")]
    Registration(String),

    /// Operation called on a plugin that was never initialized.
    #[error("Plugin '{0}' is not initialized")]
    NotInitialized(String),

    /// Instance used in a stage its capability does not support.
    #[error("Plugin '{name}' cannot be used in the {expected} stage")]
    WrongCategory { name: String, expected: super::PluginCategory },

    /// Invalid portal configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid discovery manifest.
    #[error("Invalid plugin manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// Plugin panicked while being called.
    #[error("Plugin panicked: {0}")]
    Panic(String),

    /// Outgoing HTTP delivery failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PluginError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error was raised by configuration validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
